//! Rotation axis-order conversion.
//!
//! Assembly records carry rotations as (X, Y, Z) Euler degrees. Locally a
//! placement rotation is held as (Z, Y, X), i.e. (yaw, pitch, roll). The
//! move operation on the far side reverses whatever triple it receives
//! before storing it, so move arguments are sent in local order.

use super::Vec3;

/// Record order (X, Y, Z) to local order (Z, Y, X).
pub fn remote_to_local(xyz: Vec3) -> Vec3 {
    [xyz[2], xyz[1], xyz[0]]
}

/// Local order (Z, Y, X) to record order (X, Y, Z).
pub fn local_to_remote(zyx: Vec3) -> Vec3 {
    [zyx[2], zyx[1], zyx[0]]
}

/// Rotation triple as the move operation expects it.
pub fn local_to_move_argument(zyx: Vec3) -> Vec3 {
    zyx
}

/// What the far side stores after receiving a move argument.
pub fn move_argument_to_remote(argument: Vec3) -> Vec3 {
    [argument[2], argument[1], argument[0]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rotation_reverses_into_local_order() {
        assert_eq!(remote_to_local([10.0, 0.0, 0.0]), [0.0, 0.0, 10.0]);
        assert_eq!(local_to_remote(remote_to_local([1.0, 2.0, 3.0])), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_push_then_pull_preserves_local_rotation() {
        let local = [30.0, -15.0, 5.0];
        let stored = move_argument_to_remote(local_to_move_argument(local));
        assert_eq!(stored, local_to_remote(local));
        assert_eq!(remote_to_local(stored), local);
    }
}
