//! Number encoding for transform arguments.
//!
//! The remote CLI's argument parser reads any token starting with `-` as a
//! flag, so a negative number travels as `min<digits>` and the far side
//! swaps the prefix back. Zero is never prefixed.

use super::tuple::{float_text, parse_number, Vec3};
use super::CodecError;

pub const NEGATIVE_PREFIX: &str = "min";

pub fn encode_number(value: f64) -> Result<String, CodecError> {
    if !value.is_finite() {
        return Err(CodecError::NonFinite(value));
    }
    let text = float_text(value);
    Ok(match text.strip_prefix('-') {
        Some(magnitude) => format!("{}{}", NEGATIVE_PREFIX, magnitude),
        None => text,
    })
}

pub fn decode_number(token: &str) -> Result<f64, CodecError> {
    match token.strip_prefix(NEGATIVE_PREFIX) {
        Some(magnitude) if !magnitude.starts_with(['-', '+']) => {
            parse_number(magnitude).map(|v| -v)
        }
        Some(_) => Err(CodecError::InvalidNumber(token.to_string())),
        None if token.starts_with('-') => Err(CodecError::InvalidNumber(token.to_string())),
        None => parse_number(token),
    }
}

/// Flatten vectors into one argument token per number.
pub fn encode_srt_argument(values: &[Vec3]) -> Result<Vec<String>, CodecError> {
    values
        .iter()
        .flat_map(|v| v.iter())
        .map(|&n| encode_number(n))
        .collect()
}

/// Inverse of [`encode_srt_argument`]. Tokens may also hold several
/// space-separated numbers, so the single-string form decodes as well.
pub fn decode_srt_argument<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Vec3>, CodecError> {
    let numbers = tokens
        .iter()
        .flat_map(|t| t.as_ref().split_whitespace())
        .map(decode_number)
        .collect::<Result<Vec<f64>, CodecError>>()?;

    if numbers.len() % 3 != 0 {
        return Err(CodecError::RaggedArgument(numbers.len()));
    }
    Ok(numbers.chunks(3).map(|c| [c[0], c[1], c[2]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_negative_values_get_prefix() {
        assert_eq!(encode_number(-12.5).unwrap(), "min12.5");
        assert_eq!(encode_number(12.5).unwrap(), "12.5");
        assert_eq!(
            encode_srt_argument(&[[-1.0, 2.0, -3.0]]).unwrap(),
            ["min1.0", "2.0", "min3.0"]
        );
    }

    #[test]
    fn test_zero_is_never_prefixed() {
        assert_eq!(encode_number(0.0).unwrap(), "0.0");
        assert_eq!(encode_number(-0.0).unwrap(), "0.0");
        let tokens = encode_srt_argument(&[[0.0, -0.0, 0.0]]).unwrap();
        assert!(tokens.iter().all(|t| !t.starts_with(NEGATIVE_PREFIX)));
    }

    #[test]
    fn test_no_token_starts_with_minus() {
        let values = [[-1e-9, -1e12, -0.5], [-180.0, 90.0, -45.0]];
        let tokens = encode_srt_argument(&values).unwrap();
        assert_eq!(tokens.len(), 6);
        assert!(tokens.iter().all(|t| !t.starts_with('-')));
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let values = vec![
            [-1234.5678, 0.0, 1e12],
            [-3e-7, 45.125, -179.999],
            [0.1, -0.2, 0.30000000000000004],
        ];
        let decoded = decode_srt_argument(&encode_srt_argument(&values).unwrap()).unwrap();
        assert_eq!(decoded.len(), values.len());
        for (a, b) in values.iter().zip(&decoded) {
            for i in 0..3 {
                assert!((a[i] - b[i]).abs() <= 1e-6 * a[i].abs().max(1.0));
            }
        }
        let text = encode_srt_argument(&values).unwrap().join(" ");
        let from_text = decode_srt_argument(&[text]).unwrap();
        assert_eq!(from_text, decoded);
    }

    #[test]
    fn test_rejects_non_finite_and_ragged() {
        assert!(matches!(encode_number(f64::NAN), Err(CodecError::NonFinite(_))));
        assert!(matches!(encode_number(f64::INFINITY), Err(CodecError::NonFinite(_))));
        assert!(matches!(
            decode_srt_argument(&["1.0", "2.0"]),
            Err(CodecError::RaggedArgument(2))
        ));
        assert!(decode_number("-1.0").is_err());
        assert!(decode_number("min-1.0").is_err());
    }

    proptest! {
        #[test]
        fn encoded_vectors_round_trip(
            values in prop::collection::vec(prop::array::uniform3(-1e9f64..1e9), 0..8)
        ) {
            let tokens = encode_srt_argument(&values).unwrap();
            prop_assert_eq!(tokens.len(), values.len() * 3);
            let decoded = decode_srt_argument(&tokens).unwrap();
            prop_assert_eq!(decoded.len(), values.len());
            for (a, b) in values.iter().zip(&decoded) {
                for i in 0..3 {
                    prop_assert!((a[i] - b[i]).abs() <= 1e-6 * a[i].abs().max(1.0));
                }
            }
        }

        #[test]
        fn encoded_tokens_never_look_like_flags(
            values in prop::collection::vec(prop::array::uniform3(-1e9f64..1e9), 1..8)
        ) {
            let tokens = encode_srt_argument(&values).unwrap();
            for (token, value) in tokens.iter().zip(values.iter().flatten()) {
                prop_assert!(!token.starts_with('-'), "{} starts with '-'", token);
                prop_assert_eq!(token.starts_with(NEGATIVE_PREFIX), *value < 0.0);
            }
        }
    }
}
