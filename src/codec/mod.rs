//! Transform Codec
//!
//! Text formats used to move component placements across the CLI boundary:
//! tuple literals in assembly records, min-escaped numbers in move arguments,
//! and the rotation axis-order conversion between the two sides.

pub mod axis;
pub mod record;
pub mod srt_arg;
pub mod tuple;

pub use record::{decode_record, decode_records, encode_record, exchange_path_for, ComponentRecord};
pub use srt_arg::{decode_srt_argument, encode_srt_argument};
pub use tuple::{format_vec3, parse_vec3, Vec3};

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Malformed tuple literal '{0}': expected (x, y, z)")]
    MalformedTuple(String),
    #[error("Tuple literal '{text}' has {found} components, expected {expected}")]
    WrongArity {
        text: String,
        found: usize,
        expected: usize,
    },
    #[error("Invalid number '{0}' in transform data")]
    InvalidNumber(String),
    #[error("Non-finite value {0} cannot be sent to the remote CLI")]
    NonFinite(f64),
    #[error("Assembly record has no reference path: '{0}'")]
    MissingReference(String),
    #[error("Assembly record '{line}' has {found} fields, expected 4")]
    WrongFieldCount { line: String, found: usize },
    #[error("Transform argument holds {0} numbers, not a multiple of 3")]
    RaggedArgument(usize),
}

impl Serialize for CodecError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
