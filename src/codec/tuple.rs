//! Tuple literals: `(1.0, -2.5, 3e-07)`.

use super::CodecError;

pub type Vec3 = [f64; 3];

/// Parse a parenthesized, comma-separated list of finite numbers.
/// A single trailing comma is accepted.
pub fn parse_tuple(text: &str) -> Result<Vec<f64>, CodecError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| CodecError::MalformedTuple(trimmed.to_string()))?;

    let inner = inner.trim();
    let inner = inner.strip_suffix(',').unwrap_or(inner);
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| parse_number(part.trim()))
        .collect()
}

pub fn parse_vec3(text: &str) -> Result<Vec3, CodecError> {
    let values = parse_tuple(text)?;
    match values.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(CodecError::WrongArity {
            text: text.trim().to_string(),
            found: values.len(),
            expected: 3,
        }),
    }
}

pub fn format_vec3(v: &Vec3) -> String {
    format!(
        "({}, {}, {})",
        float_text(v[0]),
        float_text(v[1]),
        float_text(v[2])
    )
}

/// Shortest text that parses back to the same value. `-0.0` prints as `0.0`.
pub(crate) fn float_text(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:?}", value)
}

/// Strict decimal number: optional sign, digits with an optional fraction,
/// optional exponent. `inf` and `nan` spellings are rejected.
pub(crate) fn parse_number(text: &str) -> Result<f64, CodecError> {
    if !is_decimal(text) {
        return Err(CodecError::InvalidNumber(text.to_string()));
    }
    text.parse::<f64>()
        .map_err(|_| CodecError::InvalidNumber(text.to_string()))
}

fn is_decimal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == bytes.len()
}
