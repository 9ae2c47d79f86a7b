//! Pipe-delimited assembly records.
//!
//! One line per component:
//! `reference-path | translation | rotation | scale`, each vector a tuple
//! literal. Missing vectors take their defaults.

use serde::{Deserialize, Serialize};

use super::axis;
use super::tuple::{format_vec3, parse_vec3, Vec3};
use super::CodecError;

pub const DEFAULT_TRANSLATION: Vec3 = [0.0, 0.0, 0.0];
pub const DEFAULT_ROTATION: Vec3 = [0.0, 0.0, 0.0];
pub const DEFAULT_SCALE: Vec3 = [1.0, 1.0, 1.0];

const DESCRIPTOR_SUFFIXES: &[&str] = &[".usda", ".usdc", ".usdz", ".usd"];
const EXCHANGE_SUFFIX: &str = ".stp";

/// One component reference of a remote assembly, as the remote side stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub reference_path: String,
    pub exchange_path: String,
    pub translation: Vec3,
    /// Euler degrees in (X, Y, Z) order.
    pub rotation_xyz: Vec3,
    pub scale: Vec3,
}

impl ComponentRecord {
    pub fn new(reference_path: impl Into<String>) -> Self {
        let reference_path = reference_path.into();
        Self {
            exchange_path: exchange_path_for(&reference_path),
            reference_path,
            translation: DEFAULT_TRANSLATION,
            rotation_xyz: DEFAULT_ROTATION,
            scale: DEFAULT_SCALE,
        }
    }

    /// Rotation in local (Z, Y, X) order.
    pub fn rotation_zyx(&self) -> Vec3 {
        axis::remote_to_local(self.rotation_xyz)
    }
}

/// Exchange-file path paired with a descriptor path: same stem, `.stp` suffix.
pub fn exchange_path_for(reference_path: &str) -> String {
    let lower = reference_path.to_ascii_lowercase();
    for suffix in DESCRIPTOR_SUFFIXES {
        if lower.ends_with(suffix) {
            let stem = &reference_path[..reference_path.len() - suffix.len()];
            return format!("{}{}", stem, EXCHANGE_SUFFIX);
        }
    }
    format!("{}{}", reference_path, EXCHANGE_SUFFIX)
}

/// Decode one line. Lines without a `|` are not records and yield `None`.
pub fn decode_record(line: &str) -> Result<Option<ComponentRecord>, CodecError> {
    if !line.contains('|') {
        return Ok(None);
    }
    let mut fields: Vec<&str> = line.split('|').map(str::trim).collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    if fields.len() > 4 {
        return Err(CodecError::WrongFieldCount {
            line: line.trim().to_string(),
            found: fields.len(),
        });
    }
    let reference = fields.first().copied().unwrap_or("");
    if reference.is_empty() {
        return Err(CodecError::MissingReference(line.trim().to_string()));
    }

    let vector = |index: usize, default: Vec3| -> Result<Vec3, CodecError> {
        match fields.get(index) {
            Some(text) if !text.is_empty() => parse_vec3(text),
            _ => Ok(default),
        }
    };

    let mut record = ComponentRecord::new(reference);
    record.translation = vector(1, DEFAULT_TRANSLATION)?;
    record.rotation_xyz = vector(2, DEFAULT_ROTATION)?;
    record.scale = vector(3, DEFAULT_SCALE)?;
    Ok(Some(record))
}

/// Decode every record line of a CLI response, skipping informational lines.
pub fn decode_records<'a, I>(lines: I) -> Result<Vec<ComponentRecord>, CodecError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut records = Vec::new();
    for line in lines {
        if let Some(record) = decode_record(line)? {
            records.push(record);
        }
    }
    Ok(records)
}

pub fn encode_record(record: &ComponentRecord) -> String {
    format!(
        "{} | {} | {} | {}",
        record.reference_path,
        format_vec3(&record.translation),
        format_vec3(&record.rotation_xyz),
        format_vec3(&record.scale)
    )
}
