//! Live update lines.
//!
//! The live CLI prints updates as one flat `|`-separated field list holding
//! `reference | translation | rotation` triples, mixed with log chatter. Only
//! lines mentioning the current project URL are considered.

use serde::Serialize;

use crate::codec::{parse_vec3, Vec3};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUpdate {
    pub reference_path: String,
    pub translation: Vec3,
    /// Euler degrees in record (X, Y, Z) order.
    pub rotation_xyz: Vec3,
}

/// Parse one stdout line. `None` means the line is not a live update.
///
/// Fields that do not start a well-formed triple (a leading project prefix,
/// filler, a truncated record) are skipped.
pub fn parse_live_line(line: &str, project_url: &str) -> Option<Vec<LiveUpdate>> {
    if project_url.is_empty() || !line.contains(project_url) || !line.contains('|') {
        return None;
    }

    let mut fields: Vec<&str> = line.split('|').map(str::trim).collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }

    let mut updates = Vec::new();
    let mut i = 0;
    while i + 2 < fields.len() {
        let reference = fields[i];
        match (parse_vec3(fields[i + 1]), parse_vec3(fields[i + 2])) {
            (Ok(translation), Ok(rotation_xyz)) if !reference.is_empty() => {
                updates.push(LiveUpdate {
                    reference_path: reference.to_string(),
                    translation,
                    rotation_xyz,
                });
                i += 3;
            }
            _ => i += 1,
        }
    }
    Some(updates)
}
