//! Naming and link rules for remote objects.
//!
//! Names of projects, assets and assemblies become remote file and folder
//! names, so they are checked locally before any remote call is made.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Human-readable statement of the naming rule, surfaced with every rejection.
pub const NAME_RULE: &str =
    "must start with a letter and contain only letters, digits, or underscores (no spaces)";

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid name pattern"));

static SUFFIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(usd|usda|usdc|usdz|stp|step)$").expect("valid suffix pattern")
});

static DUPLICATE_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:])//+").expect("valid slash pattern"));

/// Substrings a project link may not contain; they mark asset and assembly folders.
const RESERVED_PROJECT_SEGMENTS: &[&str] = &["asset", "assembly"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NameError {
    #[error("Invalid {kind} name '{name}': {rule}", rule = NAME_RULE)]
    InvalidName { kind: &'static str, name: String },
    #[error("No {kind} name given: a name {rule}", rule = NAME_RULE)]
    EmptyName { kind: &'static str },
    #[error("Invalid project link '{0}': a project link may not point inside an 'asset' or 'assembly' folder")]
    ReservedProjectLink(String),
    #[error("Invalid link '{0}': expected the form scheme://host/path")]
    MalformedLink(String),
}

/// Check a name against the remote naming rule.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::EmptyName { kind });
    }
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(NameError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Validate and normalize a project link.
pub fn validate_project_link(link: &str) -> Result<String, NameError> {
    let cleaned = clean_url(link.trim());
    let Some((scheme, rest)) = cleaned.split_once("://") else {
        return Err(NameError::MalformedLink(link.to_string()));
    };
    if scheme.is_empty() || rest.is_empty() {
        return Err(NameError::MalformedLink(link.to_string()));
    }
    let path = rest.split_once('/').map(|(_, path)| path).unwrap_or("");
    if RESERVED_PROJECT_SEGMENTS
        .iter()
        .any(|segment| path.contains(segment))
    {
        return Err(NameError::ReservedProjectLink(link.to_string()));
    }
    Ok(cleaned.trim_end_matches('/').to_string())
}

/// Collapse repeated slashes that follow the scheme separator.
pub fn clean_url(url: &str) -> String {
    DUPLICATE_SLASHES.replace_all(url, "$1/").into_owned()
}

/// Drop a descriptor or exchange-file extension.
pub fn strip_suffixes(item: &str) -> String {
    SUFFIX_PATTERN.replace(item, "").into_owned()
}

/// Last path segment of a link, without its extension.
pub fn component_name(link: &str) -> String {
    strip_suffixes(file_name(link))
}

/// Last path segment of a link.
pub fn file_name(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_names() {
        for name in ["a", "myAssy", "Bracket_2", "Z9_x_"] {
            assert!(validate_name("assembly", name).is_ok(), "{name} should pass");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["1abc", "_abc", "my assy", " lead", "tab\tname", "dash-name", "ünï"] {
            let err = validate_name("assembly", name).unwrap_err();
            assert!(matches!(err, NameError::InvalidName { .. }), "{name} should fail");
            assert!(err.to_string().contains("must start with a letter"));
        }
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(
            validate_name("asset", ""),
            Err(NameError::EmptyName { kind: "asset" })
        );
    }

    #[test]
    fn test_project_link_rules() {
        assert_eq!(
            validate_project_link("omniverse://host//Projects/FreeCAD/demo/").unwrap(),
            "omniverse://host/Projects/FreeCAD/demo"
        );
        assert!(matches!(
            validate_project_link("omniverse://host/Projects/demo/assets/a"),
            Err(NameError::ReservedProjectLink(_))
        ));
        assert!(matches!(
            validate_project_link("omniverse://host/Projects/demo/assembly"),
            Err(NameError::ReservedProjectLink(_))
        ));
        assert!(matches!(
            validate_project_link("not a link"),
            Err(NameError::MalformedLink(_))
        ));
    }

    #[test]
    fn test_reserved_segments_only_checked_in_path() {
        assert_eq!(
            validate_project_link("omniverse://assethost/Projects/x").unwrap(),
            "omniverse://assethost/Projects/x"
        );
        assert!(validate_project_link("omniverse://assembly-srv/Projects/x").is_ok());
        assert!(matches!(
            validate_project_link("omniverse://assethost/Projects/x/assembly"),
            Err(NameError::ReservedProjectLink(_))
        ));
    }

    #[test]
    fn test_clean_url_keeps_scheme() {
        assert_eq!(clean_url("omniverse://h///a//b"), "omniverse://h/a/b");
    }

    #[test]
    fn test_suffix_helpers() {
        assert_eq!(strip_suffixes("parts/Bracket.usda"), "parts/Bracket");
        assert_eq!(strip_suffixes("Bracket.STEP"), "Bracket");
        assert_eq!(strip_suffixes("Bracket.txt"), "Bracket.txt");
        assert_eq!(component_name("omniverse://h/p/assets/Bracket/Bracket.stp"), "Bracket");
        assert_eq!(file_name("omniverse://h/p/assembly/myAssy.usda"), "myAssy.usda");
    }

    proptest! {
        #[test]
        fn letter_led_identifiers_pass(name in "[A-Za-z][A-Za-z0-9_]{0,30}") {
            prop_assert!(validate_name("asset", &name).is_ok());
        }

        #[test]
        fn digit_or_underscore_led_names_fail(name in "[0-9_][A-Za-z0-9_]{0,20}") {
            prop_assert!(
                matches!(validate_name("asset", &name), Err(NameError::InvalidName { .. })),
                "{} should fail",
                name
            );
        }

        #[test]
        fn names_with_whitespace_fail(
            head in "[A-Za-z][A-Za-z0-9_]{0,10}",
            gap in "[ \t\n]{1,3}",
            tail in "[A-Za-z0-9_]{0,10}",
        ) {
            let name = format!("{head}{gap}{tail}");
            prop_assert!(validate_name("asset", &name).is_err());
        }
    }
}
