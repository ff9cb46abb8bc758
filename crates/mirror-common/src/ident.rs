//! Identifier validation
//!
//! Table names come out of a third-party manifest and language codes out of
//! configuration; both end up interpolated into SQL where bind parameters
//! cannot be used. Everything that crosses that boundary goes through here.

use thiserror::Error;

/// Error raised for a name that cannot be safely used as an SQL identifier
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid identifier: {0:?}")]
pub struct InvalidIdent(pub String);

/// Validate a name for use as an unquoted SQL identifier.
///
/// Accepts ASCII alphanumerics and underscores, not starting with a digit.
pub fn validate(name: &str) -> Result<&str, InvalidIdent> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        None => false,
    };

    if valid {
        Ok(name)
    } else {
        Err(InvalidIdent(name.to_string()))
    }
}

/// Normalize a language code into an identifier fragment.
///
/// Locale codes such as `zh-cht` use hyphens, which are not valid in the
/// namespace names derived from them; they become underscores.
pub fn normalize_language(language: &str) -> Result<String, InvalidIdent> {
    let normalized = language.to_ascii_lowercase().replace('-', "_");
    validate(&normalized)?;
    Ok(normalized)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_plain_names() {
        assert!(validate("InventoryItemDefinition").is_ok());
        assert!(validate("manifest_version").is_ok());
        assert!(validate("_private").is_ok());
    }

    #[test]
    fn test_validate_rejects_injection_attempts() {
        assert!(validate("items; DROP TABLE items").is_err());
        assert!(validate("items\"").is_err());
        assert!(validate("").is_err());
        assert!(validate("1items").is_err());
        assert!(validate("ite ms").is_err());
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("zh-cht").unwrap(), "zh_cht");
        assert_eq!(normalize_language("EN").unwrap(), "en");
        assert_eq!(normalize_language("pt-br").unwrap(), "pt_br");
    }

    #[test]
    fn test_normalize_language_rejects_garbage() {
        assert!(normalize_language("en;--").is_err());
        assert!(normalize_language("").is_err());
    }
}
