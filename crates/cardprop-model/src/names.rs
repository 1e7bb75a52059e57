//! Property naming rules
//!
//! Shared by property definitions and tree relationship properties, which
//! live in the same project namespace.

/// Maximum length of a property (or relationship) name
pub const PROPERTY_NAME_MAX: usize = 40;

/// Maximum length of a tree name
pub const TREE_NAME_MAX: usize = 255;

/// Characters never allowed in a property name
pub const INVALID_NAME_CHARS: &[char] = &['&', '=', '#', '"', ';', '[', ']'];

/// Predefined card attribute names, compared ignoring case
pub const RESERVED_NAMES: &[&str] = &["number", "name", "description", "type"];

/// Predefined two-word attributes, also reserved in any separator variant
pub const RESERVED_COMPOUND_NAMES: &[&str] = &["createdby", "modifiedby"];

/// Name validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Empty or whitespace only
    #[error("name can't be blank")]
    Blank,

    /// Over the length limit
    #[error("name '{name}' is too long (maximum is {max} characters)")]
    TooLong { name: String, max: usize },

    /// Contains a forbidden character
    #[error("name '{name}' should not contain '&', '=', '#', '\"', ';', '[' and ']' characters")]
    InvalidCharacters { name: String },

    /// Collides with a predefined card attribute
    #[error("'{name}' is a reserved property name")]
    Reserved { name: String },
}

/// Case-insensitive comparison key for names
#[inline]
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whether a name is one of the predefined card attributes, or a separator
/// variant of a two-word one (`created by`, `created_by`, `Created-By` ...)
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    let lowered = normalize_name(name);
    if RESERVED_NAMES.contains(&lowered.as_str()) {
        return true;
    }
    let squashed: String = lowered
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect();
    RESERVED_COMPOUND_NAMES.contains(&squashed.as_str())
}

/// Validate a name and return its trimmed form.
///
/// Uniqueness is the caller's concern; this checks the intrinsic rules.
pub fn validate_name(raw: &str, max: usize) -> Result<String, NameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(NameError::Blank);
    }
    if name.chars().count() > max {
        return Err(NameError::TooLong {
            name: name.to_string(),
            max,
        });
    }
    if name.contains(INVALID_NAME_CHARS) {
        return Err(NameError::InvalidCharacters {
            name: name.to_string(),
        });
    }
    if is_reserved(name) {
        return Err(NameError::Reserved {
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_names() {
        assert_eq!(validate_name("  story status ", 40).unwrap(), "story status");
    }

    #[test]
    fn rejects_blank() {
        assert_eq!(validate_name("   ", 40), Err(NameError::Blank));
    }

    #[test]
    fn rejects_each_invalid_character() {
        for c in INVALID_NAME_CHARS {
            let name = format!("bad{c}name");
            assert!(matches!(
                validate_name(&name, 40),
                Err(NameError::InvalidCharacters { .. })
            ));
        }
    }

    #[test]
    fn rejects_reserved_variants() {
        for name in ["Number", "NAME", "type", "created by", "Created_By", "modified-by", "ModifiedBy"] {
            assert!(
                matches!(validate_name(name, 40), Err(NameError::Reserved { .. })),
                "{name} should be reserved"
            );
        }
        assert!(validate_name("created", 40).is_ok());
        assert!(validate_name("numbers", 40).is_ok());
    }

    #[test]
    fn single_word_attributes_match_exactly() {
        for name in ["na me", "Ty-pe", "descrip_tion", "num ber"] {
            assert!(validate_name(name, 40).is_ok(), "{name} should be allowed");
        }
        assert!(is_reserved("  Description "));
    }

    #[test]
    fn length_limit_counts_characters() {
        let forty = "a".repeat(40);
        assert!(validate_name(&forty, 40).is_ok());
        let forty_one = "a".repeat(41);
        assert!(matches!(
            validate_name(&forty_one, 40),
            Err(NameError::TooLong { max: 40, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_valid_names_roundtrip_trimmed(name in "[a-z][a-z0-9 ]{0,38}[a-z0-9]") {
            prop_assume!(!is_reserved(&name));
            let validated = validate_name(&name, PROPERTY_NAME_MAX).unwrap();
            prop_assert_eq!(validated, name.trim().to_string());
        }

        #[test]
        fn prop_forbidden_characters_always_rejected(
            prefix in "[a-z]{1,10}",
            c in proptest::sample::select(INVALID_NAME_CHARS.to_vec()),
            suffix in "[a-z]{0,10}",
        ) {
            let name = format!("{prefix}{c}{suffix}");
            prop_assert!(validate_name(&name, PROPERTY_NAME_MAX).is_err());
        }
    }
}
