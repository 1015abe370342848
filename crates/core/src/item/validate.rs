//! Identifier shape checks for type names, aliases and property names.
//! No data dictionary lookup happens here.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("item type name cannot be empty")]
    EmptyTypeName,
    #[error("property name cannot be empty")]
    EmptyPropertyName,
    #[error("alias cannot be empty")]
    EmptyAlias,
    #[error("{kind} {name:?} contains reserved character {found:?}")]
    ReservedChar {
        kind: &'static str,
        name: String,
        found: char,
    },
    #[error("alias {0:?} is not a valid identifier")]
    InvalidAlias(String),
    #[error("{kind} {name:?} is not a valid identifier")]
    InvalidIdentifier { kind: &'static str, name: String },
}

const RESERVED: &[char] = &['\'', '"', '[', ']', '<', '>', '&'];

fn check_reserved(kind: &'static str, name: &str) -> Result<(), ValidationError> {
    match name.chars().find(|c| RESERVED.contains(c)) {
        Some(found) => Err(ValidationError::ReservedChar {
            kind,
            name: name.to_string(),
            found,
        }),
        None => Ok(()),
    }
}

/// Validate an item type name such as `Part` or `Part BOM`.
pub fn validate_type_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyTypeName);
    }
    check_reserved("type name", name)
}

/// Validate a property name such as `item_number` or `xp-color`.
pub fn validate_property_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyPropertyName);
    }
    if let Some(found) = name.chars().find(|c| c.is_whitespace()) {
        return Err(ValidationError::ReservedChar {
            kind: "property name",
            name: name.to_string(),
            found,
        });
    }
    check_reserved("property name", name)
}

/// `[A-Za-z_]` followed by characters accepted by `rest`.
fn is_identifier(name: &str, rest: impl Fn(char) -> bool) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(rest),
        _ => false,
    }
}

fn word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn check_identifier(kind: &'static str, name: &str) -> Result<(), ValidationError> {
    if is_identifier(name, word_char) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        })
    }
}

/// Validate a table alias: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_alias(alias: &str) -> Result<(), ValidationError> {
    if alias.is_empty() {
        return Err(ValidationError::EmptyAlias);
    }
    if is_identifier(alias, word_char) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAlias(alias.to_string()))
    }
}

/// Validate a function name such as `UPPER` or `DATEADD`.
pub fn validate_function_name(name: &str) -> Result<(), ValidationError> {
    check_identifier("function name", name)
}

/// Validate a parameter name, written after `@`.
pub fn validate_parameter_name(name: &str) -> Result<(), ValidationError> {
    check_identifier("parameter name", name)
}

/// Validate a property name used as a wire-document tag: a property name
/// that is also an XML name without namespace colons, `[A-Za-z_][A-Za-z0-9_.-]*`.
pub fn validate_tag_name(name: &str) -> Result<(), ValidationError> {
    validate_property_name(name)?;
    if is_identifier(name, |c| word_char(c) || c == '-' || c == '.') {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            kind: "tag name",
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert!(validate_type_name("Part BOM").is_ok());
        assert_eq!(validate_type_name("  "), Err(ValidationError::EmptyTypeName));
        assert!(matches!(
            validate_type_name("Part'"),
            Err(ValidationError::ReservedChar { found: '\'', .. })
        ));
    }

    #[test]
    fn property_names() {
        assert!(validate_property_name("xp-color").is_ok());
        assert!(validate_property_name("item number").is_err());
        assert_eq!(
            validate_property_name(""),
            Err(ValidationError::EmptyPropertyName)
        );
    }

    #[test]
    fn aliases() {
        assert!(validate_alias("p1").is_ok());
        assert!(validate_alias("_bom").is_ok());
        assert_eq!(validate_alias(""), Err(ValidationError::EmptyAlias));
        assert_eq!(
            validate_alias("1p"),
            Err(ValidationError::InvalidAlias("1p".into()))
        );
        assert!(validate_alias("part bom").is_err());
    }

    #[test]
    fn function_and_parameter_names() {
        assert!(validate_function_name("DATEADD").is_ok());
        assert!(validate_parameter_name("state_1").is_ok());
        assert_eq!(
            validate_function_name("UPPER(x); --"),
            Err(ValidationError::InvalidIdentifier {
                kind: "function name",
                name: "UPPER(x); --".into()
            })
        );
        assert!(validate_parameter_name("").is_err());
        assert!(validate_parameter_name("1st").is_err());
    }

    #[test]
    fn tag_names() {
        assert!(validate_tag_name("xp-color").is_ok());
        assert!(validate_tag_name("classification.path").is_ok());
        for name in ["a/b", "x,y", "ns:name", "2nd", "a=b"] {
            assert_eq!(
                validate_tag_name(name),
                Err(ValidationError::InvalidIdentifier {
                    kind: "tag name",
                    name: name.into()
                }),
                "{name}"
            );
        }
        assert_eq!(validate_tag_name(""), Err(ValidationError::EmptyPropertyName));
    }
}
