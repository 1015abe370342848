//! Item ID parsing utilities.
//!
//! Item IDs follow the server's conventions:
//! - Canonical: 32 upper-case hex digits, no separators
//! - Accepted on input: lower case, hyphenated GUID form, optional braces

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

const ID_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("item id cannot be empty")]
    Empty,
    #[error("item id must have 32 hex digits, found {0}")]
    InvalidLength(usize),
    #[error("item id contains invalid character {0:?}")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a fresh random ID.
    pub fn new() -> Self {
        ItemId(Uuid::new_v4().simple().to_string().to_ascii_uppercase())
    }

    /// Parse an item ID in any of the accepted forms.
    pub fn parse(id: &str) -> Result<Self, IdError> {
        let trimmed = id.trim();
        let trimmed = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }

        let mut canonical = String::with_capacity(ID_LEN);
        for c in trimmed.chars() {
            match c {
                '-' => continue,
                c if c.is_ascii_hexdigit() => canonical.push(c.to_ascii_uppercase()),
                c => return Err(IdError::InvalidChar(c)),
            }
        }
        if canonical.len() != ID_LEN {
            return Err(IdError::InvalidLength(canonical.len()));
        }
        Ok(ItemId(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemId::parse(s)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ItemId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_canonical_id() {
        let id = ItemId::parse("4F1AC04A2B48414383E8BFB2E2F6DE86").unwrap();
        assert_eq!(id.as_str(), "4F1AC04A2B48414383E8BFB2E2F6DE86");
        assert_eq!(id.to_string(), "4F1AC04A2B48414383E8BFB2E2F6DE86");
    }

    #[test]
    fn parse_guid_form() {
        let id = ItemId::parse("{4f1ac04a-2b48-4143-83e8-bfb2e2f6de86}").unwrap();
        assert_eq!(id.as_str(), "4F1AC04A2B48414383E8BFB2E2F6DE86");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(ItemId::parse(""), Err(IdError::Empty));
        assert_eq!(ItemId::parse("ABC"), Err(IdError::InvalidLength(3)));
        assert_eq!(
            ItemId::parse("4F1AC04A2B48414383E8BFB2E2F6DE8Z"),
            Err(IdError::InvalidChar('Z'))
        );
    }

    #[test]
    fn new_ids_are_canonical_and_distinct() {
        let a = ItemId::new();
        let b = ItemId::new();
        assert_ne!(a, b);
        assert_eq!(ItemId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = ItemId::parse("4F1AC04A2B48414383E8BFB2E2F6DE86").unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!("4F1AC04A2B48414383E8BFB2E2F6DE86"));
        let back: ItemId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
