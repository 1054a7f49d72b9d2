//! Implementation of [`FileId`].

use crate::{UuidError, UuidResult};
use depot_types::NonEmptyText;
use std::{fmt, str::FromStr};

use ::uuid::Uuid;

/// Opaque identifier of one logical file.
///
/// # Construction
/// - [`FileId::new`] generates a new canonical UUID (first store of a path).
/// - [`FileId::parse`] wraps an externally supplied token.
///
/// The identifier is compared byte-for-byte; two spellings of the same UUID are two different
/// identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl FileId {
    /// Generates a new identifier in canonical form.
    ///
    /// The generated UUID is random (RFC 4122 version 4), so two calls never collide in practice.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an externally supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is empty or contains whitespace or control
    /// characters.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if input.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(UuidError::InvalidInput(format!(
                "identifier must not contain whitespace or control characters, got: '{}'",
                input.escape_debug()
            )));
        }
        NonEmptyText::new(input)
            .map(|text| Self(text.into_string()))
            .map_err(|_| UuidError::InvalidInput("identifier cannot be empty".into()))
    }

    /// Decodes an identifier stored as raw index bytes.
    pub fn from_bytes(bytes: &[u8]) -> UuidResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| UuidError::InvalidInput(format!("identifier is not UTF-8: {}", e)))?;
        Self::parse(text)
    }

    /// Returns true if `input` is in canonical UUID form.
    ///
    /// This is a purely syntactic check: exactly 32 bytes of `0-9` and `a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FileId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FileId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_canonical_uuid() {
        let id = FileId::new();
        assert_eq!(id.as_str().len(), 32);
        assert!(FileId::is_canonical(id.as_str()));
    }

    #[test]
    fn test_generated_id_parses_to_itself() {
        let id = FileId::new();
        assert_eq!(FileId::parse(id.as_str()).unwrap(), id);
        assert_eq!(FileId::from_bytes(id.as_bytes()).unwrap(), id);
    }

    #[test]
    fn test_new_is_unique() {
        let ids: std::collections::HashSet<FileId> = (0..100).map(|_| FileId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_parse_accepts_hyphenated_uuid() {
        let hyphenated = "550e8400-e29b-41d4-a716-446655440000";
        let id = FileId::parse(hyphenated).unwrap();
        assert_eq!(id.to_string(), hyphenated);
        assert!(!FileId::is_canonical(id.as_str()));
    }

    #[test]
    fn test_parse_rejects_empty_and_whitespace() {
        assert!(FileId::parse("").is_err());
        assert!(FileId::parse("abc def").is_err());
        match FileId::parse("abc\ndef") {
            Err(UuidError::InvalidInput(msg)) => assert!(msg.contains("whitespace")),
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let id = FileId::new();
        let decoded = FileId::from_bytes(id.as_bytes()).unwrap();
        assert_eq!(decoded, id);
        assert!(FileId::from_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id = FileId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");
        let back: FileId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
