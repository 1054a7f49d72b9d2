//! Lowercase hex SHA-256 digests.

use std::fmt;

/// Errors raised while parsing a digest.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("SHA-256 digest must be 64 lowercase hex characters, got: '{0}'")]
    Invalid(String),
}

/// A SHA-256 digest in its canonical text form (64 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Encodes raw digest bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Validates a digest that must already be canonical.
    pub fn parse(input: &str) -> Result<Self, HashError> {
        let canonical = input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !canonical {
            return Err(HashError::Invalid(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for Sha256Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Sha256Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Sha256Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_lowercase_hex() {
        let hash = Sha256Hash::from_bytes(&[0xab; 32]);
        assert_eq!(hash.as_str(), "ab".repeat(32));
    }

    #[test]
    fn test_parse_rejects_uppercase_and_short() {
        assert!(Sha256Hash::parse(&"AB".repeat(32)).is_err());
        assert!(Sha256Hash::parse("abc").is_err());
        assert!(Sha256Hash::parse(&"0".repeat(64)).is_ok());
    }
}
