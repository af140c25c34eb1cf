//! IdentityKey value object for user-supplied identity strings.
//!
//! An identity key is the stable, human-readable handle a configuration uses
//! to name a principal: an email, a login, an external group name, or a
//! numeric id rendered as text. Keys are validated once at construction so
//! the rest of the engine can compare and order them freely.

use crate::error::{ReconcileError, ReconcileResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;

/// A validated identity key.
///
/// ## Validation Rules
///
/// - Surrounding whitespace is trimmed
/// - Must not be empty after trimming
/// - Must not contain control characters
///
/// Keys compare byte-for-byte; `Alice@example.com` and `alice@example.com`
/// are different keys, matching how the remote directory indexes them.
///
/// ## Examples
///
/// ```rust
/// use membership_reconciler::principal::IdentityKey;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let key = IdentityKey::new("  alice@example.com ")?;
///     assert_eq!(key.as_str(), "alice@example.com");
///
///     assert!(IdentityKey::new("   ").is_err());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Create a new IdentityKey with validation.
    pub fn new(value: impl AsRef<str>) -> ReconcileResult<Self> {
        let trimmed = value.as_ref().trim();
        Self::validate_format(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    /// Get the string representation of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }

    fn validate_format(value: &str) -> ReconcileResult<()> {
        if value.is_empty() {
            return Err(ReconcileError::invalid_identity(
                "identity key cannot be empty",
            ));
        }

        if value.chars().any(char::is_control) {
            return Err(ReconcileError::invalid_identity(format!(
                "identity key '{}' contains control characters",
                value.escape_debug()
            )));
        }

        Ok(())
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IdentityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for IdentityKey {
    type Error = ReconcileError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for IdentityKey {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Serialize for IdentityKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}
