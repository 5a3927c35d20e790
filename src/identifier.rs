//! Organization identifier parsing and validation
//!
//! The catalog API addresses every organization by a UUID.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Organization identifier (a UUID)
///
/// Input is trimmed and case-insensitive; display is lowercase hyphenated.
///
/// # Examples
///
/// ```
/// use catalog_export::identifier::OrgId;
///
/// let id = OrgId::parse("3F2504E0-4F89-11D3-9A0C-0305E82C3301").unwrap();
/// assert_eq!(id.to_string(), "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrgId(Uuid);

impl OrgId {
    /// Parse an organization id
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not a well-formed UUID.
    pub fn parse(s: &str) -> Result<Self, OrgIdError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(OrgIdError::Empty);
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|e| OrgIdError::InvalidFormat(format!("{trimmed}: {e}")))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for OrgId {
    type Err = OrgIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OrgId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OrgId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Organization id errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrgIdError {
    #[error("organization id cannot be empty")]
    Empty,

    #[error("invalid organization id (expected a UUID): {0}")]
    InvalidFormat(String),
}
