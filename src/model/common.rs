use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Internal reference used for joins between the three tables.
/// Never exposed as identity to external callers; EUIDs are.
pub type InternalRef = Uuid;

pub fn new_internal_ref() -> InternalRef {
    Uuid::new_v4()
}

/// Externally-visible identifier: a registered 2-3 letter uppercase prefix
/// followed by a positive integer with no leading zeros, e.g. `PL42`.
/// Assigned once at creation and immutable for the life of the row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Euid(String);

impl Euid {
    /// Build an EUID from an already-validated prefix and counter value.
    pub(crate) fn from_parts(prefix: &str, n: u64) -> Self {
        Self(format!("{}{}", prefix, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into (prefix, numeric part). Infallible on a parsed Euid.
    pub fn prefix(&self) -> &str {
        let split = self
            .0
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.0.len());
        &self.0[..split]
    }

    /// Validate the `^[A-Z]{2,3}[1-9][0-9]*$` shape.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let prefix_len = value.chars().take_while(|c| c.is_ascii_uppercase()).count();
        let digits = &value[prefix_len..];
        let valid_prefix = (2..=3).contains(&prefix_len);
        let valid_number = !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0');
        if valid_prefix && valid_number {
            Ok(Self(value.to_string()))
        } else {
            Err(CoreError::InvalidEuid {
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for Euid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Euid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Check that a string is usable as an EUID prefix (2-3 uppercase letters).
pub fn validate_prefix(prefix: &str) -> Result<(), CoreError> {
    let ok = (2..=3).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_uppercase());
    if ok {
        Ok(())
    } else {
        Err(CoreError::Configuration {
            message: format!("invalid EUID prefix {:?}: expected 2-3 uppercase letters", prefix),
        })
    }
}

/// Typed tag on a lineage edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Contains,
    DerivedFrom,
    ProcessedBy,
    AssignedTo,
    Generic,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            RelationshipType::Contains => "contains",
            RelationshipType::DerivedFrom => "derived_from",
            RelationshipType::ProcessedBy => "processed_by",
            RelationshipType::AssignedTo => "assigned_to",
            RelationshipType::Generic => "generic",
        };
        f.write_str(tag)
    }
}

impl FromStr for RelationshipType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(RelationshipType::Contains),
            "derived_from" => Ok(RelationshipType::DerivedFrom),
            "processed_by" => Ok(RelationshipType::ProcessedBy),
            "assigned_to" => Ok(RelationshipType::AssignedTo),
            "generic" => Ok(RelationshipType::Generic),
            other => Err(CoreError::Configuration {
                message: format!("unknown relationship type {:?}", other),
            }),
        }
    }
}
