//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for facts and the records they reference.
///
/// These are business-rule failures. They carry a human-readable reason and
/// are surfaced to callers unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A record identifier was not a positive integer.
    #[error("invalid {kind}: {value}")]
    InvalidId { kind: &'static str, value: i64 },

    /// The fact has no start time.
    #[error("missing start time")]
    MissingStartTime,

    /// The fact has no activity name.
    #[error("missing activity")]
    MissingActivity,

    /// The fact ends before it starts.
    #[error("duration would be negative")]
    NegativeDuration,

    /// The fact spans more than the maximum allowed duration.
    #[error("duration would be too long (more than {max_hours} hours)")]
    TooLong { max_hours: i64 },

    /// A comma appeared where it would break search terms.
    #[error("forbidden comma in {field}: '{value}'")]
    ForbiddenComma { field: &'static str, value: String },

    /// The fact overlaps an existing one.
    #[error("{reason}")]
    Overlap { reason: String },

    /// A live record with the same name already exists.
    #[error("{kind} already exists: {name}")]
    Duplicate { kind: &'static str, name: String },
}

/// Generates a validated integer ID newtype with common trait implementations.
macro_rules! define_record_id {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: i64) -> Result<Self, ValidationError> {
                if id <= 0 {
                    return Err(ValidationError::InvalidId { kind: $kind, value: id });
                }
                Ok(Self(id))
            }

            /// Returns the raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl TryFrom<i64> for $name {
            type Error = ValidationError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ValidationError::InvalidId { kind: $kind, value: 0 })?;
                Self::new(value)
            }
        }
    };
}

define_record_id!(
    /// Identifier of a stored fact.
    ///
    /// Fact IDs are ephemeral across updates: an update replaces the fact and
    /// hands out a fresh ID.
    FactId, "fact ID"
);

define_record_id!(
    /// Identifier of an activity.
    ActivityId, "activity ID"
);

define_record_id!(
    /// Identifier of a category.
    CategoryId, "category ID"
);

define_record_id!(
    /// Identifier of a tag.
    TagId, "tag ID"
);
