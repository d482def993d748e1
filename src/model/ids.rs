//! Type-safe ID wrappers
//!
//! Prevents mixing up issue, team, user and account identifiers at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Canonical issue identifier
    IssueId
);
string_id!(
    /// Team that owns issues and their per-team number sequence
    TeamId
);
string_id!(
    /// Human actor; inbound sync may act without one
    UserId
);
string_id!(
    /// Integration account (one external-tool connection)
    AccountId
);

impl IssueId {
    /// Generate a fresh random issue id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl AccountId {
    /// Generate a fresh random account id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Generate an opaque row id for records that are never addressed by callers
pub(crate) fn row_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(IssueId::generate(), IssueId::generate());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = TeamId::new("team-eng");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"team-eng\"");
        let back: TeamId = serde_json::from_str("\"team-eng\"").unwrap();
        assert_eq!(back, id);
    }
}
