//! Membership roles.
//!
//! The remote system reports roles in title case (`Admin`, `Editor`,
//! `Viewer`, `None`). Configuration files often use lower case, and the
//! organization form groups users into plural lists (`admins`, `editors`,
//! ...). Parsing accepts either case; display is always title case.

use crate::error::{ReconcileError, ReconcileResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A role a principal holds within a scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Admin,
    Editor,
    Viewer,
    /// Member of the organization with no basic role.
    None,
    /// A role name the engine does not know about. Compared by exact name.
    Custom(String),
}

impl Role {
    /// The built-in roles, in the order the organization form lists them.
    pub const BUILTIN: [Role; 4] = [Role::Admin, Role::Editor, Role::Viewer, Role::None];

    /// Parse a role name.
    ///
    /// Built-in names match case-insensitively. Anything else non-blank
    /// becomes [`Role::Custom`].
    pub fn parse(value: &str) -> ReconcileResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ReconcileError::invalid_identity("role name cannot be empty"));
        }

        let role = match trimmed.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            "viewer" => Role::Viewer,
            "none" => Role::None,
            _ => Role::Custom(trimmed.to_string()),
        };
        Ok(role)
    }

    /// The plural list name the organization form uses for a built-in role.
    ///
    /// `Admin` → `admins`, `Editor` → `editors`, `Viewer` → `viewers`,
    /// `None` → `nones`.
    pub fn list_name(&self) -> Option<&'static str> {
        match self {
            Role::Admin => Some("admins"),
            Role::Editor => Some("editors"),
            Role::Viewer => Some("viewers"),
            Role::None => Some("nones"),
            Role::Custom(_) => Option::None,
        }
    }

    /// The title-case name the remote system uses.
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "Admin",
            Role::Editor => "Editor",
            Role::Viewer => "Viewer",
            Role::None => "None",
            Role::Custom(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}
