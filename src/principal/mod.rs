//! Principals under reconciliation.
//!
//! A [`Principal`] is one identity inside one scope: a user in an
//! organization, a member of a team, an external group synced to a team, or
//! a user/team/service account holding a role. It is keyed by the identity
//! string the configuration uses and carries the remote id once resolved.

pub mod identity_key;
pub mod role;

pub use identity_key::IdentityKey;
pub use role::Role;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier assigned by the remote system.
///
/// Users, teams and service accounts have numeric ids; external groups are
/// identified by their group name. Both are carried as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a remote identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string form of the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the id as a numeric id, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<i64> for RemoteId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RemoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An identity under reconciliation.
///
/// `role` is `None` for presence-only scopes (team members, external groups,
/// role assignees). `remote_id` is `None` until the identity resolver has
/// looked the key up.
///
/// # Examples
///
/// ```rust
/// use membership_reconciler::principal::{IdentityKey, Principal, Role};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let editor = Principal::with_role(IdentityKey::new("alice@example.com")?, Role::Editor);
///     assert_eq!(editor.role(), Some(&Role::Editor));
///     assert!(editor.remote_id().is_none());
///
///     let member = Principal::member(IdentityKey::new("bob@example.com")?);
///     assert!(member.role().is_none());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    identity_key: IdentityKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_id: Option<RemoteId>,
}

impl Principal {
    /// Create a principal holding a role.
    pub fn with_role(identity_key: IdentityKey, role: Role) -> Self {
        Self {
            identity_key,
            role: Some(role),
            remote_id: None,
        }
    }

    /// Create a presence-only principal.
    pub fn member(identity_key: IdentityKey) -> Self {
        Self {
            identity_key,
            role: None,
            remote_id: None,
        }
    }

    /// Attach the resolved remote id.
    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    /// The user-supplied identity key.
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// The role, if the scope tracks roles.
    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    /// The resolved remote id, if resolution has happened.
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    pub(crate) fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Some(role) => write!(f, "{} ({})", self.identity_key, role),
            None => write!(f, "{}", self.identity_key),
        }
    }
}
