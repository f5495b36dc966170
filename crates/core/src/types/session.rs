//! Session identity supplied by the authentication collaborator.

use serde::{Deserialize, Serialize};

/// Role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// A shopper (`NormalUser` in the store).
    #[default]
    Normal,
    /// A catalog administrator.
    Admin,
}

/// The logged-in user, as persisted under the `loggedInUser` key.
///
/// Minimal data needed to attribute an order to a shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    /// Login name, matched against the store's `hasUsername` fact.
    pub username: String,
    /// Opaque reference to the user entity, if the authenticator knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_reference: Option<String>,
    /// Role of the user.
    #[serde(default)]
    pub role: UserRole,
}

impl SessionIdentity {
    /// Create a shopper identity for a username.
    #[must_use]
    pub fn shopper(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_reference: None,
            role: UserRole::Normal,
        }
    }
}
