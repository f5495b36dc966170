//! Logged-in user persistence.
//!
//! The authentication collaborator hands over a [`SessionIdentity`] on login;
//! this store keeps it under the `loggedInUser` key so it survives restarts.

use tracing::{info, warn};

use supermarket_core::SessionIdentity;

use crate::local_state::{LocalState, keys};

/// Holder of the current session identity.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: Option<SessionIdentity>,
    state: Option<LocalState>,
}

impl SessionStore {
    /// A session store that is not persisted anywhere.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Rehydrate the logged-in user from `state`. Absent or malformed means anonymous.
    #[must_use]
    pub fn open(state: LocalState) -> Self {
        let current = state.read(keys::LOGGED_IN_USER);
        Self {
            current,
            state: Some(state),
        }
    }

    /// The logged-in user, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&SessionIdentity> {
        self.current.as_ref()
    }

    /// Record a successful login.
    pub fn sign_in(&mut self, identity: SessionIdentity) {
        info!(username = %identity.username, "Signed in");
        if let Some(state) = &self.state
            && let Err(e) = state.write(keys::LOGGED_IN_USER, &identity)
        {
            warn!(error = %e, "Failed to persist session");
        }
        self.current = Some(identity);
    }

    /// Forget the logged-in user.
    pub fn sign_out(&mut self) {
        if let Some(identity) = self.current.take() {
            info!(username = %identity.username, "Signed out");
        }
        if let Some(state) = &self.state
            && let Err(e) = state.remove(keys::LOGGED_IN_USER)
        {
            warn!(error = %e, "Failed to remove persisted session");
        }
    }
}
