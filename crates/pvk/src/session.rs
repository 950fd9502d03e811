//! Session collaborator.
//!
//! Login and token acquisition happen elsewhere; the client core only needs to
//! read the current user and token, and to drop both when the API rejects the
//! token.

use std::sync::{PoisonError, RwLock};
use tracing::info;

/// The logged-in user, as far as the client core is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// ETH account name (`nethz`), used to scope selections and signups
    pub identifier: String,
    pub name: Option<String>,
}

/// Session data handed out by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub token: String,
}

#[derive(Debug, Clone)]
struct Active {
    user: User,
    data: SessionData,
}

/// Shared, clearable session state.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<Option<Active>>,
}

impl Session {
    /// Creates an active session for `user` authenticated by `token`.
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(Some(Active {
                user,
                data: SessionData {
                    token: token.into(),
                },
            })),
        }
    }

    /// Creates a session with nobody logged in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.user.clone())
    }

    /// The user's identifier (`nethz`), if someone is logged in.
    pub fn identifier(&self) -> Option<String> {
        self.user().map(|user| user.identifier)
    }

    pub fn token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.data.token.clone())
    }

    /// Removes all session data. Subsequent requests go out unauthenticated.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = state.take() {
            info!(user = %active.user.identifier, "Session cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_drops_user_and_token() {
        let session = Session::new(
            User {
                identifier: "jdoe".to_string(),
                name: Some("Jane".to_string()),
            },
            "secret",
        );
        assert!(session.is_active());
        assert_eq!(session.identifier().as_deref(), Some("jdoe"));
        assert_eq!(session.token().as_deref(), Some("secret"));

        session.clear();
        assert!(!session.is_active());
        assert_eq!(session.token(), None);
        assert_eq!(session.identifier(), None);
    }
}
