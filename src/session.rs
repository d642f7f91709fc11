//! The authenticated-user context handed to the sync engines.
//!
//! Identity itself comes from an external provider; all the engines need is
//! the user id that scopes the document collections.

/// Who the engines are currently syncing for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    /// A session for a signed-in user.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    /// A session with nobody signed in. Every mutation is a no-op.
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }
}
