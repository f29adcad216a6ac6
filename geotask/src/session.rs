//! Session context: who is signed in right now.
//!
//! The synchronizer and the profile service never look the current user up
//! globally; they receive a [`SessionContext`] at construction time. An
//! absent user makes every user-scoped operation a no-op.

use std::sync::Arc;

use parking_lot::RwLock;

use geotask_proto::user::UserId;

/// Supplies the identity of the currently authenticated user.
pub trait SessionContext: Send + Sync {
    /// Returns the signed-in user, or `None` when no session is active.
    fn current_user_id(&self) -> Option<UserId>;
}

impl<T: SessionContext + ?Sized> SessionContext for Arc<T> {
    fn current_user_id(&self) -> Option<UserId> {
        (**self).current_user_id()
    }
}

/// A fixed session, useful for single-user tools and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSession(Option<UserId>);

impl StaticSession {
    /// A session permanently signed in as `user`.
    #[must_use]
    pub const fn signed_in(user: UserId) -> Self {
        Self(Some(user))
    }

    /// A session with nobody signed in.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self(None)
    }
}

impl SessionContext for StaticSession {
    fn current_user_id(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// A session shared between the auth layer (writer) and every consumer
/// (readers). Cloning yields another handle to the same session.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    user: Arc<RwLock<Option<UserId>>>,
}

impl SharedSession {
    /// Creates a session with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user` as signed in, replacing any previous user.
    pub fn set_user(&self, user: UserId) {
        tracing::debug!(user = %user, "session started");
        *self.user.write() = Some(user);
    }

    /// Ends the session.
    pub fn clear(&self) {
        if self.user.write().take().is_some() {
            tracing::debug!("session ended");
        }
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.user.read().is_some()
    }
}

impl SessionContext for SharedSession {
    fn current_user_id(&self) -> Option<UserId> {
        self.user.read().clone()
    }
}
