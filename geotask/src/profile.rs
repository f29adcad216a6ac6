//! Profile and settings documents of the signed-in user.
//!
//! Each user owns three documents besides the task list: the profile
//! (email and username), the settings document holding the GPS tracking
//! switch, and the single last-known location. Writes to settings and
//! location merge into the existing document.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::RwLock;

use geotask_proto::user::{LocationFix, Preferences, UserId, UserProfile};

use crate::auth::AuthError;
use crate::session::SessionContext;
use crate::store::StoreError;

/// Errors from [`ProfileService`] and username changes.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No user is signed in.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Username was empty after trimming.
    #[error("username cannot be empty")]
    EmptyUsername,

    /// The profile document does not exist yet.
    #[error("profile not found for {0}")]
    NotFound(UserId),

    /// The backing store failed.
    #[error("profile store error: {0}")]
    Store(#[from] StoreError),

    /// The auth provider rejected the display name change.
    #[error("account update failed: {0}")]
    Account(#[from] AuthError),
}

/// Remote storage of per-user profile, settings and location documents.
pub trait ProfileStore: Send + Sync {
    /// Reads the profile document, if it exists.
    fn get_profile(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;

    /// Writes `profile` unless a profile document already exists.
    ///
    /// Returns true if the document was created.
    fn ensure_profile(
        &self,
        user: &UserId,
        profile: &UserProfile,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Changes the username of an existing profile.
    ///
    /// Fails with [`StoreError::NotFound`] if there is no profile.
    fn update_username(
        &self,
        user: &UserId,
        username: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads the settings document; a missing document reads as defaults.
    fn preferences(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Preferences, StoreError>> + Send;

    /// Merges the GPS tracking switch into the settings document.
    fn set_gps_tracking(
        &self,
        user: &UserId,
        enabled: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrites the last-known location.
    fn save_location(
        &self,
        user: &UserId,
        fix: &LocationFix,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads the last-known location, if any was saved.
    fn last_location(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Option<LocationFix>, StoreError>> + Send;
}

impl<T: ProfileStore> ProfileStore for Arc<T> {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError> {
        (**self).get_profile(user).await
    }

    async fn ensure_profile(
        &self,
        user: &UserId,
        profile: &UserProfile,
    ) -> Result<bool, StoreError> {
        (**self).ensure_profile(user, profile).await
    }

    async fn update_username(&self, user: &UserId, username: &str) -> Result<(), StoreError> {
        (**self).update_username(user, username).await
    }

    async fn preferences(&self, user: &UserId) -> Result<Preferences, StoreError> {
        (**self).preferences(user).await
    }

    async fn set_gps_tracking(&self, user: &UserId, enabled: bool) -> Result<(), StoreError> {
        (**self).set_gps_tracking(user, enabled).await
    }

    async fn save_location(&self, user: &UserId, fix: &LocationFix) -> Result<(), StoreError> {
        (**self).save_location(user, fix).await
    }

    async fn last_location(&self, user: &UserId) -> Result<Option<LocationFix>, StoreError> {
        (**self).last_location(user).await
    }
}

#[derive(Debug, Default)]
struct UserDocuments {
    profile: Option<UserProfile>,
    preferences: Preferences,
    location: Option<LocationFix>,
}

/// In-memory [`ProfileStore`].
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    users: RwLock<HashMap<UserId, UserDocuments>>,
    offline: AtomicBool,
}

impl InMemoryProfileStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("profile store offline".into()));
        }
        Ok(())
    }
}

impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.check_online()?;
        Ok(self
            .users
            .read()
            .await
            .get(user)
            .and_then(|docs| docs.profile.clone()))
    }

    async fn ensure_profile(
        &self,
        user: &UserId,
        profile: &UserProfile,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut users = self.users.write().await;
        let docs = users.entry(user.clone()).or_default();
        if docs.profile.is_some() {
            return Ok(false);
        }
        docs.profile = Some(profile.clone());
        Ok(true)
    }

    async fn update_username(&self, user: &UserId, username: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut users = self.users.write().await;
        let profile = users
            .get_mut(user)
            .and_then(|docs| docs.profile.as_mut())
            .ok_or_else(|| StoreError::NotFound(format!("users/{user}")))?;
        profile.username = username.to_string();
        Ok(())
    }

    async fn preferences(&self, user: &UserId) -> Result<Preferences, StoreError> {
        self.check_online()?;
        Ok(self
            .users
            .read()
            .await
            .get(user)
            .map(|docs| docs.preferences)
            .unwrap_or_default())
    }

    async fn set_gps_tracking(&self, user: &UserId, enabled: bool) -> Result<(), StoreError> {
        self.check_online()?;
        self.users
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .preferences
            .gps_tracking = enabled;
        Ok(())
    }

    async fn save_location(&self, user: &UserId, fix: &LocationFix) -> Result<(), StoreError> {
        self.check_online()?;
        self.users
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .location = Some(*fix);
        Ok(())
    }

    async fn last_location(&self, user: &UserId) -> Result<Option<LocationFix>, StoreError> {
        self.check_online()?;
        Ok(self
            .users
            .read()
            .await
            .get(user)
            .and_then(|docs| docs.location))
    }
}

/// Profile operations on behalf of the signed-in user.
pub struct ProfileService<P, C> {
    store: P,
    session: C,
}

impl<P: ProfileStore, C: SessionContext> ProfileService<P, C> {
    /// Creates a service over `store` for whoever `session` reports.
    pub const fn new(store: P, session: C) -> Self {
        Self { store, session }
    }

    fn user(&self) -> Result<UserId, ProfileError> {
        self.session
            .current_user_id()
            .ok_or(ProfileError::NotAuthenticated)
    }

    /// Reads the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] without a session,
    /// [`ProfileError::NotFound`] if no profile was ever written, or a
    /// store error.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ProfileError> {
        let user = self.user()?;
        self.store
            .get_profile(&user)
            .await?
            .ok_or(ProfileError::NotFound(user))
    }

    /// Changes the username in the profile document only. Surrounding
    /// whitespace is dropped. [`AuthController::update_username`] also
    /// renames the account.
    ///
    /// [`AuthController::update_username`]: crate::auth::AuthController::update_username
    ///
    /// # Errors
    ///
    /// [`ProfileError::EmptyUsername`] for a blank name, otherwise as
    /// [`fetch_profile`](Self::fetch_profile).
    pub async fn update_username(&self, username: &str) -> Result<(), ProfileError> {
        let user = self.user()?;
        let username = username.trim();
        if username.is_empty() {
            return Err(ProfileError::EmptyUsername);
        }
        self.store.update_username(&user, username).await?;
        tracing::info!(%user, "username updated");
        Ok(())
    }

    /// Switches GPS tracking on or off in the settings document.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] or a store error.
    pub async fn set_gps_tracking(&self, enabled: bool) -> Result<(), ProfileError> {
        let user = self.user()?;
        self.store.set_gps_tracking(&user, enabled).await?;
        tracing::info!(%user, enabled, "gps tracking preference saved");
        Ok(())
    }

    /// Whether GPS tracking is switched on.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] or a store error.
    pub async fn gps_tracking(&self) -> Result<bool, ProfileError> {
        let user = self.user()?;
        Ok(self.store.preferences(&user).await?.gps_tracking)
    }
}
