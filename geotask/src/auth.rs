//! Authentication: credential checks, the auth state machine and the
//! shared session.
//!
//! [`AuthController`] validates user input, talks to an [`AuthProvider`],
//! publishes an [`AuthState`] through a watch channel and sets or clears
//! the [`SharedSession`] every other component reads.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use geotask_proto::user::{UserId, UserProfile};

use crate::now_ms;
use crate::profile::{ProfileError, ProfileStore};
use crate::session::{SessionContext, SharedSession};

/// Shortest password the provider accepts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

const EMPTY_LOGIN: &str = "Email or Password cannot be empty";
const EMPTY_SIGNUP: &str = "Fields cannot be empty";
const BAD_EMAIL: &str = "Invalid email format";

/// Errors from authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Input was rejected before contacting the provider.
    #[error("{0}")]
    Validation(&'static str),

    /// Email or password did not match an account.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("email already in use")]
    EmailInUse,

    /// Password is shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least 6 characters")]
    WeakPassword,

    /// The provider has no account for this user.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// No user is signed in.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The provider could not be reached.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

/// Where the user is in the sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Nobody is signed in.
    #[default]
    Unauthenticated,
    /// A sign-in or sign-up request is in flight.
    Loading,
    /// `UserId` is signed in.
    Authenticated(UserId),
    /// The last attempt failed with this message.
    Error(String),
}

/// The hosted auth service.
pub trait AuthProvider: Send + Sync {
    /// Checks credentials and returns the account's user id.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<UserId, AuthError>> + Send;

    /// Creates an account and returns its new user id.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<UserId, AuthError>> + Send;

    /// Sets the display name on the account.
    fn set_display_name(
        &self,
        user: &UserId,
        name: &str,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Confirms `password` is the account's current password.
    fn reauthenticate(
        &self,
        user: &UserId,
        password: &str,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Replaces the account's password.
    fn update_password(
        &self,
        user: &UserId,
        new_password: &str,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}

#[derive(Debug)]
struct Account {
    user: UserId,
    email: String,
    password: String,
    display_name: String,
}

/// [`AuthProvider`] keeping accounts in memory. User ids are UUID v7.
#[derive(Debug, Default)]
pub struct InMemoryAuthProvider {
    accounts: Mutex<HashMap<String, Account>>,
}

impl InMemoryAuthProvider {
    /// Creates a provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name of `user`, if the account exists.
    #[must_use]
    pub fn display_name(&self, user: &UserId) -> Option<String> {
        self.accounts
            .lock()
            .values()
            .find(|a| &a.user == user)
            .map(|a| a.display_name.clone())
    }

    fn with_account<R>(
        &self,
        user: &UserId,
        f: impl FnOnce(&mut Account) -> R,
    ) -> Result<R, AuthError> {
        let mut accounts = self.accounts.lock();
        accounts
            .values_mut()
            .find(|a| &a.user == user)
            .map(f)
            .ok_or_else(|| AuthError::UnknownUser(user.clone()))
    }
}

impl AuthProvider for InMemoryAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let accounts = self.accounts.lock();
        match accounts.get(email) {
            Some(account) if account.password == password => Ok(account.user.clone()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(email) {
            return Err(AuthError::EmailInUse);
        }
        let user = UserId::new(Uuid::now_v7().to_string());
        accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                email: email.to_string(),
                password: password.to_string(),
                display_name: String::new(),
            },
        );
        Ok(user)
    }

    async fn set_display_name(&self, user: &UserId, name: &str) -> Result<(), AuthError> {
        self.with_account(user, |a| a.display_name = name.to_string())
    }

    async fn reauthenticate(&self, user: &UserId, password: &str) -> Result<(), AuthError> {
        if self.with_account(user, |a| a.password == password)? {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn update_password(&self, user: &UserId, new_password: &str) -> Result<(), AuthError> {
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        self.with_account(user, |a| {
            tracing::debug!(email = %a.email, "password replaced");
            a.password = new_password.to_string();
        })
    }
}

/// Drives sign-in, sign-up and sign-out.
pub struct AuthController<P, R> {
    provider: P,
    profiles: R,
    session: SharedSession,
    state: watch::Sender<AuthState>,
}

impl<P: AuthProvider, R: ProfileStore> AuthController<P, R> {
    /// Creates a controller that signs users into `session`.
    pub fn new(provider: P, profiles: R, session: SharedSession) -> Self {
        let initial = session
            .current_user_id()
            .map_or(AuthState::Unauthenticated, AuthState::Authenticated);
        let (state, _) = watch::channel(initial);
        Self {
            provider,
            profiles,
            session,
            state,
        }
    }

    /// Current auth state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Subscribe to auth state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// The session this controller writes.
    #[must_use]
    pub const fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] if either field is empty, otherwise
    /// whatever the provider returns. The state moves to
    /// [`AuthState::Error`] on every failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(self.fail(AuthError::Validation(EMPTY_LOGIN)));
        }

        self.state.send_replace(AuthState::Loading);
        let user = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|e| self.fail(e))?;

        let profile = UserProfile {
            email: email.to_string(),
            username: email.split('@').next().unwrap_or_default().to_string(),
            display_name: String::new(),
            created_at: now_ms(),
        };
        self.ensure_profile(&user, &profile).await;
        self.signed_in(user.clone());
        Ok(user)
    }

    /// Creates an account, names it and signs it in.
    ///
    /// Email and username are trimmed; the password is taken as is.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] for empty fields or a malformed email,
    /// otherwise whatever the provider returns.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<UserId, AuthError> {
        let email = email.trim();
        let username = username.trim();
        if email.is_empty() || password.is_empty() || username.is_empty() {
            return Err(self.fail(AuthError::Validation(EMPTY_SIGNUP)));
        }
        if !is_valid_email(email) {
            return Err(self.fail(AuthError::Validation(BAD_EMAIL)));
        }

        self.state.send_replace(AuthState::Loading);
        let user = self
            .provider
            .sign_up(email, password)
            .await
            .map_err(|e| self.fail(e))?;
        if let Err(e) = self.provider.set_display_name(&user, username).await {
            tracing::warn!(%user, error = %e, "failed to set display name");
        }

        let profile = UserProfile {
            email: email.to_string(),
            username: username.to_string(),
            display_name: username.to_string(),
            created_at: now_ms(),
        };
        self.ensure_profile(&user, &profile).await;
        self.signed_in(user.clone());
        Ok(user)
    }

    /// Ends the session.
    pub fn sign_out(&self) {
        self.session.clear();
        self.state.send_replace(AuthState::Unauthenticated);
        tracing::info!("signed out");
    }

    /// Re-authenticates with `current` and then sets `new_password`.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] without a session,
    /// [`AuthError::Validation`] for empty input, otherwise whatever the
    /// provider returns. The auth state is not changed.
    pub async fn update_password(&self, current: &str, new_password: &str) -> Result<(), AuthError> {
        let user = self
            .session
            .current_user_id()
            .ok_or(AuthError::NotAuthenticated)?;
        if current.is_empty() || new_password.is_empty() {
            return Err(AuthError::Validation(EMPTY_SIGNUP));
        }
        self.provider.reauthenticate(&user, current).await?;
        self.provider.update_password(&user, new_password).await?;
        tracing::info!(%user, "password updated");
        Ok(())
    }

    /// Renames the signed-in user in the profile document and on the
    /// account's display name. Surrounding whitespace is dropped.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] without a session,
    /// [`ProfileError::EmptyUsername`] for a blank name, or the store or
    /// provider failure. A store failure leaves the display name unchanged.
    pub async fn update_username(&self, username: &str) -> Result<(), ProfileError> {
        let user = self
            .session
            .current_user_id()
            .ok_or(ProfileError::NotAuthenticated)?;
        let username = username.trim();
        if username.is_empty() {
            return Err(ProfileError::EmptyUsername);
        }
        self.profiles.update_username(&user, username).await?;
        self.provider.set_display_name(&user, username).await?;
        tracing::info!(%user, "username updated");
        Ok(())
    }

    /// Creates the profile document if it is missing. Failure does not
    /// block sign-in.
    async fn ensure_profile(&self, user: &UserId, profile: &UserProfile) {
        match self.profiles.ensure_profile(user, profile).await {
            Ok(true) => tracing::info!(%user, "profile created"),
            Ok(false) => {}
            Err(e) => tracing::warn!(%user, error = %e, "could not ensure profile"),
        }
    }

    fn signed_in(&self, user: UserId) {
        tracing::info!(%user, "signed in");
        self.session.set_user(user.clone());
        self.state.send_replace(AuthState::Authenticated(user));
    }

    fn fail(&self, error: AuthError) -> AuthError {
        tracing::debug!(error = %error, "authentication failed");
        self.state.send_replace(AuthState::Error(error.to_string()));
        error
    }
}

/// Accepts `local@domain.tld`: one `@`, a non-empty local part, a domain
/// with at least one dot and no empty labels, and no whitespace.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
