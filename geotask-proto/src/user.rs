//! User-scoped documents: identity, profile, preferences and location.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an authenticated user.
///
/// Every stored document lives under the namespace of exactly one user;
/// the identifier is opaque and assigned by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The per-user profile document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Sign-in email address.
    pub email: String,
    /// Editable username shown in the app.
    pub username: String,
    /// Display name held by the auth service.
    pub display_name: String,
    /// When the profile document was first written (milliseconds since epoch).
    pub created_at: u64,
}

/// The per-user settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Whether GPS location tracking is switched on.
    pub gps_tracking: bool,
}

/// A single GPS position reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the fix was recorded (milliseconds since epoch).
    pub timestamp: u64,
}
