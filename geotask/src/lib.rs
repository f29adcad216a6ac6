//! `GeoTask`: location-aware to-do list client core.

pub mod auth;
pub mod config;
pub mod location;
pub mod observe;
pub mod profile;
pub mod session;
pub mod store;
pub mod tasks;

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current timestamp in milliseconds since epoch.
pub(crate) fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}
