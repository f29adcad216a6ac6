//! Shared document model for `GeoTask`.
//!
//! Everything that is written to or read from the hosted document store
//! lives here: tasks, user profiles, preferences and location fixes, plus
//! the postcard codec used to turn them into stored bytes.

pub mod codec;
pub mod task;
pub mod user;
