//! HTTP API handlers.
//!
//! Defines the Actix routes for moderation decisions and health checks.

pub mod health;
pub mod moderation;

pub use health::HealthResponse;
pub use moderation::{
    blacklist_playlist,
    blacklist_track,
    json_config,
    playlist_decision,
    profile_decision,
    track_decision,
    whitelist_profile,
};
