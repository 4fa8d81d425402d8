//! Shared application state.

use crate::moderation_service::ModerationService;

/// Dependencies built once at startup and shared by every worker.
pub struct AppState {
    pub moderation: ModerationService,
}

impl AppState {
    pub fn new(moderation: ModerationService) -> Self {
        Self { moderation }
    }
}
