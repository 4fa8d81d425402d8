//! API models and OpenAPI schemas.
//!
//! Defines request/response structures for the moderation endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body for `/api/blacklist_track`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct BlacklistTrackRequest {
    /// Track id, `spotify:track:` URI, or share URL.
    #[serde(default)]
    pub input: Option<String>,
}

/// Body for `/api/blacklist_playlist`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct BlacklistPlaylistRequest {
    /// Playlist id, `spotify:playlist:` URI, or share URL.
    #[serde(default)]
    pub input: Option<String>,
    /// Flag to store (defaults to true).
    #[serde(default)]
    pub blacklisted: Option<bool>,
}

/// Body for `/api/whitelist_profile`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct WhitelistProfileRequest {
    /// Profile id/URL, or a playlist whose owner should be whitelisted.
    #[serde(default)]
    pub input: Option<String>,
}

/// Result envelope shared by all moderation endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ModerationResponse {
    /// True when the decision was recorded.
    pub ok: bool,
    /// Human-readable confirmation on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModerationResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            ok: true,
            msg: Some(msg.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_omits_error_field() {
        let value = serde_json::to_value(ModerationResponse::success("done")).unwrap();
        assert_eq!(value, serde_json::json!({"ok": true, "msg": "done"}));
    }

    #[test]
    fn playlist_request_fields_are_optional() {
        let req: BlacklistPlaylistRequest = serde_json::from_str("{}").unwrap();
        assert!(req.input.is_none());
        assert!(req.blacklisted.is_none());
        let req: BlacklistPlaylistRequest =
            serde_json::from_str(r#"{"input": null, "blacklisted": false}"#).unwrap();
        assert_eq!(req.blacklisted, Some(false));
    }
}
