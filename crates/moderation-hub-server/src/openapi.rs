use utoipa::OpenApi;

use crate::api;
use crate::models;
use crate::moderation_db;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::moderation::blacklist_track,
        api::moderation::blacklist_playlist,
        api::moderation::whitelist_profile,
        api::moderation::track_decision,
        api::moderation::playlist_decision,
        api::moderation::profile_decision,
        api::health::health,
    ),
    components(
        schemas(
            models::BlacklistTrackRequest,
            models::BlacklistPlaylistRequest,
            models::WhitelistProfileRequest,
            models::ModerationResponse,
            moderation_db::BlacklistedSong,
            moderation_db::UserPlaylist,
            moderation_db::WhitelistedProfile,
            api::HealthResponse,
        )
    ),
    tags(
        (name = "moderation-hub-server", description = "Track, playlist and curator moderation API")
    )
)]
pub struct ApiDoc;
