//! Blacklist/whitelist API handlers.

use actix_web::error::{BlockingError, InternalError};
use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Serialize;

use crate::models::{
    BlacklistPlaylistRequest, BlacklistTrackRequest, ModerationResponse, WhitelistProfileRequest,
};
use crate::moderation_db::{BlacklistedSong, StoreError, UserPlaylist, WhitelistedProfile};
use crate::moderation_service::ModerationError;
use crate::state::AppState;

/// JSON extractor config that reports malformed bodies in the API's error shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = ModerationResponse::error(format!("Invalid JSON body: {err}"));
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

#[utoipa::path(
    post,
    path = "/api/blacklist_track",
    request_body = BlacklistTrackRequest,
    responses(
        (status = 200, description = "Track blacklisted", body = ModerationResponse),
        (status = 400, description = "Input could not be parsed", body = ModerationResponse),
        (status = 500, description = "Database unavailable or write failed", body = ModerationResponse)
    )
)]
#[post("/api/blacklist_track")]
pub async fn blacklist_track(
    state: web::Data<AppState>,
    body: web::Json<BlacklistTrackRequest>,
) -> impl Responder {
    let input = body.into_inner().input.unwrap_or_default();
    let service = state.moderation.clone();
    respond(web::block(move || service.blacklist_track(&input)).await)
}

#[utoipa::path(
    post,
    path = "/api/blacklist_playlist",
    request_body = BlacklistPlaylistRequest,
    responses(
        (status = 200, description = "Playlist flag stored", body = ModerationResponse),
        (status = 400, description = "Input could not be parsed", body = ModerationResponse),
        (status = 500, description = "Database unavailable or write failed", body = ModerationResponse)
    )
)]
#[post("/api/blacklist_playlist")]
pub async fn blacklist_playlist(
    state: web::Data<AppState>,
    body: web::Json<BlacklistPlaylistRequest>,
) -> impl Responder {
    let request = body.into_inner();
    let input = request.input.unwrap_or_default();
    let blacklisted = request.blacklisted.unwrap_or(true);
    let service = state.moderation.clone();
    respond(web::block(move || service.blacklist_playlist(&input, blacklisted)).await)
}

#[utoipa::path(
    post,
    path = "/api/whitelist_profile",
    request_body = WhitelistProfileRequest,
    responses(
        (status = 200, description = "Profile whitelisted", body = ModerationResponse),
        (status = 400, description = "Input could not be parsed", body = ModerationResponse),
        (status = 500, description = "Database unavailable or write failed", body = ModerationResponse)
    )
)]
#[post("/api/whitelist_profile")]
pub async fn whitelist_profile(
    state: web::Data<AppState>,
    body: web::Json<WhitelistProfileRequest>,
) -> impl Responder {
    let input = body.into_inner().input.unwrap_or_default();
    let service = state.moderation.clone();
    respond(web::block(move || service.whitelist_profile(&input)).await)
}

fn respond(result: Result<Result<String, ModerationError>, BlockingError>) -> HttpResponse {
    match result {
        Ok(Ok(msg)) => HttpResponse::Ok().json(ModerationResponse::success(msg)),
        Ok(Err(err)) => err.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "moderation task failed");
            HttpResponse::InternalServerError().json(ModerationResponse::error(err.to_string()))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/tracks/{id}",
    params(
        ("id" = String, Path, description = "Canonical track id")
    ),
    responses(
        (status = 200, description = "Stored track decision", body = BlacklistedSong),
        (status = 404, description = "No decision recorded", body = ModerationResponse),
        (status = 500, description = "Database unavailable or read failed", body = ModerationResponse)
    )
)]
#[get("/api/tracks/{id}")]
pub async fn track_decision(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let id = id.into_inner();
    let service = state.moderation.clone();
    let label = format!("track {id}");
    lookup(web::block(move || service.db().blacklisted_song(&id)).await, &label)
}

#[utoipa::path(
    get,
    path = "/api/playlists/{id}",
    params(
        ("id" = String, Path, description = "Canonical playlist id")
    ),
    responses(
        (status = 200, description = "Stored playlist decision", body = UserPlaylist),
        (status = 404, description = "No decision recorded", body = ModerationResponse),
        (status = 500, description = "Database unavailable or read failed", body = ModerationResponse)
    )
)]
#[get("/api/playlists/{id}")]
pub async fn playlist_decision(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let id = id.into_inner();
    let service = state.moderation.clone();
    let label = format!("playlist {id}");
    lookup(web::block(move || service.db().user_playlist(&id)).await, &label)
}

#[utoipa::path(
    get,
    path = "/api/profiles/{id}",
    params(
        ("id" = String, Path, description = "Profile id")
    ),
    responses(
        (status = 200, description = "Whitelisted profile", body = WhitelistedProfile),
        (status = 404, description = "Profile not whitelisted", body = ModerationResponse),
        (status = 500, description = "Database unavailable or read failed", body = ModerationResponse)
    )
)]
#[get("/api/profiles/{id}")]
pub async fn profile_decision(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let id = id.into_inner();
    let service = state.moderation.clone();
    let label = format!("profile {id}");
    lookup(web::block(move || service.db().whitelisted_profile(&id)).await, &label)
}

fn lookup<T: Serialize>(
    result: Result<Result<Option<T>, StoreError>, BlockingError>,
    label: &str,
) -> HttpResponse {
    match result {
        Ok(Ok(Some(row))) => HttpResponse::Ok().json(row),
        Ok(Ok(None)) => HttpResponse::NotFound()
            .json(ModerationResponse::error(format!("No decision recorded for {label}"))),
        Ok(Err(err)) => ModerationError::from(err).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "lookup task failed");
            HttpResponse::InternalServerError().json(ModerationResponse::error(err.to_string()))
        }
    }
}
