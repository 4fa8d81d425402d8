//! Moderation decisions: resolve the input, enrich it, persist it.

use std::sync::Arc;

use actix_web::HttpResponse;

use crate::catalog::CatalogEnricher;
use crate::models::ModerationResponse;
use crate::moderation_db::{ModerationDb, SongDecision, StoreError};
use crate::resolver::{self, EntityKind, ResolvedId};

/// Errors surfaced to API callers.
#[derive(Debug)]
pub enum ModerationError {
    /// No usable id could be extracted from the input.
    UnresolvableInput(&'static str),
    /// No store connection could be obtained.
    StoreUnavailable,
    /// The store was reachable but the write failed.
    WriteFailed(String),
}

impl ModerationError {
    /// Convert a moderation error into an HTTP response.
    pub fn into_response(self) -> HttpResponse {
        match self {
            ModerationError::UnresolvableInput(msg) => {
                HttpResponse::BadRequest().json(ModerationResponse::error(msg))
            }
            ModerationError::StoreUnavailable => {
                HttpResponse::InternalServerError().json(ModerationResponse::error("DB unavailable"))
            }
            ModerationError::WriteFailed(msg) => {
                HttpResponse::InternalServerError().json(ModerationResponse::error(msg))
            }
        }
    }
}

impl From<StoreError> for ModerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(cause) => {
                tracing::warn!(error = %cause, "moderation store unavailable");
                ModerationError::StoreUnavailable
            }
            StoreError::Write(err) => {
                tracing::error!(error = %format!("{err:#}"), "moderation write failed");
                ModerationError::WriteFailed(format!("{err:#}"))
            }
        }
    }
}

/// Orchestrates the resolver, the enricher and the store for one request.
#[derive(Clone)]
pub struct ModerationService {
    catalog: Arc<dyn CatalogEnricher>,
    db: ModerationDb,
}

impl ModerationService {
    pub fn new(catalog: Arc<dyn CatalogEnricher>, db: ModerationDb) -> Self {
        Self { catalog, db }
    }

    pub fn db(&self) -> &ModerationDb {
        &self.db
    }

    /// Blacklist a track as manually confirmed (`fixed = true`).
    pub fn blacklist_track(&self, input: &str) -> Result<String, ModerationError> {
        let track_id = resolve_expected(input, &EntityKind::Track)
            .ok_or(ModerationError::UnresolvableInput("Could not parse track id"))?;

        let meta = self.catalog.track(&track_id).unwrap_or_default();
        let decision = SongDecision {
            song_id: track_id.clone(),
            song_name: meta.name,
            artist_id: meta.artist_id,
            artist_name: meta.artist_name,
            fixed: true,
        };
        self.db.upsert_blacklisted_song(&decision)?;
        tracing::info!(
            track_id = %track_id,
            song_name = ?decision.song_name,
            "track blacklisted"
        );
        Ok(format!("Blacklisted track {track_id} (fixed=true)"))
    }

    /// Set the blacklist flag on a playlist.
    pub fn blacklist_playlist(
        &self,
        input: &str,
        blacklisted: bool,
    ) -> Result<String, ModerationError> {
        let playlist_id = resolve_expected(input, &EntityKind::Playlist)
            .ok_or(ModerationError::UnresolvableInput("Could not parse playlist id"))?;

        let name = self.catalog.playlist(&playlist_id).and_then(|meta| meta.name);
        self.db
            .upsert_user_playlist(&playlist_id, name.as_deref(), blacklisted)?;
        tracing::info!(
            playlist_id = %playlist_id,
            blacklisted,
            playlist_name = ?name,
            "playlist upserted"
        );
        Ok(format!(
            "Playlist {playlist_id} upserted with blacklisted={blacklisted}"
        ))
    }

    /// Whitelist a curator profile.
    ///
    /// A playlist link (or a bare id of unknown kind) is redirected to the
    /// playlist owner's profile when the catalog can tell us who that is.
    pub fn whitelist_profile(&self, input: &str) -> Result<String, ModerationError> {
        let resolved = resolver::resolve(input).ok_or(ModerationError::UnresolvableInput(
            "Could not parse profile or playlist owner id",
        ))?;
        let profile_id = self.owner_or_self(resolved);

        self.db.upsert_whitelisted_profile(&profile_id)?;
        tracing::info!(profile_id = %profile_id, "profile whitelisted");
        Ok(format!("Whitelisted profile {profile_id}"))
    }

    fn owner_or_self(&self, resolved: ResolvedId) -> String {
        let maybe_playlist = match resolved.kind {
            EntityKind::Playlist => true,
            EntityKind::Unknown => resolver::find_bare_id(&resolved.id).is_some(),
            _ => false,
        };
        if !maybe_playlist {
            return resolved.id;
        }
        match self
            .catalog
            .playlist(&resolved.id)
            .and_then(|meta| meta.owner_id)
            .filter(|owner| !owner.trim().is_empty())
        {
            Some(owner_id) => {
                tracing::debug!(playlist_id = %resolved.id, owner_id = %owner_id, "using playlist owner");
                owner_id
            }
            None => resolved.id,
        }
    }
}

/// Resolve `input` and apply the kind-mismatch correction for `expected`.
fn resolve_expected(input: &str, expected: &EntityKind) -> Option<String> {
    let resolved = resolver::resolve(input)?;
    Some(resolver::correct_for_expected(resolved, expected).id)
}
