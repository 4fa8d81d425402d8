//! Best-effort catalog metadata lookups.
//!
//! The enricher is picked once at startup: a live Spotify Web API client when
//! credentials work, otherwise a disabled client that never returns anything.
//! Lookups never fail loudly; any error is logged and reported as "no metadata".

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::SpotifyConfig;

const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
const MAX_BODY_BYTES: u64 = 2_000_000;

/// Display metadata for a track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub name: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
}

/// Display metadata for a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistMetadata {
    pub name: Option<String>,
    pub owner_id: Option<String>,
}

/// Read-only metadata source used to annotate moderation decisions.
pub trait CatalogEnricher: Send + Sync {
    fn track(&self, id: &str) -> Option<TrackMetadata>;
    fn playlist(&self, id: &str) -> Option<PlaylistMetadata>;
}

/// Enricher used when the catalog client could not be constructed.
pub struct DisabledCatalog;

impl CatalogEnricher for DisabledCatalog {
    fn track(&self, _id: &str) -> Option<TrackMetadata> {
        None
    }

    fn playlist(&self, _id: &str) -> Option<PlaylistMetadata> {
        None
    }
}

/// Build the process-wide enricher; falls back to [`DisabledCatalog`] for good on failure.
pub fn build_enricher(cfg: &SpotifyConfig) -> Arc<dyn CatalogEnricher> {
    match SpotifyClient::connect(cfg) {
        Ok(client) => {
            tracing::info!(api = %client.api_base_url, "catalog enrichment enabled");
            Arc::new(client)
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "catalog enrichment disabled");
            Arc::new(DisabledCatalog)
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
    refresh_token: String,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
    }
}

/// Spotify Web API client authorised through a long-lived refresh token.
pub struct SpotifyClient {
    api_base_url: String,
    accounts_base_url: String,
    basic_auth: String,
    token: Mutex<AccessToken>,
    agent: ureq::Agent,
}

impl SpotifyClient {
    /// Validate credentials and exchange the refresh token for a first access token.
    pub fn connect(cfg: &SpotifyConfig) -> Result<Self> {
        let client_id = non_blank(cfg.client_id.as_deref()).context("spotify client_id is missing")?;
        let client_secret =
            non_blank(cfg.client_secret.as_deref()).context("spotify client_secret is missing")?;
        let refresh_token =
            non_blank(cfg.refresh_token.as_deref()).context("spotify refresh_token is missing")?;

        let agent = build_agent(Duration::from_millis(
            cfg.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        ));

        let basic_auth = general_purpose::STANDARD.encode(format!("{client_id}:{client_secret}"));
        let accounts_base_url = base_url(cfg.accounts_base_url.as_deref(), DEFAULT_ACCOUNTS_BASE_URL);
        let api_base_url = base_url(cfg.api_base_url.as_deref(), DEFAULT_API_BASE_URL);

        let token = request_token(&agent, &accounts_base_url, &basic_auth, refresh_token)
            .context("initial spotify token refresh failed")?;

        Ok(Self {
            api_base_url,
            accounts_base_url,
            basic_auth,
            token: Mutex::new(token),
            agent,
        })
    }

    fn lock_token(&self) -> MutexGuard<'_, AccessToken> {
        match self.token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current access token, refreshed when close to expiry.
    ///
    /// The lock is released during the token request; concurrent callers that
    /// also see a stale token may each refresh, and the last result wins.
    fn access_token(&self) -> Result<String> {
        let refresh_token = {
            let token = self.lock_token();
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
            token.refresh_token.clone()
        };
        tracing::debug!("spotify access token expired; refreshing");
        let refreshed = request_token(
            &self.agent,
            &self.accounts_base_url,
            &self.basic_auth,
            &refresh_token,
        )?;
        let value = refreshed.value.clone();
        *self.lock_token() = refreshed;
        Ok(value)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let token = self.access_token()?;
        let url = format!("{}{}", self.api_base_url, path);
        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {token}"));
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let resp = match request.call() {
            Ok(resp) => resp,
            Err(err) => bail!("spotify request failed (transport) url={url}: {err}"),
        };
        read_json(resp, &url)
    }

    pub fn fetch_track(&self, id: &str) -> Result<TrackMetadata> {
        let path = format!("/tracks/{}", urlencoding::encode(id));
        let body: TrackResponse = self.get_json(&path, &[])?;
        Ok(body.into())
    }

    pub fn fetch_playlist(&self, id: &str) -> Result<PlaylistMetadata> {
        let path = format!("/playlists/{}", urlencoding::encode(id));
        let body: PlaylistResponse =
            self.get_json(&path, &[("fields", "name,owner(id,display_name)")])?;
        Ok(body.into())
    }
}

impl CatalogEnricher for SpotifyClient {
    fn track(&self, id: &str) -> Option<TrackMetadata> {
        match self.fetch_track(id) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(track_id = %id, error = %format!("{err:#}"), "track lookup failed");
                None
            }
        }
    }

    fn playlist(&self, id: &str) -> Option<PlaylistMetadata> {
        match self.fetch_playlist(id) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(playlist_id = %id, error = %format!("{err:#}"), "playlist lookup failed");
                None
            }
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .user_agent(concat!("moderation-hub-server/", env!("CARGO_PKG_VERSION")))
        .build();
    ureq::Agent::new_with_config(config)
}

fn request_token(
    agent: &ureq::Agent,
    accounts_base_url: &str,
    basic_auth: &str,
    refresh_token: &str,
) -> Result<AccessToken> {
    let url = format!("{accounts_base_url}/api/token");
    let resp = match agent
        .post(&url)
        .header("Authorization", &format!("Basic {basic_auth}"))
        .send_form([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ]) {
        Ok(resp) => resp,
        Err(err) => bail!("spotify token request failed (transport) url={url}: {err}"),
    };
    let body: TokenResponse = read_json(resp, &url)?;
    let ttl = body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    Ok(AccessToken {
        value: body.access_token,
        expires_at: Instant::now() + Duration::from_secs(ttl),
        refresh_token: body
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| refresh_token.to_string()),
    })
}

fn read_json<T: DeserializeOwned>(resp: ureq::http::Response<ureq::Body>, url: &str) -> Result<T> {
    let code = resp.status();
    let body = resp
        .into_body()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_string()
        .with_context(|| format!("spotify response read failed url={url}"))?;
    if !code.is_success() {
        let snippet: String = body.trim().chars().take(300).collect();
        bail!("spotify request failed (status {code}) url={url}: {snippet}");
    }
    serde_json::from_str(&body).with_context(|| format!("spotify response parse failed url={url}"))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn base_url(value: Option<&str>, default: &str) -> String {
    non_blank(value)
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    name: Option<String>,
    owner: Option<OwnerRef>,
}

#[derive(Debug, Deserialize)]
struct OwnerRef {
    id: Option<String>,
}

impl From<TrackResponse> for TrackMetadata {
    fn from(resp: TrackResponse) -> Self {
        let (artist_id, artist_name) = resp
            .artists
            .into_iter()
            .next()
            .map(|artist| (artist.id, artist.name))
            .unwrap_or((None, None));
        Self {
            name: resp.name,
            artist_id,
            artist_name,
        }
    }
}

impl From<PlaylistResponse> for PlaylistMetadata {
    fn from(resp: PlaylistResponse) -> Self {
        Self {
            name: resp.name,
            owner_id: resp.owner.and_then(|owner| owner.id),
        }
    }
}
