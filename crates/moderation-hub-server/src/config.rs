//! Configuration loading and parsing.
//!
//! An optional TOML file provides the base settings; process environment
//! variables (as set by the hosting platform) override it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BIND: &str = "0.0.0.0:5000";
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5000";
const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Database connection string (`sqlite://path` or a file path).
    pub database_url: Option<String>,
    /// Directory holding the frontend `index.html`.
    pub static_dir: Option<String>,
    /// Origins allowed to call the API from a browser.
    pub cors_origins: Option<Vec<String>>,
    /// Catalog API credentials and endpoints.
    #[serde(default)]
    pub spotify: SpotifyConfig,
    /// Connection pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Spotify Web API configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Long-lived refresh token obtained out of band.
    pub refresh_token: Option<String>,
    /// Optional base URL override (defaults to https://api.spotify.com/v1).
    pub api_base_url: Option<String>,
    /// Optional base URL override (defaults to https://accounts.spotify.com).
    pub accounts_base_url: Option<String>,
    /// Per-request timeout in milliseconds (default: 10000).
    pub timeout_ms: Option<u64>,
}

/// Database pool configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Maximum pooled connections (default: 4).
    pub pool_size: Option<u32>,
    /// How long a request waits for a connection in milliseconds (default: 5000).
    pub connect_timeout_ms: Option<u64>,
}

/// Resolved database settings handed to the store.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub pool_size: u32,
    pub connect_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Apply environment overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(port) = lookup("PORT") {
            self.bind = Some(format!("0.0.0.0:{}", port.trim()));
        }
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("RAILWAY_DATABASE_URL")) {
            self.database_url = Some(url);
        }
        if let Some(value) = lookup("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = Some(value);
        }
        if let Some(value) = lookup("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = Some(value);
        }
        if let Some(value) = lookup("SPOTIFY_REFRESH_TOKEN") {
            self.spotify.refresh_token = Some(value);
        }
    }

    pub fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            url: self
                .database_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            pool_size: self.database.pool_size.unwrap_or(DEFAULT_POOL_SIZE).max(1),
            connect_timeout: Duration::from_millis(
                self.database
                    .connect_timeout_ms
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
        }
    }

    pub fn cors_origins(&self) -> Vec<String> {
        match self.cors_origins.as_ref().filter(|origins| !origins.is_empty()) {
            Some(origins) => origins.clone(),
            None => vec![DEFAULT_CORS_ORIGIN.to_string()],
        }
    }
}

/// Parse the bind address from config, falling back to the default.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<SocketAddr> {
    let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    bind.parse().with_context(|| format!("parse bind {bind}"))
}

/// Directory served at `/` and `/static`.
pub fn static_dir_from_config(cfg: &ServerConfig) -> PathBuf {
    PathBuf::from(cfg.static_dir.as_deref().unwrap_or(DEFAULT_STATIC_DIR))
}

/// File path named by a SQLite connection string.
///
/// Accepts `sqlite://path`, `sqlite:path` or a plain path. Any other
/// `scheme://` URL names a store this server cannot open and yields `None`.
pub fn sqlite_path_from_url(url: &str) -> Option<PathBuf> {
    if let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        return None;
    }
    Some(PathBuf::from(url))
}

/// Scheme of a connection string, for logs that must not echo credentials.
pub fn url_scheme(url: &str) -> &str {
    url.split_once("://").map(|(scheme, _)| scheme).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn parses_toml_sections() {
        let cfg: ServerConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:9000"
            database_url = "sqlite:///var/lib/moderation.sqlite"
            cors_origins = ["https://example.github.io"]

            [spotify]
            client_id = "id"
            timeout_ms = 2500

            [database]
            pool_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(bind_from_config(&cfg).unwrap(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.spotify.client_id.as_deref(), Some("id"));
        assert_eq!(cfg.spotify.timeout_ms, Some(2500));
        assert_eq!(cfg.database_settings().pool_size, 8);
        assert_eq!(cfg.cors_origins(), vec!["https://example.github.io".to_string()]);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = ServerConfig {
            bind: Some("127.0.0.1:9000".to_string()),
            database_url: Some("file.sqlite".to_string()),
            ..Default::default()
        };
        cfg.apply_env(env_of(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "sqlite:/tmp/mod.sqlite"),
            ("SPOTIFY_REFRESH_TOKEN", "tok"),
        ]));
        assert_eq!(bind_from_config(&cfg).unwrap(), "0.0.0.0:8081".parse().unwrap());
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite:/tmp/mod.sqlite"));
        assert_eq!(cfg.spotify.refresh_token.as_deref(), Some("tok"));
    }

    #[test]
    fn railway_url_used_when_database_url_missing() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env(env_of(&[("DATABASE_URL", " "), ("RAILWAY_DATABASE_URL", "rw.sqlite")]));
        assert_eq!(cfg.database_settings().url.as_deref(), Some("rw.sqlite"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = ServerConfig::default();
        assert_eq!(bind_from_config(&cfg).unwrap(), DEFAULT_BIND.parse().unwrap());
        assert_eq!(static_dir_from_config(&cfg), PathBuf::from("static"));
        let db = cfg.database_settings();
        assert!(db.url.is_none());
        assert_eq!(db.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(db.connect_timeout, Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
        assert_eq!(cfg.cors_origins(), vec![DEFAULT_CORS_ORIGIN.to_string()]);
    }

    #[test]
    fn sqlite_path_strips_scheme() {
        assert_eq!(sqlite_path_from_url("sqlite:///data/x.db"), Some(PathBuf::from("/data/x.db")));
        assert_eq!(sqlite_path_from_url("sqlite:x.db"), Some(PathBuf::from("x.db")));
        assert_eq!(sqlite_path_from_url("/data/y.db"), Some(PathBuf::from("/data/y.db")));
    }

    #[test]
    fn foreign_database_urls_have_no_sqlite_path() {
        let url = "postgres://user:pw@db.railway.internal:5432/railway";
        assert_eq!(sqlite_path_from_url(url), None);
        assert_eq!(url_scheme(url), "postgres");
        assert_eq!(sqlite_path_from_url("mysql://localhost/db"), None);
    }

    #[test]
    fn example_config_parses_with_hosted_frontend_origin() {
        let cfg: ServerConfig =
            toml::from_str(include_str!("../../../config.example.toml")).unwrap();
        let origins = cfg.cors_origins();
        assert!(origins.contains(&"https://gbonez.github.io".to_string()));
        assert!(origins.contains(&DEFAULT_CORS_ORIGIN.to_string()));
        assert_eq!(bind_from_config(&cfg).unwrap(), DEFAULT_BIND.parse().unwrap());
    }
}
