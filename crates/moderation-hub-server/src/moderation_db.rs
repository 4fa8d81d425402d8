//! SQLite store for blacklist/whitelist decisions.
//!
//! Every write takes one pooled connection, makes sure the schema exists and
//! runs a single upsert keyed on the catalog id.

use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::config::{DatabaseSettings, sqlite_path_from_url, url_scheme};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store failures, split by whether a connection was ever obtained.
#[derive(Debug)]
pub enum StoreError {
    /// No connection could be acquired (unconfigured, unreachable, pool timeout).
    Unavailable(String),
    /// Connected, but the schema check or the statement failed.
    Write(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(cause) => write!(f, "database unavailable: {cause}"),
            StoreError::Write(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Blacklist decision for a track, as submitted.
#[derive(Debug, Clone, Default)]
pub struct SongDecision {
    pub song_id: String,
    pub song_name: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct BlacklistedSong {
    /// Canonical catalog track id.
    pub song_id: String,
    pub song_name: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    /// Manually confirmed rather than provisionally flagged.
    pub fixed: bool,
    /// First insert time, Unix epoch milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct UserPlaylist {
    pub playlist_id: String,
    pub playlist_name: Option<String>,
    pub blacklisted: bool,
    /// Last write time, Unix epoch milliseconds.
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct WhitelistedProfile {
    pub profile_id: String,
    pub added_at: i64,
}

#[derive(Clone)]
pub struct ModerationDb {
    pool: Option<Pool<SqliteConnectionManager>>,
}

impl ModerationDb {
    /// Build the store; connections are opened on demand, so this never fails.
    pub fn new(settings: &DatabaseSettings) -> Self {
        let Some(url) = settings.url.as_deref() else {
            tracing::warn!("DATABASE_URL not set; moderation writes will be rejected");
            return Self::unavailable();
        };
        let Some(path) = sqlite_path_from_url(url) else {
            tracing::warn!(
                scheme = %url_scheme(url),
                "database URL is not a SQLite location; moderation writes will be rejected"
            );
            return Self::unavailable();
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %err, dir = %parent.display(), "create database dir failed");
            }
        }
        Self::with_path(&path, settings.pool_size, settings.connect_timeout)
    }

    fn with_path(path: &Path, pool_size: u32, connect_timeout: Duration) -> Self {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(pool_size)
            .min_idle(Some(0))
            .connection_timeout(connect_timeout)
            .build_unchecked(manager);
        tracing::info!(path = %path.display(), pool_size, "moderation store configured");
        Self { pool: Some(pool) }
    }

    /// A store that rejects every request with [`StoreError::Unavailable`].
    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no database configured".to_string()))?;
        pool.get()
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    /// Record a blacklisted track.
    ///
    /// `fixed` always takes the new value; name/artist fields only replace
    /// stored values when present; `created_at` is set once.
    pub fn upsert_blacklisted_song(&self, song: &SongDecision) -> Result<(), StoreError> {
        let conn = self.connection()?;
        write(&conn, |conn| {
            conn.execute(
                r#"
                INSERT INTO blacklisted_songs (song_id, song_name, artist_id, artist_name, fixed, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(song_id) DO UPDATE SET
                    fixed = excluded.fixed,
                    song_name = COALESCE(excluded.song_name, blacklisted_songs.song_name),
                    artist_id = COALESCE(excluded.artist_id, blacklisted_songs.artist_id),
                    artist_name = COALESCE(excluded.artist_name, blacklisted_songs.artist_name)
                "#,
                params![
                    song.song_id,
                    song.song_name,
                    song.artist_id,
                    song.artist_name,
                    song.fixed,
                    now_ms()
                ],
            )
            .context("upsert blacklisted song")
        })
    }

    /// Record a playlist decision; `updated_at` strictly advances on every write.
    pub fn upsert_user_playlist(
        &self,
        playlist_id: &str,
        playlist_name: Option<&str>,
        blacklisted: bool,
    ) -> Result<(), StoreError> {
        let conn = self.connection()?;
        write(&conn, |conn| {
            conn.execute(
                r#"
                INSERT INTO user_playlists (playlist_id, playlist_name, blacklisted, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(playlist_id) DO UPDATE SET
                    playlist_name = COALESCE(excluded.playlist_name, user_playlists.playlist_name),
                    blacklisted = excluded.blacklisted,
                    updated_at = MAX(excluded.updated_at, user_playlists.updated_at + 1)
                "#,
                params![playlist_id, playlist_name, blacklisted, now_ms()],
            )
            .context("upsert user playlist")
        })
    }

    /// Whitelist a profile; repeated calls leave the first row untouched.
    pub fn upsert_whitelisted_profile(&self, profile_id: &str) -> Result<(), StoreError> {
        let conn = self.connection()?;
        write(&conn, |conn| {
            conn.execute(
                r#"
                INSERT INTO whitelisted_profiles (profile_id, added_at)
                VALUES (?1, ?2)
                ON CONFLICT(profile_id) DO NOTHING
                "#,
                params![profile_id, now_ms()],
            )
            .context("upsert whitelisted profile")
        })
    }

    /// Stored decision for a track, if any.
    pub fn blacklisted_song(&self, song_id: &str) -> Result<Option<BlacklistedSong>, StoreError> {
        let conn = self.connection()?;
        ensure_schema(&conn).map_err(StoreError::Write)?;
        conn.query_row(
            r#"
            SELECT song_id, song_name, artist_id, artist_name, fixed, created_at
            FROM blacklisted_songs
            WHERE song_id = ?1
            "#,
            params![song_id],
            |row| {
                Ok(BlacklistedSong {
                    song_id: row.get(0)?,
                    song_name: row.get(1)?,
                    artist_id: row.get(2)?,
                    artist_name: row.get(3)?,
                    fixed: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()
        .context("lookup blacklisted song")
        .map_err(StoreError::Write)
    }

    pub fn user_playlist(&self, playlist_id: &str) -> Result<Option<UserPlaylist>, StoreError> {
        let conn = self.connection()?;
        ensure_schema(&conn).map_err(StoreError::Write)?;
        conn.query_row(
            "SELECT playlist_id, playlist_name, blacklisted, updated_at FROM user_playlists WHERE playlist_id = ?1",
            params![playlist_id],
            |row| {
                Ok(UserPlaylist {
                    playlist_id: row.get(0)?,
                    playlist_name: row.get(1)?,
                    blacklisted: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()
        .context("lookup user playlist")
        .map_err(StoreError::Write)
    }

    pub fn whitelisted_profile(
        &self,
        profile_id: &str,
    ) -> Result<Option<WhitelistedProfile>, StoreError> {
        let conn = self.connection()?;
        ensure_schema(&conn).map_err(StoreError::Write)?;
        conn.query_row(
            "SELECT profile_id, added_at FROM whitelisted_profiles WHERE profile_id = ?1",
            params![profile_id],
            |row| {
                Ok(WhitelistedProfile {
                    profile_id: row.get(0)?,
                    added_at: row.get(1)?,
                })
            },
        )
        .optional()
        .context("lookup whitelisted profile")
        .map_err(StoreError::Write)
    }
}

/// Ensure the schema, then run `op`; any failure is a write failure.
fn write<F>(conn: &Connection, op: F) -> Result<(), StoreError>
where
    F: FnOnce(&Connection) -> anyhow::Result<usize>,
{
    ensure_schema(conn).map_err(StoreError::Write)?;
    let changed = op(conn).map_err(StoreError::Write)?;
    tracing::debug!(changed, "moderation upsert applied");
    Ok(())
}

/// Create the moderation tables if missing; safe to run before every write.
fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blacklisted_songs (
            song_id TEXT PRIMARY KEY,
            song_name TEXT,
            artist_id TEXT,
            artist_name TEXT,
            fixed INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_playlists (
            playlist_id TEXT PRIMARY KEY,
            playlist_name TEXT,
            blacklisted INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS whitelisted_profiles (
            profile_id TEXT PRIMARY KEY,
            added_at INTEGER NOT NULL
        );
        "#,
    )
    .context("create moderation schema")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn temp_name(prefix: &str) -> String {
        format!(
            "{prefix}-{}-{:?}",
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos(),
            std::thread::current().id()
        )
    }

    pub(crate) fn temp_db() -> ModerationDb {
        let path = std::env::temp_dir().join(format!("{}.sqlite", temp_name("moderation-hub-server-db")));
        ModerationDb::with_path(&path, 2, Duration::from_secs(2))
    }

    /// Temp store with `sql` already applied, for tables that break the upserts.
    pub(crate) fn temp_db_with(sql: &str) -> ModerationDb {
        let db = temp_db();
        db.connection().unwrap().execute_batch(sql).unwrap();
        db
    }

    fn song(id: &str, name: Option<&str>, fixed: bool) -> SongDecision {
        SongDecision {
            song_id: id.to_string(),
            song_name: name.map(str::to_string),
            artist_id: name.map(|_| "0OdUWJ0sBjDrqHygGUXeCF".to_string()),
            artist_name: name.map(|_| "Band".to_string()),
            fixed,
        }
    }

    #[test]
    fn song_upsert_is_idempotent() {
        let db = temp_db();
        db.upsert_blacklisted_song(&song("4iV5W9uYEdYUVa79Axb7Rh", Some("X"), true))
            .unwrap();
        let first = db.blacklisted_song("4iV5W9uYEdYUVa79Axb7Rh").unwrap().unwrap();
        db.upsert_blacklisted_song(&song("4iV5W9uYEdYUVa79Axb7Rh", Some("X"), true))
            .unwrap();
        let second = db.blacklisted_song("4iV5W9uYEdYUVa79Axb7Rh").unwrap().unwrap();
        assert_eq!(first, second);

        let conn = db.connection().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM blacklisted_songs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn song_names_survive_null_updates() {
        let db = temp_db();
        db.upsert_blacklisted_song(&song("4iV5W9uYEdYUVa79Axb7Rh", Some("X"), true))
            .unwrap();
        db.upsert_blacklisted_song(&song("4iV5W9uYEdYUVa79Axb7Rh", None, false))
            .unwrap();
        let row = db.blacklisted_song("4iV5W9uYEdYUVa79Axb7Rh").unwrap().unwrap();
        assert_eq!(row.song_name.as_deref(), Some("X"));
        assert_eq!(row.artist_name.as_deref(), Some("Band"));
        assert!(!row.fixed);
    }

    #[test]
    fn song_created_at_is_set_once() {
        let db = temp_db();
        db.upsert_blacklisted_song(&song("4iV5W9uYEdYUVa79Axb7Rh", None, true))
            .unwrap();
        let first = db.blacklisted_song("4iV5W9uYEdYUVa79Axb7Rh").unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        db.upsert_blacklisted_song(&song("4iV5W9uYEdYUVa79Axb7Rh", Some("Y"), true))
            .unwrap();
        let second = db.blacklisted_song("4iV5W9uYEdYUVa79Axb7Rh").unwrap().unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.song_name.as_deref(), Some("Y"));
    }

    #[test]
    fn playlist_flag_overwrites_and_updated_at_advances() {
        let db = temp_db();
        db.upsert_user_playlist("37i9dQZF1DXcBWIGoYBM5M", Some("Mix"), true)
            .unwrap();
        let first = db.user_playlist("37i9dQZF1DXcBWIGoYBM5M").unwrap().unwrap();
        db.upsert_user_playlist("37i9dQZF1DXcBWIGoYBM5M", None, false)
            .unwrap();
        let second = db.user_playlist("37i9dQZF1DXcBWIGoYBM5M").unwrap().unwrap();

        assert!(first.blacklisted);
        assert!(!second.blacklisted);
        assert_eq!(second.playlist_name.as_deref(), Some("Mix"));
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn profile_whitelist_repeat_is_noop() {
        let db = temp_db();
        db.upsert_whitelisted_profile("curator").unwrap();
        let first = db.whitelisted_profile("curator").unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        db.upsert_whitelisted_profile("curator").unwrap();
        let second = db.whitelisted_profile("curator").unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_rows_read_as_none() {
        let db = temp_db();
        db.upsert_whitelisted_profile("someone").unwrap();
        assert!(db.whitelisted_profile("nobody").unwrap().is_none());
    }

    #[test]
    fn unconfigured_store_is_unavailable() {
        let db = ModerationDb::unavailable();
        assert!(!db.is_configured());
        let err = db.upsert_whitelisted_profile("curator").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn postgres_url_is_unavailable_and_creates_nothing() {
        let root = std::env::temp_dir().join(temp_name("moderation-hub-server-pg"));
        let url = format!("postgres://user:pw@{}/railway", root.display());
        let db = ModerationDb::new(&DatabaseSettings {
            url: Some(url),
            pool_size: 1,
            connect_timeout: Duration::from_millis(200),
        });
        assert!(!db.is_configured());
        let err = db.upsert_whitelisted_profile("curator").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(!root.exists());
        assert!(!Path::new("postgres:").exists());
    }

    #[test]
    fn unopenable_path_is_unavailable() {
        let path = std::env::temp_dir()
            .join(temp_name("moderation-hub-server-missing"))
            .join("nested")
            .join("moderation.sqlite");
        let db = ModerationDb::with_path(&path, 1, Duration::from_millis(200));
        assert!(db.is_configured());
        let err = db.upsert_blacklisted_song(&song("s1", None, true)).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn incompatible_table_is_a_write_failure() {
        let db = temp_db_with("CREATE TABLE whitelisted_profiles (something_else TEXT);");
        let err = db.upsert_whitelisted_profile("curator").unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
        assert!(err.to_string().contains("upsert whitelisted profile"));
    }

    #[test]
    fn ensure_schema_is_repeatable() {
        let conn = Connection::open_in_memory().expect("open memory db");
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
    }
}
