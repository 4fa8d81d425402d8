//! Catalog identifier resolution.
//!
//! Turns whatever a user pasted (a bare id, a `spotify:` URI, or a share URL)
//! into an entity kind plus canonical id. Resolution never fails hard: input
//! that matches nothing comes back as an `Unknown` id and the caller decides
//! whether it is usable.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// URI scheme used by the catalog (`spotify:track:<id>`).
const CATALOG_URI_SCHEME: &str = "spotify";
/// Substring a share-link host must contain to be treated as a catalog URL.
const CATALOG_HOST_MARKER: &str = "spotify";

static BARE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]{22}").expect("bare id regex"));

/// Category of catalog object an id refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Track,
    Playlist,
    Profile,
    /// Kind could not be determined from the input.
    Unknown,
    /// A kind token the catalog knows but this service does not moderate (album, artist, ...).
    Other(String),
}

impl EntityKind {
    /// Map a URI/URL kind token onto a kind.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "" => EntityKind::Unknown,
            "track" => EntityKind::Track,
            "playlist" => EntityKind::Playlist,
            "user" | "profile" => EntityKind::Profile,
            other => EntityKind::Other(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EntityKind::Unknown)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Track => f.write_str("track"),
            EntityKind::Playlist => f.write_str("playlist"),
            EntityKind::Profile => f.write_str("user"),
            EntityKind::Unknown => f.write_str("unknown"),
            EntityKind::Other(token) => f.write_str(token),
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    pub kind: EntityKind,
    pub id: String,
}

impl ResolvedId {
    fn new(kind: EntityKind, id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            return None;
        }
        Some(Self { kind, id })
    }
}

/// Resolve free-form input into a kind and id.
///
/// Strategies run in order and the first match wins: `spotify:kind:id` URI,
/// catalog share URL, a 22-character bare id anywhere in the text, then the
/// trimmed input itself. Returns `None` only when nothing usable remains
/// (empty input, or a URL with no path).
pub fn resolve(raw: &str) -> Option<ResolvedId> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(outcome) = resolve_uri(value) {
        return outcome;
    }
    if let Some(outcome) = resolve_url(value) {
        return outcome;
    }
    if let Some(id) = find_bare_id(value) {
        return ResolvedId::new(EntityKind::Unknown, id);
    }
    ResolvedId::new(EntityKind::Unknown, value)
}

/// Second pass applied by each endpoint once it knows which kind it expects.
///
/// A pasted link for a different entity type (an album link on the track
/// endpoint, say) still carries a usable id token; when the resolved kind is
/// known and differs from `expected`, the id is re-scanned for a bare id and
/// that match wins. Otherwise the resolution is returned unchanged.
pub fn correct_for_expected(resolved: ResolvedId, expected: &EntityKind) -> ResolvedId {
    if !resolved.kind.is_known() || resolved.kind == *expected {
        return resolved;
    }
    match find_bare_id(&resolved.id) {
        Some(id) => {
            tracing::debug!(
                kind = %resolved.kind,
                expected = %expected,
                id = %id,
                "kind mismatch; using bare id from resolved value"
            );
            ResolvedId {
                kind: EntityKind::Unknown,
                id: id.to_string(),
            }
        }
        None => resolved,
    }
}

/// First 22-character alphanumeric run in `value`, if any.
pub fn find_bare_id(value: &str) -> Option<&str> {
    BARE_ID_RE.find(value).map(|m| m.as_str())
}

/// `Some(outcome)` when `value` has at least three `spotify:` URI segments.
fn resolve_uri(value: &str) -> Option<Option<ResolvedId>> {
    let rest = value.strip_prefix(CATALOG_URI_SCHEME)?.strip_prefix(':')?;
    let mut parts = rest.split(':');
    let kind = parts.next()?;
    let id = parts.next()?;
    Some(ResolvedId::new(EntityKind::from_token(kind), id))
}

/// `Some(outcome)` when `value` is a catalog URL, even if it yields no id.
fn resolve_url(value: &str) -> Option<Option<ResolvedId>> {
    let url = Url::parse(value).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !host.contains(CATALOG_HOST_MARKER) {
        return None;
    }

    let mut segments: Vec<String> = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .map(decode_segment)
        .collect();
    if segments.len() > 2 && segments[0].starts_with("intl-") {
        segments.remove(0);
    }

    let outcome = match segments.as_slice() {
        [kind, id, ..] => ResolvedId::new(EntityKind::from_token(kind), id.as_str()),
        [only] => ResolvedId::new(EntityKind::Unknown, only.as_str()),
        [] => None,
    };
    Some(outcome)
}

/// Percent-decode a path segment, keeping the raw text if it is not UTF-8.
fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
