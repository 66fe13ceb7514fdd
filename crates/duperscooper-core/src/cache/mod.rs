pub mod json;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::config::{AppConfig, CacheBackendKind};
use crate::error::Result;
use crate::fingerprint::Fingerprint;

pub use json::JsonCache;
pub use sqlite::SqliteCache;

/// Monotonic per-process cache counters plus backend identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub backend: &'static str,
}

/// Album-level cache entry (SQLite backend only). Staleness is judged by
/// the caller against `directory_mtime` and the stored track list.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAlbum {
    pub track_count: usize,
    pub album_id: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub total_size: u64,
    pub avg_quality_score: f64,
    pub quality_info: String,
    pub mixed_identifiers: bool,
    pub disc_number: Option<u32>,
    pub disc_subtitle: Option<String>,
    pub total_discs: Option<u32>,
    pub directory_mtime: i64,
    /// Ordered (track path, content hash) pairs.
    pub tracks: Vec<(String, String)>,
}

/// Abstract fingerprint cache: content hash → (fingerprint, algorithm,
/// timestamps). Implementations log and swallow internal storage errors so
/// that a failing cache degrades to compute-without-cache rather than
/// aborting the run; a later successful `set` silently rebuilds entries.
pub trait FingerprintCache: Send + Sync {
    fn get(&self, content_hash: &str) -> Option<Fingerprint>;
    fn set(&self, content_hash: &str, fingerprint: &Fingerprint, algorithm: &str);
    fn stats(&self) -> CacheStats;
    fn clear(&self) -> bool;
    /// Remove entries whose last access is older than `max_age_days`.
    /// Returns the number of entries removed.
    fn cleanup_old(&self, max_age_days: u64) -> usize;
    /// Persist any buffered state. No-op for write-through backends.
    fn flush(&self) {}
    fn kind(&self) -> &'static str;

    fn get_album(&self, _album_path: &str) -> Option<CachedAlbum> {
        None
    }
    fn set_album(&self, _album_path: &str, _album: &CachedAlbum) {}
    fn clear_albums(&self) -> bool {
        false
    }
}

/// Per-user cache directory (`<config_dir>/duperscooper`).
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("duperscooper"))
}

pub fn default_sqlite_path() -> Option<PathBuf> {
    default_cache_dir().map(|d| d.join("fingerprints.db"))
}

pub fn default_json_path() -> Option<PathBuf> {
    default_cache_dir().map(|d| d.join("hashes.json"))
}

/// Open the configured cache backend. Open failure is non-fatal: the run
/// degrades to compute-without-cache with a warning.
pub fn open_cache(config: &AppConfig) -> Option<Arc<dyn FingerprintCache>> {
    let path = config.cache_path.clone().or_else(|| match config.cache_backend {
        CacheBackendKind::Sqlite => default_sqlite_path(),
        CacheBackendKind::Json => default_json_path(),
    })?;

    match config.cache_backend {
        CacheBackendKind::Sqlite => match SqliteCache::open(&path) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!("Cache unavailable ({e}), continuing without cache");
                None
            }
        },
        CacheBackendKind::Json => match JsonCache::open(&path) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!("Cache unavailable ({e}), continuing without cache");
                None
            }
        },
    }
}

/// One-shot import of a legacy JSON cache into the SQLite backend.
/// Accepts both the bare `{hash: "fingerprint"}` shape and entries carrying
/// timestamps, which are preserved. Returns the number of entries migrated.
pub fn migrate_legacy(json_path: &std::path::Path, db_path: &std::path::Path) -> Result<usize> {
    if !json_path.exists() {
        return Ok(0);
    }

    let raw = std::fs::read_to_string(json_path)?;
    let data: serde_json::Value = serde_json::from_str(&raw)?;
    let map = match data.as_object() {
        Some(map) => map,
        None => return Ok(0),
    };

    let cache = SqliteCache::open(db_path)?;
    let mut migrated = 0usize;

    for (hash, entry) in map {
        let (fp_text, created_at, last_accessed, algorithm) = match entry {
            serde_json::Value::String(s) => (s.clone(), None, None, None),
            serde_json::Value::Object(fields) => {
                let fp = match fields.get("fingerprint").and_then(|v| v.as_str()) {
                    Some(fp) => fp.to_string(),
                    None => continue,
                };
                (
                    fp,
                    fields.get("created_at").and_then(|v| v.as_i64()),
                    fields.get("last_accessed").and_then(|v| v.as_i64()),
                    fields
                        .get("algorithm")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                )
            }
            _ => continue,
        };

        let fingerprint = match Fingerprint::from_cache_string(&fp_text)
            .or_else(|| Fingerprint::parse(&fp_text))
        {
            Some(fp) => fp,
            None => continue,
        };

        cache.set_with_timestamps(
            hash,
            &fingerprint,
            algorithm.as_deref().unwrap_or(crate::hasher::CHROMAPRINT_ALGORITHM),
            created_at,
            last_accessed,
        );
        migrated += 1;
    }

    Ok(migrated)
}
