use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::{CacheStats, CachedAlbum, FingerprintCache};
use crate::error::Result;
use crate::fingerprint::Fingerprint;

const OPEN_RETRIES: u32 = 5;
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS fingerprint_cache (
    file_hash TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_last_accessed
    ON fingerprint_cache(last_accessed);

CREATE TABLE IF NOT EXISTS album_cache (
    album_path TEXT PRIMARY KEY,
    track_count INTEGER NOT NULL,
    album_identifier TEXT,
    album_name TEXT,
    artist_name TEXT,
    total_size INTEGER NOT NULL,
    avg_quality_score REAL NOT NULL,
    quality_info TEXT NOT NULL,
    mixed_identifiers INTEGER NOT NULL,
    disc_number INTEGER,
    disc_subtitle TEXT,
    total_discs INTEGER,
    directory_mtime INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_album_last_accessed
    ON album_cache(last_accessed);

CREATE TABLE IF NOT EXISTS album_tracks (
    album_path TEXT NOT NULL,
    track_path TEXT NOT NULL,
    track_index INTEGER NOT NULL,
    file_hash TEXT NOT NULL,
    PRIMARY KEY (album_path, track_index),
    FOREIGN KEY (album_path) REFERENCES album_cache(album_path)
        ON DELETE CASCADE
);
";

thread_local! {
    // One connection per (thread, database) pair. WAL serializes writers
    // while readers proceed concurrently.
    static CONNECTIONS: RefCell<HashMap<PathBuf, Connection>> = RefCell::new(HashMap::new());
}

/// Durable fingerprint cache backed by a single SQLite file in WAL mode.
pub struct SqliteCache {
    db_path: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SqliteCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Initialize the schema through a throwaway connection; worker
        // threads open their own lazily.
        let conn = Self::open_connection(db_path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("SQLite fingerprint cache ready at {}", db_path.display());

        Ok(SqliteCache {
            db_path: db_path.to_path_buf(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn open_connection(db_path: &Path) -> Result<Connection> {
        let mut delay = Duration::from_millis(100);
        let mut attempt = 0;
        loop {
            match Connection::open(db_path) {
                Ok(conn) => {
                    conn.execute_batch(
                        "PRAGMA journal_mode = WAL;
                         PRAGMA synchronous = NORMAL;
                         PRAGMA foreign_keys = ON;
                         PRAGMA cache_size = -64000;
                         PRAGMA busy_timeout = 5000;",
                    )?;
                    return Ok(conn);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= OPEN_RETRIES {
                        return Err(e.into());
                    }
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }

    /// Run a closure against this thread's connection, opening it on first
    /// use. Storage errors are logged and surfaced as `None`.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Option<T> {
        CONNECTIONS.with(|cell| {
            let mut map = cell.borrow_mut();
            if !map.contains_key(&self.db_path) {
                match Self::open_connection(&self.db_path) {
                    Ok(conn) => {
                        map.insert(self.db_path.clone(), conn);
                    }
                    Err(e) => {
                        warn!("Cache connection failed: {e}");
                        return None;
                    }
                }
            }
            match f(map.get(&self.db_path).expect("connection just inserted")) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Cache operation failed: {e}");
                    None
                }
            }
        })
    }

    /// Upsert preserving explicit timestamps; used by legacy migration.
    pub fn set_with_timestamps(
        &self,
        content_hash: &str,
        fingerprint: &Fingerprint,
        algorithm: &str,
        created_at: Option<i64>,
        last_accessed: Option<i64>,
    ) {
        let now = unix_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO fingerprint_cache \
                 (file_hash, fingerprint, algorithm, created_at, last_accessed) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    content_hash,
                    fingerprint.to_cache_string(),
                    algorithm,
                    created_at.unwrap_or(now),
                    last_accessed.unwrap_or(now),
                ],
            )
        });
    }
}

impl FingerprintCache for SqliteCache {
    fn get(&self, content_hash: &str) -> Option<Fingerprint> {
        let row: Option<String> = self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT fingerprint FROM fingerprint_cache WHERE file_hash = ?1",
                    params![content_hash],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_some() {
                conn.execute(
                    "UPDATE fingerprint_cache SET last_accessed = ?1 WHERE file_hash = ?2",
                    params![unix_now(), content_hash],
                )?;
            }
            Ok(found)
        })?;

        match row.and_then(|text| Fingerprint::from_cache_string(&text)) {
            Some(fp) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(fp)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, content_hash: &str, fingerprint: &Fingerprint, algorithm: &str) {
        self.set_with_timestamps(content_hash, fingerprint, algorithm, None, None);
    }

    fn stats(&self) -> CacheStats {
        let size: u64 = self
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM fingerprint_cache", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .unwrap_or(0) as u64;

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
            backend: "sqlite",
        }
    }

    fn clear(&self) -> bool {
        let cleared = self
            .with_conn(|conn| {
                conn.execute_batch(
                    "DELETE FROM album_tracks;
                     DELETE FROM album_cache;
                     DELETE FROM fingerprint_cache;",
                )
            })
            .is_some();
        if cleared {
            self.hits.store(0, Ordering::Relaxed);
            self.misses.store(0, Ordering::Relaxed);
        }
        cleared
    }

    fn cleanup_old(&self, max_age_days: u64) -> usize {
        let cutoff = unix_now() - max_age_days as i64 * 86_400;
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM fingerprint_cache WHERE last_accessed < ?1",
                params![cutoff],
            )
        })
        .unwrap_or(0)
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn get_album(&self, album_path: &str) -> Option<CachedAlbum> {
        let album = self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT track_count, album_identifier, album_name, artist_name, \
                     total_size, avg_quality_score, quality_info, mixed_identifiers, \
                     disc_number, disc_subtitle, total_discs, directory_mtime \
                     FROM album_cache WHERE album_path = ?1",
                    params![album_path],
                    |row| {
                        Ok(CachedAlbum {
                            track_count: row.get::<_, i64>(0)? as usize,
                            album_id: row.get(1)?,
                            album_name: row.get(2)?,
                            artist_name: row.get(3)?,
                            total_size: row.get::<_, i64>(4)? as u64,
                            avg_quality_score: row.get(5)?,
                            quality_info: row.get(6)?,
                            mixed_identifiers: row.get(7)?,
                            disc_number: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
                            disc_subtitle: row.get(9)?,
                            total_discs: row.get::<_, Option<i64>>(10)?.map(|v| v as u32),
                            directory_mtime: row.get(11)?,
                            tracks: Vec::new(),
                        })
                    },
                )
                .optional()?;

            let mut album = match found {
                Some(album) => album,
                None => return Ok(None),
            };

            let mut stmt = conn.prepare(
                "SELECT track_path, file_hash FROM album_tracks \
                 WHERE album_path = ?1 ORDER BY track_index",
            )?;
            album.tracks = stmt
                .query_map(params![album_path], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            conn.execute(
                "UPDATE album_cache SET last_accessed = ?1 WHERE album_path = ?2",
                params![unix_now(), album_path],
            )?;

            Ok(Some(album))
        })?;
        album
    }

    fn set_album(&self, album_path: &str, album: &CachedAlbum) {
        let now = unix_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO album_cache ( \
                 album_path, track_count, album_identifier, album_name, artist_name, \
                 total_size, avg_quality_score, quality_info, mixed_identifiers, \
                 disc_number, disc_subtitle, total_discs, directory_mtime, \
                 created_at, last_accessed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    album_path,
                    album.track_count as i64,
                    album.album_id,
                    album.album_name,
                    album.artist_name,
                    album.total_size as i64,
                    album.avg_quality_score,
                    album.quality_info,
                    album.mixed_identifiers,
                    album.disc_number.map(|v| v as i64),
                    album.disc_subtitle,
                    album.total_discs.map(|v| v as i64),
                    album.directory_mtime,
                    now,
                    now,
                ],
            )?;

            conn.execute(
                "DELETE FROM album_tracks WHERE album_path = ?1",
                params![album_path],
            )?;
            for (idx, (track_path, file_hash)) in album.tracks.iter().enumerate() {
                conn.execute(
                    "INSERT INTO album_tracks (album_path, track_path, track_index, file_hash) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![album_path, track_path, idx as i64, file_hash],
                )?;
            }
            Ok(())
        });
    }

    fn clear_albums(&self) -> bool {
        self.with_conn(|conn| {
            conn.execute_batch(
                "DELETE FROM album_tracks;
                 DELETE FROM album_cache;",
            )
        })
        .is_some()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
