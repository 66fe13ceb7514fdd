use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use super::{CacheStats, FingerprintCache};
use crate::error::Result;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonEntry {
    // Legacy shape: bare fingerprint text.
    Bare(String),
    Full {
        fingerprint: String,
        algorithm: String,
        created_at: i64,
        last_accessed: i64,
    },
}

impl JsonEntry {
    fn fingerprint_text(&self) -> &str {
        match self {
            JsonEntry::Bare(text) => text,
            JsonEntry::Full { fingerprint, .. } => fingerprint,
        }
    }

    fn last_accessed(&self) -> Option<i64> {
        match self {
            JsonEntry::Bare(_) => None,
            JsonEntry::Full { last_accessed, .. } => Some(*last_accessed),
        }
    }
}

struct JsonState {
    entries: HashMap<String, JsonEntry>,
    modified: bool,
}

/// Legacy flat-file cache: the whole document is held in memory and written
/// back on flush/drop. Single-writer only; opening it from parallel workers
/// is rejected at configuration time.
pub struct JsonCache {
    json_path: PathBuf,
    state: Mutex<JsonState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl JsonCache {
    pub fn open(json_path: &Path) -> Result<Self> {
        let entries = if json_path.exists() {
            let raw = std::fs::read_to_string(json_path)?;
            serde_json::from_str::<HashMap<String, JsonEntry>>(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(JsonCache {
            json_path: json_path.to_path_buf(),
            state: Mutex::new(JsonState {
                entries,
                modified: false,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn save(&self, state: &JsonState) {
        if let Some(parent) = self.json_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string(&state.entries) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(&self.json_path, serialized) {
                    warn!("Failed to write JSON cache: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize JSON cache: {e}"),
        }
    }
}

impl FingerprintCache for JsonCache {
    fn get(&self, content_hash: &str) -> Option<Fingerprint> {
        let mut state = self.state.lock().unwrap();
        let now = unix_now();

        let fp = state.entries.get(content_hash).and_then(|entry| {
            let text = entry.fingerprint_text();
            Fingerprint::from_cache_string(text).or_else(|| Fingerprint::parse(text))
        });

        match fp {
            Some(fp) => {
                if let Some(JsonEntry::Full { last_accessed, .. }) =
                    state.entries.get_mut(content_hash)
                {
                    *last_accessed = now;
                    state.modified = true;
                }
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
        let now = unix_now();
        let mut state = self.state.lock().unwrap();
        state.entries.insert(
            content_hash.to_string(),
            JsonEntry::Full {
                fingerprint: fingerprint.to_cache_string(),
                algorithm: algorithm.to_string(),
                created_at: now,
                last_accessed: now,
            },
        );
        state.modified = true;
    }

    fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: state.entries.len() as u64,
            backend: "json",
        }
    }

    fn clear(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.modified = false;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        if self.json_path.exists() {
            std::fs::remove_file(&self.json_path).is_ok()
        } else {
            true
        }
    }

    fn cleanup_old(&self, max_age_days: u64) -> usize {
        let cutoff = unix_now() - max_age_days as i64 * 86_400;
        let mut state = self.state.lock().unwrap();
        let before = state.entries.len();
        // Bare legacy entries carry no timestamp and are kept.
        state
            .entries
            .retain(|_, entry| entry.last_accessed().map(|ts| ts >= cutoff).unwrap_or(true));
        let removed = before - state.entries.len();
        if removed > 0 {
            state.modified = true;
        }
        removed
    }

    fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        if state.modified {
            self.save(&state);
            state.modified = false;
        }
    }

    fn kind(&self) -> &'static str {
        "json"
    }
}

impl Drop for JsonCache {
    fn drop(&mut self) {
        self.flush();
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
