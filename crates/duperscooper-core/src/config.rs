use config::{Config, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;

/// Default minimum file size considered by discovery (1 MiB). 0 disables.
pub const DEFAULT_MIN_SIZE: u64 = 1_048_576;

/// Default similarity threshold for perceptual matching, in percent.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 97.0;

/// Default minimum track overlap for partial album matching, in percent.
pub const DEFAULT_MIN_ALBUM_OVERLAP: f64 = 70.0;

/// Default worker count for parallel fingerprinting.
pub const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Sqlite,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackendKind,
    /// Overrides the per-user cache location when set.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_min_size")]
    pub min_size: u64,
    #[serde(default = "default_min_overlap")]
    pub min_album_overlap: f64,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Sqlite
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_min_size() -> u64 {
    DEFAULT_MIN_SIZE
}

fn default_min_overlap() -> f64 {
    DEFAULT_MIN_ALBUM_OVERLAP
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            cache_backend: default_cache_backend(),
            cache_path: None,
            workers: default_workers(),
            similarity_threshold: default_threshold(),
            min_size: default_min_size(),
            min_album_overlap: default_min_overlap(),
            ignore_patterns: Vec::new(),
        }
    }
}

pub fn load_configuration() -> Result<AppConfig> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    Ok(builder.try_deserialize::<AppConfig>()?)
}

/// Clamp a user-supplied similarity threshold into [0, 100].
pub fn clamp_threshold(threshold: f64) -> f64 {
    threshold.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache_backend, CacheBackendKind::Sqlite);
        assert_eq!(config.workers, 8);
        assert_eq!(config.min_size, 1_048_576);
        assert_eq!(config.similarity_threshold, 97.0);
    }

    #[test]
    fn test_clamp_threshold() {
        assert_eq!(clamp_threshold(150.0), 100.0);
        assert_eq!(clamp_threshold(-3.0), 0.0);
        assert_eq!(clamp_threshold(97.5), 97.5);
    }
}
