pub mod matcher;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::cache::CachedAlbum;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::hasher::{Algorithm, AudioHasher};
use crate::progress::ProgressReporter;
use crate::quality;
use crate::staging::STAGING_DIR_NAME;

/// How an album was matched into its duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    #[serde(rename = "Album Identifier")]
    Identifier,
    #[serde(rename = "Album/Artist Tags")]
    Tags,
    #[serde(rename = "Acoustic Fingerprint")]
    Fingerprint,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::Identifier => write!(f, "Album Identifier"),
            MatchMethod::Tags => write!(f, "Album/Artist Tags"),
            MatchMethod::Fingerprint => write!(f, "Acoustic Fingerprint"),
        }
    }
}

/// Directory-level aggregate of audio tracks.
#[derive(Debug, Clone)]
pub struct Album {
    pub path: PathBuf,
    /// Audio children sorted by filename; non-recursive.
    pub tracks: Vec<PathBuf>,
    pub track_count: usize,
    /// Tag consensus; `None` when tracks disagree (see `mixed_identifiers`).
    pub album_id: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub total_size: u64,
    pub avg_quality_score: f64,
    /// Parallel to `tracks`; `None` for tracks whose fingerprinting failed.
    pub fingerprints: Vec<Option<Fingerprint>>,
    pub mixed_identifiers: bool,
    pub quality_info: String,
    /// The "(avg)" suffix carried as semantic metadata, placed by
    /// presentation layers.
    pub quality_averaged: bool,
    pub match_method: Option<MatchMethod>,
    pub disc_number: Option<u32>,
    pub disc_subtitle: Option<String>,
    pub total_discs: Option<u32>,
    pub is_partial_match: bool,
    pub overlap_percentage: Option<f64>,
}

impl Album {
    /// Canonical albums anchor auto-mode groups: they carry an identifier
    /// or a complete album/artist tag pair.
    pub fn is_canonical(&self) -> bool {
        self.album_id.is_some() || (self.album_name.is_some() && self.artist_name.is_some())
    }
}

/// Most common non-empty value, ties broken by first appearance.
fn consensus<T: Eq + Hash + Clone>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut order: Vec<T> = Vec::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }
    order.into_iter().max_by_key(|v| counts[v])
}

/// Scans directories into [`Album`] records, reusing the fingerprint and
/// album caches.
pub struct AlbumScanner<'a> {
    hasher: &'a AudioHasher,
    workers: usize,
    stop: Arc<AtomicBool>,
    errors: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

impl<'a> AlbumScanner<'a> {
    pub fn new(hasher: &'a AudioHasher, workers: usize, stop: Arc<AtomicBool>) -> Self {
        AlbumScanner {
            hasher,
            workers: workers.max(1),
            stop,
            errors: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn album_cache_counts(&self) -> (usize, usize) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    /// Discover and scan all albums under the given paths.
    pub fn scan_albums(
        &self,
        paths: &[PathBuf],
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<Album>> {
        self.hasher.ensure_tools(Algorithm::Perceptual)?;

        reporter.on_discovery_start();
        let album_dirs = self.find_album_directories(paths)?;
        reporter.on_discovery_complete(album_dirs.len());
        info!("Found {} album directories", album_dirs.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let mut albums = Vec::new();
        let total = album_dirs.len();
        for (idx, dir) in album_dirs.iter().enumerate() {
            if self.stop.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            match self.extract_album(dir, &pool) {
                Ok(album) => albums.push(album),
                Err(e) => {
                    error!("Error processing {}: {e}", dir.display());
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            reporter.on_album_scan_progress(idx + 1, total);
        }

        if let Some(cache) = self.hasher.cache() {
            cache.flush();
        }

        let (hits, misses) = self.album_cache_counts();
        debug!("Album cache: {hits} hits, {misses} misses");
        Ok(albums)
    }

    /// Directories directly containing at least one supported audio file.
    /// Children are not themselves treated as albums of their parents.
    fn find_album_directories(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for path in paths {
            if self.stop.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            if !path.exists() {
                error!("Path does not exist: {}", path.display());
                self.errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if path.is_file() {
                if AudioHasher::is_audio_file(path) {
                    if let Some(parent) = path.parent() {
                        if seen.insert(parent.to_path_buf()) {
                            dirs.push(parent.to_path_buf());
                        }
                    }
                }
                continue;
            }

            let walker = WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != STAGING_DIR_NAME);

            for entry in walker.filter_map(|e| e.ok()) {
                if self.stop.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                if entry.file_type().is_file() && AudioHasher::is_audio_file(entry.path()) {
                    if let Some(parent) = entry.path().parent() {
                        if seen.insert(parent.to_path_buf()) {
                            dirs.push(parent.to_path_buf());
                        }
                    }
                }
            }
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Build one album record: consensus metadata, per-track fingerprints,
    /// aggregated quality. The album cache short-circuits probing when the
    /// directory is unchanged.
    pub fn extract_album(&self, album_path: &Path, pool: &rayon::ThreadPool) -> Result<Album> {
        let mut tracks: Vec<PathBuf> = std::fs::read_dir(album_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && AudioHasher::is_audio_file(p))
            .collect();
        tracks.sort();

        if tracks.is_empty() {
            return Err(Error::ScanResult(format!(
                "no audio files in {}",
                album_path.display()
            )));
        }

        let dir_mtime = directory_mtime(album_path);
        let path_key = album_path.to_string_lossy().into_owned();

        if let Some(cached) = self
            .hasher
            .cache()
            .and_then(|cache| cache.get_album(&path_key))
        {
            if self.cache_is_fresh(&cached, &tracks, dir_mtime) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                let fingerprinted = self.fingerprint_tracks(&tracks, pool)?;
                return Ok(Album {
                    path: album_path.to_path_buf(),
                    track_count: tracks.len(),
                    tracks,
                    album_id: cached.album_id,
                    album_name: cached.album_name,
                    artist_name: cached.artist_name,
                    total_size: cached.total_size,
                    avg_quality_score: cached.avg_quality_score,
                    fingerprints: fingerprinted.into_iter().map(|t| t.fingerprint).collect(),
                    mixed_identifiers: cached.mixed_identifiers,
                    quality_info: cached.quality_info,
                    quality_averaged: true,
                    match_method: None,
                    disc_number: cached.disc_number,
                    disc_subtitle: cached.disc_subtitle,
                    total_discs: cached.total_discs,
                    is_partial_match: false,
                    overlap_percentage: None,
                });
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Probe every track; failures degrade that track, not the album.
        let mut metadata = Vec::with_capacity(tracks.len());
        for track in &tracks {
            match self.hasher.metadata(track) {
                Ok(meta) => metadata.push(meta),
                Err(e) => {
                    warn!("Metadata probe failed for {}: {e}", track.display());
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    metadata.push(Default::default());
                }
            }
        }

        let identifiers: Vec<String> = metadata.iter().filter_map(|m| m.album_id.clone()).collect();
        let distinct: HashSet<&String> = identifiers.iter().collect();
        let mixed_identifiers = distinct.len() > 1;
        let album_id = if distinct.len() == 1 {
            identifiers.first().cloned()
        } else {
            if mixed_identifiers {
                warn!(
                    "{} has mixed album identifiers, excluded from identifier matching",
                    album_path.display()
                );
            }
            None
        };

        let album_name = consensus(metadata.iter().filter_map(|m| m.album.clone()));
        let artist_name = consensus(metadata.iter().filter_map(|m| m.artist.clone()));
        let disc_number = consensus(metadata.iter().filter_map(|m| m.disc_number));
        let disc_subtitle = consensus(metadata.iter().filter_map(|m| m.disc_subtitle.clone()));
        let total_discs = consensus(metadata.iter().filter_map(|m| m.total_discs));

        let total_size: u64 = tracks
            .iter()
            .map(|t| std::fs::metadata(t).map(|m| m.len()).unwrap_or(0))
            .sum();

        let scores: Vec<f64> = metadata.iter().map(quality::quality_score).collect();
        let avg_quality_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let quality_info = quality::format_audio_info(&metadata[0]);

        let fingerprinted = self.fingerprint_tracks(&tracks, pool)?;
        let succeeded = fingerprinted.iter().filter(|t| t.fingerprint.is_some()).count();
        if succeeded == 0 {
            return Err(Error::ScanResult(format!(
                "all tracks failed fingerprinting in {}",
                album_path.display()
            )));
        }

        if let Some(cache) = self.hasher.cache() {
            let cached_tracks: Vec<(String, String)> = tracks
                .iter()
                .zip(fingerprinted.iter())
                .map(|(path, fp)| {
                    (
                        path.to_string_lossy().into_owned(),
                        fp.content_hash.clone().unwrap_or_default(),
                    )
                })
                .collect();
            cache.set_album(
                &path_key,
                &CachedAlbum {
                    track_count: tracks.len(),
                    album_id: album_id.clone(),
                    album_name: album_name.clone(),
                    artist_name: artist_name.clone(),
                    total_size,
                    avg_quality_score,
                    quality_info: quality_info.clone(),
                    mixed_identifiers,
                    disc_number,
                    disc_subtitle: disc_subtitle.clone(),
                    total_discs,
                    directory_mtime: dir_mtime,
                    tracks: cached_tracks,
                },
            );
        }

        Ok(Album {
            path: album_path.to_path_buf(),
            track_count: tracks.len(),
            tracks,
            album_id,
            album_name,
            artist_name,
            total_size,
            avg_quality_score,
            fingerprints: fingerprinted.into_iter().map(|t| t.fingerprint).collect(),
            mixed_identifiers,
            quality_info,
            quality_averaged: true,
            match_method: None,
            disc_number,
            disc_subtitle,
            total_discs,
            is_partial_match: false,
            overlap_percentage: None,
        })
    }

    fn cache_is_fresh(&self, cached: &CachedAlbum, tracks: &[PathBuf], dir_mtime: i64) -> bool {
        if cached.directory_mtime != dir_mtime {
            return false;
        }
        let current: Vec<String> = tracks
            .iter()
            .map(|t| t.to_string_lossy().into_owned())
            .collect();
        let stored: Vec<&String> = cached.tracks.iter().map(|(path, _)| path).collect();
        stored.len() == current.len() && stored.iter().zip(current.iter()).all(|(a, b)| *a == b)
    }

    fn fingerprint_tracks(
        &self,
        tracks: &[PathBuf],
        pool: &rayon::ThreadPool,
    ) -> Result<Vec<FingerprintedTrack>> {
        let work = |track: &PathBuf| -> Result<FingerprintedTrack> {
            if self.stop.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            Ok(self.fingerprint_one(track))
        };

        if self.workers <= 1 {
            tracks.iter().map(work).collect()
        } else {
            pool.install(|| tracks.par_iter().map(work).collect())
        }
    }

    fn fingerprint_one(&self, track: &Path) -> FingerprintedTrack {
        let content_hash = match AudioHasher::compute_file_hash(track) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Cannot hash {}: {e}", track.display());
                self.errors.fetch_add(1, Ordering::Relaxed);
                return FingerprintedTrack {
                    content_hash: None,
                    fingerprint: None,
                };
            }
        };

        match self.hasher.fingerprint(track, &content_hash) {
            Ok(fp) => FingerprintedTrack {
                content_hash: Some(content_hash),
                fingerprint: Some(fp),
            },
            Err(e) => {
                warn!("Failed to fingerprint {}: {e}", track.display());
                self.errors.fetch_add(1, Ordering::Relaxed);
                FingerprintedTrack {
                    content_hash: Some(content_hash),
                    fingerprint: None,
                }
            }
        }
    }
}

struct FingerprintedTrack {
    content_hash: Option<String>,
    fingerprint: Option<Fingerprint>,
}

fn directory_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consensus_most_common() {
        let values = vec!["a", "b", "b", "c"];
        assert_eq!(consensus(values.into_iter()), Some("b"));
    }

    #[test]
    fn test_consensus_tie_breaks_by_first_seen() {
        let values = vec!["x", "y", "y", "x"];
        assert_eq!(consensus(values.into_iter()), Some("x"));
    }

    #[test]
    fn test_consensus_empty() {
        assert_eq!(consensus(std::iter::empty::<String>()), None);
    }
}
