use glob::Pattern;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::hasher::{Algorithm, AudioHasher};
use crate::model::{ScanOutcome, TrackRecord};
use crate::progress::ProgressReporter;
use crate::quality;
use crate::staging::STAGING_DIR_NAME;

struct FingerprintProgress {
    done: usize,
    started: Instant,
}

impl FingerprintProgress {
    fn advance(&mut self, total: usize) -> (usize, Option<u64>) {
        self.done += 1;
        // Running-mean rate over the whole phase.
        let elapsed = self.started.elapsed().as_secs_f64();
        let eta = if self.done > 0 && elapsed > 0.0 {
            let rate = self.done as f64 / elapsed;
            Some(((total - self.done) as f64 / rate) as u64)
        } else {
            None
        };
        (self.done, eta)
    }
}

/// Discovers audio files and produces fingerprinted [`TrackRecord`]s over a
/// bounded worker pool.
pub struct TrackScanner {
    hasher: AudioHasher,
    algorithm: Algorithm,
    min_size: u64,
    workers: usize,
    ignore_patterns: Vec<Pattern>,
    stop: Arc<AtomicBool>,
    errors: AtomicUsize,
}

impl TrackScanner {
    pub fn new(
        hasher: AudioHasher,
        algorithm: Algorithm,
        min_size: u64,
        workers: usize,
        ignore_globs: &[String],
    ) -> Self {
        let ignore_patterns = compile_patterns(ignore_globs);
        TrackScanner {
            hasher,
            algorithm,
            min_size,
            workers: workers.max(1),
            ignore_patterns,
            stop: Arc::new(AtomicBool::new(false)),
            errors: AtomicUsize::new(0),
        }
    }

    /// Shared cooperative-cancellation flag, checked between files.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn hasher(&self) -> &AudioHasher {
        &self.hasher
    }

    /// Full track pipeline: discovery, then fingerprint production. The
    /// returned records are in discovery order regardless of worker
    /// scheduling, so downstream grouping is deterministic.
    pub fn scan(&self, paths: &[PathBuf], reporter: &dyn ProgressReporter) -> Result<ScanOutcome> {
        self.hasher.ensure_tools(self.algorithm)?;
        self.check_cache_concurrency()?;

        reporter.on_discovery_start();
        let files = self.discover(paths, reporter)?;
        reporter.on_discovery_complete(files.len());
        info!("Discovered {} audio file(s)", files.len());

        reporter.on_fingerprint_start(files.len());
        let records = self.fingerprint_files(&files, reporter)?;
        let errors = self.errors.load(Ordering::Relaxed);
        reporter.on_fingerprint_complete(records.len(), errors);

        if let Some(cache) = self.hasher.cache() {
            cache.flush();
        }

        Ok(ScanOutcome {
            tracks: records,
            errors,
        })
    }

    /// The legacy flat-file cache is single-writer; driving it from a
    /// parallel pool is a configuration error, not a supported mode.
    fn check_cache_concurrency(&self) -> Result<()> {
        if self.workers > 1 {
            if let Some(cache) = self.hasher.cache() {
                if cache.kind() == "json" {
                    return Err(Error::InvalidConfig(
                        "the json cache backend is single-writer; use --workers 1 \
                         or the sqlite backend"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Walk each input path and yield supported audio files meeting the
    /// minimum size, in deterministic lexicographic order.
    pub fn discover(
        &self,
        paths: &[PathBuf],
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

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
                if AudioHasher::is_audio_file(path) && self.meets_requirements(path) {
                    files.push(path.clone());
                }
                continue;
            }

            let walker = WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    // Never descend into staging roots.
                    e.file_name() != STAGING_DIR_NAME
                });

            for entry in walker {
                if self.stop.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Error reading directory entry: {e}");
                        continue;
                    }
                };
                let entry_path = entry.path();
                if entry.file_type().is_file()
                    && AudioHasher::is_audio_file(entry_path)
                    && self.meets_requirements(entry_path)
                {
                    files.push(entry_path.to_path_buf());
                    if files.len() % 100 == 0 {
                        reporter.on_discovery_progress(files.len());
                    }
                }
            }
        }

        Ok(files)
    }

    fn meets_requirements(&self, path: &Path) -> bool {
        if self
            .ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
        {
            return false;
        }
        if self.min_size == 0 {
            return true;
        }
        std::fs::metadata(path)
            .map(|m| m.len() >= self.min_size)
            .unwrap_or(false)
    }

    fn fingerprint_files(
        &self,
        files: &[PathBuf],
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<TrackRecord>> {
        let total = files.len();
        let progress = Mutex::new(FingerprintProgress {
            done: 0,
            started: Instant::now(),
        });

        let process = |path: &PathBuf| -> Result<Option<TrackRecord>> {
            if self.stop.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let record = self.process_file(path);
            let (done, eta) = progress.lock().unwrap().advance(total);
            reporter.on_fingerprint_progress(done, total, eta);
            Ok(record)
        };

        let results: Result<Vec<Option<TrackRecord>>> = if self.workers <= 1 {
            files.iter().map(process).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
            pool.install(|| files.par_iter().map(process).collect())
        };

        // par_iter preserves input order through collect, so the record
        // sequence matches discovery order.
        Ok(results?.into_iter().flatten().collect())
    }

    fn process_file(&self, path: &Path) -> Option<TrackRecord> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                error!("Cannot stat {}: {e}", path.display());
                self.errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let content_hash = match AudioHasher::compute_file_hash(path) {
            Ok(hash) => hash,
            Err(e) => {
                error!("Cannot hash {}: {e}", path.display());
                self.errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let metadata = match self.hasher.metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                error!("Metadata probe failed for {}: {e}", path.display());
                self.errors.fetch_add(1, Ordering::Relaxed);
                Default::default()
            }
        };

        let fingerprint = match self.algorithm {
            Algorithm::Exact => None,
            Algorithm::Perceptual => match self.hasher.fingerprint(path, &content_hash) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    // The file stays out of fuzzy grouping but is counted.
                    error!("Error fingerprinting {}: {e}", path.display());
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
        };

        let quality_score = quality::quality_score(&metadata);
        let quality_info = quality::format_audio_info(&metadata);

        Some(TrackRecord {
            path: path.to_path_buf(),
            size,
            content_hash,
            fingerprint,
            metadata,
            quality_score,
            quality_info,
        })
    }
}

fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                error!("Invalid glob pattern '{glob}': {e}");
                None
            }
        })
        .collect()
}
