use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::hasher::AudioHasher;

/// Staging root created alongside the scanned tree.
pub const STAGING_DIR_NAME: &str = ".deletedByDuperscooper";

/// Archive for fully-restored batches, sibling of the active batches.
pub const RESTORED_DIR_NAME: &str = ".restored";

const MANIFEST_NAME: &str = "manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    Track,
    Album,
}

impl std::fmt::Display for StagingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingMode::Track => write!(f, "track"),
            StagingMode::Album => write!(f, "album"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorationState {
    None,
    Partial,
    All,
}

impl std::fmt::Display for RestorationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestorationState::None => write!(f, "none"),
            RestorationState::Partial => write!(f, "partial"),
            RestorationState::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestItem {
    pub original_path: PathBuf,
    /// Relative to the batch directory; mirrors the original layout under
    /// the scan root.
    pub staged_path: PathBuf,
    pub size: u64,
    /// Content hash computed before the move; restoration verifies against
    /// it bit-exactly.
    pub sha256: String,
    pub restored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub batch_id: String,
    pub created_at: String,
    pub mode: StagingMode,
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    pub fn restoration_state(&self) -> RestorationState {
        let restored = self.items.iter().filter(|i| i.restored).count();
        if restored == 0 {
            RestorationState::None
        } else if restored == self.items.len() {
            RestorationState::All
        } else {
            RestorationState::Partial
        }
    }

    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|i| i.size).sum()
    }
}

/// One reversible deletion in progress. Files are moved, never copied and
/// deleted, so staging is cheap within a filesystem.
pub struct StagingBatch {
    scan_root: PathBuf,
    batch_dir: PathBuf,
    manifest: Manifest,
}

impl StagingBatch {
    pub fn create(scan_root: &Path, mode: StagingMode) -> Result<Self> {
        let scan_root = scan_root
            .canonicalize()
            .map_err(|e| Error::Staging(format!("cannot resolve scan root: {e}")))?;
        let batch_id = Uuid::new_v4().to_string();
        let batch_dir = scan_root.join(STAGING_DIR_NAME).join(&batch_id);

        Ok(StagingBatch {
            scan_root,
            batch_dir,
            manifest: Manifest {
                batch_id,
                created_at: Utc::now().to_rfc3339(),
                mode,
                items: Vec::new(),
            },
        })
    }

    pub fn batch_id(&self) -> &str {
        &self.manifest.batch_id
    }

    pub fn item_count(&self) -> usize {
        self.manifest.items.len()
    }

    /// Stage a single file: record its pre-move content hash, move it under
    /// the batch directory preserving its scan-root-relative path.
    pub fn stage_file(&mut self, path: &Path, album_path: Option<&Path>) -> Result<()> {
        let path = path
            .canonicalize()
            .map_err(|e| Error::Staging(format!("{}: {e}", path.display())))?;
        let size = fs::metadata(&path)?.len();
        let sha256 = AudioHasher::compute_file_hash(&path)?;

        let relative = path
            .strip_prefix(&self.scan_root)
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|_| PathBuf::from(path.file_name().expect("file has a name")));
        let staged_abs = self.batch_dir.join(&relative);

        if let Some(parent) = staged_abs.parent() {
            fs::create_dir_all(parent)?;
        }
        move_file(&path, &staged_abs)?;
        debug!("Staged {} -> {}", path.display(), staged_abs.display());

        self.manifest.items.push(ManifestItem {
            original_path: path,
            staged_path: relative,
            size,
            sha256,
            restored: false,
            album_path: album_path.map(|p| p.to_path_buf()),
        });
        Ok(())
    }

    /// Stage every regular file directly inside an album directory, then
    /// remove the directory if that emptied it.
    pub fn stage_album(&mut self, album_dir: &Path) -> Result<usize> {
        let album_dir = album_dir
            .canonicalize()
            .map_err(|e| Error::Staging(format!("{}: {e}", album_dir.display())))?;

        let mut children: Vec<PathBuf> = fs::read_dir(&album_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        children.sort();

        let mut staged = 0usize;
        for child in children {
            self.stage_file(&child, Some(&album_dir))?;
            staged += 1;
        }

        // Leave the directory behind if non-file entries remain.
        let _ = fs::remove_dir(&album_dir);
        Ok(staged)
    }

    /// Write the manifest. An empty batch leaves no directory behind.
    pub fn finalize(self) -> Result<Option<PathBuf>> {
        if self.manifest.items.is_empty() {
            return Ok(None);
        }
        let manifest_path = self.batch_dir.join(MANIFEST_NAME);
        fs::write(&manifest_path, serde_json::to_string_pretty(&self.manifest)?)?;
        info!(
            "Staged {} item(s) in batch {}",
            self.manifest.items.len(),
            self.manifest.batch_id
        );
        Ok(Some(self.batch_dir))
    }
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub path: PathBuf,
    pub created_at: String,
    pub age_days: i64,
    pub mode: StagingMode,
    pub item_count: usize,
    pub total_size: u64,
    pub restoration: RestorationState,
    pub archived: bool,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: usize,
    pub archived: bool,
}

fn staging_base(scan_root: &Path) -> PathBuf {
    scan_root.join(STAGING_DIR_NAME)
}

fn read_manifest(batch_dir: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(batch_dir.join(MANIFEST_NAME))?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_manifest(batch_dir: &Path, manifest: &Manifest) -> Result<()> {
    fs::write(
        batch_dir.join(MANIFEST_NAME),
        serde_json::to_string_pretty(manifest)?,
    )?;
    Ok(())
}

fn summarize(batch_dir: &Path, archived: bool) -> Option<BatchSummary> {
    let manifest = match read_manifest(batch_dir) {
        Ok(manifest) => manifest,
        Err(_) => return None,
    };
    let age_days = DateTime::parse_from_rfc3339(&manifest.created_at)
        .map(|created| (Utc::now() - created.with_timezone(&Utc)).num_days())
        .unwrap_or(0);

    Some(BatchSummary {
        batch_id: manifest.batch_id.clone(),
        path: batch_dir.to_path_buf(),
        created_at: manifest.created_at.clone(),
        age_days,
        mode: manifest.mode,
        item_count: manifest.items.len(),
        total_size: manifest.total_size(),
        restoration: manifest.restoration_state(),
        archived,
    })
}

/// Enumerate staging batches under a scan root, active first, newest first
/// within each section. Archived (fully restored) batches are included.
pub fn list_batches(scan_root: &Path) -> Result<Vec<BatchSummary>> {
    let base = staging_base(scan_root);
    let mut summaries = Vec::new();

    if !base.exists() {
        return Ok(summaries);
    }

    let collect = |dir: &Path, archived: bool, out: &mut Vec<BatchSummary>| {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_dir() && path.file_name().map(|n| n != RESTORED_DIR_NAME).unwrap_or(false)
                {
                    if let Some(summary) = summarize(&path, archived) {
                        out.push(summary);
                    }
                }
            }
        }
    };

    let mut active = Vec::new();
    collect(&base, false, &mut active);
    let mut archived = Vec::new();
    collect(&base.join(RESTORED_DIR_NAME), true, &mut archived);

    active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    archived.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    summaries.extend(active);
    summaries.extend(archived);
    Ok(summaries)
}

fn find_batch_dir(scan_root: &Path, batch_id: &str) -> Result<PathBuf> {
    let base = staging_base(scan_root);
    let active = base.join(batch_id);
    if active.join(MANIFEST_NAME).exists() {
        return Ok(active);
    }
    let archived = base.join(RESTORED_DIR_NAME).join(batch_id);
    if archived.join(MANIFEST_NAME).exists() {
        return Ok(archived);
    }
    Err(Error::BatchNotFound(batch_id.to_string()))
}

/// Load a batch manifest for inspection (e.g. interactive selection).
pub fn load_manifest(scan_root: &Path, batch_id: &str) -> Result<Manifest> {
    let batch_dir = find_batch_dir(scan_root, batch_id)?;
    read_manifest(&batch_dir)
}

/// Restore items from a batch by UUID.
///
/// Every unrestored item (or the selected subset) is verified against its
/// manifest hash before moving back; a mismatch or destination collision
/// fails that item only. When everything is restored the batch directory is
/// archived under `.restored/`.
pub fn restore_batch(
    scan_root: &Path,
    batch_id: &str,
    restore_to: Option<&Path>,
    select: Option<&[usize]>,
) -> Result<RestoreReport> {
    let batch_dir = find_batch_dir(scan_root, batch_id)?;
    let mut manifest = read_manifest(&batch_dir)?;
    let mut report = RestoreReport::default();

    for (idx, item) in manifest.items.iter_mut().enumerate() {
        if item.restored {
            continue;
        }
        if let Some(selected) = select {
            if !selected.contains(&idx) {
                continue;
            }
        }

        let staged_abs = batch_dir.join(&item.staged_path);
        let destination = match restore_to {
            Some(root) => root.join(&item.staged_path),
            None => item.original_path.clone(),
        };

        match restore_item(&staged_abs, &destination, &item.sha256) {
            Ok(()) => {
                item.restored = true;
                report.restored += 1;
                info!("Restored {}", destination.display());
            }
            Err(e) => {
                error!("Failed to restore {}: {e}", item.original_path.display());
                report.failed += 1;
            }
        }
    }

    write_manifest(&batch_dir, &manifest)?;

    if manifest.restoration_state() == RestorationState::All && !is_archived(&batch_dir) {
        let archive_dir = staging_base(scan_root).join(RESTORED_DIR_NAME);
        fs::create_dir_all(&archive_dir)?;
        fs::rename(&batch_dir, archive_dir.join(&manifest.batch_id))?;
        report.archived = true;
        info!("Batch {} fully restored, archived", manifest.batch_id);
    }

    Ok(report)
}

fn is_archived(batch_dir: &Path) -> bool {
    batch_dir
        .parent()
        .and_then(|p| p.file_name())
        .map(|name| name == RESTORED_DIR_NAME)
        .unwrap_or(false)
}

fn restore_item(staged: &Path, destination: &Path, expected_sha256: &str) -> Result<()> {
    let actual = AudioHasher::compute_file_hash(staged)?;
    if actual != expected_sha256 {
        return Err(Error::Staging(format!(
            "hash mismatch for {}: expected {expected_sha256}, found {actual}",
            staged.display()
        )));
    }
    if destination.exists() {
        return Err(Error::Staging(format!(
            "destination already exists: {}",
            destination.display()
        )));
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    move_file(staged, destination)?;
    Ok(())
}

/// Permanently delete staged batches older than `older_than_days`, or all
/// but the `keep_last` most recent. Archived batches are eligible too.
pub fn empty_batches(
    scan_root: &Path,
    older_than_days: Option<u64>,
    keep_last: Option<usize>,
) -> Result<usize> {
    let mut batches = list_batches(scan_root)?;
    batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut deleted = 0usize;
    for (idx, batch) in batches.iter().enumerate() {
        if let Some(keep) = keep_last {
            if idx < keep {
                continue;
            }
        }
        if let Some(min_age) = older_than_days {
            if (batch.age_days as u64) < min_age {
                continue;
            }
        }
        match fs::remove_dir_all(&batch.path) {
            Ok(()) => {
                deleted += 1;
                info!("Emptied batch {}", batch.batch_id);
            }
            Err(e) => warn!("Could not empty batch {}: {e}", batch.batch_id),
        }
    }
    Ok(deleted)
}

/// Human-readable byte size.
pub fn format_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

/// Rename, falling back to copy-and-delete for cross-device moves.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
