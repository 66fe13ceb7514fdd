/// Trait for reporting scan progress.
///
/// The CLI implements this with indicatif bars; library consumers and tests
/// use [`SilentReporter`]. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_discovery_start(&self) {}
    fn on_discovery_progress(&self, _files_found: usize) {}
    fn on_discovery_complete(&self, _total_files: usize) {}
    fn on_fingerprint_start(&self, _total_files: usize) {}
    fn on_fingerprint_progress(&self, _done: usize, _total: usize, _eta_secs: Option<u64>) {}
    fn on_fingerprint_complete(&self, _total: usize, _errors: usize) {}
    fn on_compare_start(&self, _total_pairs: usize) {}
    fn on_compare_complete(&self, _groups: usize) {}
    fn on_album_scan_progress(&self, _done: usize, _total: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
