use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use duperscooper_core::ProgressReporter;

/// CLI progress reporter using indicatif.
///
/// - Discovery: spinner (total unknown upfront)
/// - Fingerprinting: bar with position, total and ETA
/// - Album scan / comparison: bar or spinner
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        CliReporter {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        pb
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_discovery_start(&self) {
        self.set_bar(Self::spinner("Discovering audio files..."));
    }

    fn on_discovery_progress(&self, files_found: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Discovering... {files_found} files found"));
        }
    }

    fn on_discovery_complete(&self, total_files: usize) {
        self.finish_bar();
        eprintln!("  \x1b[32m✓\x1b[0m Discovery complete: {total_files} file(s)");
    }

    fn on_fingerprint_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Fingerprinting [{bar:30.cyan/dim}] {pos}/{len} files {msg}",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_fingerprint_progress(&self, done: usize, _total: usize, eta_secs: Option<u64>) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_position(done as u64);
            if let Some(eta) = eta_secs {
                pb.set_message(format!("({eta}s remaining)"));
            }
        }
    }

    fn on_fingerprint_complete(&self, total: usize, errors: usize) {
        self.finish_bar();
        if errors > 0 {
            eprintln!(
                "  \x1b[32m✓\x1b[0m Fingerprinting complete: {total} file(s), {errors} error(s)"
            );
        } else {
            eprintln!("  \x1b[32m✓\x1b[0m Fingerprinting complete: {total} file(s)");
        }
    }

    fn on_compare_start(&self, total_pairs: usize) {
        self.set_bar(Self::spinner(&format!(
            "Comparing fingerprints ({total_pairs} pairs)..."
        )));
    }

    fn on_compare_complete(&self, groups: usize) {
        self.finish_bar();
        eprintln!("  \x1b[32m✓\x1b[0m Comparison complete: {groups} group(s)");
    }

    fn on_album_scan_progress(&self, done: usize, total: usize) {
        let mut guard = self.bar.lock().unwrap();
        if guard.is_none() {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "  {spinner:.cyan} Scanning albums [{bar:30.cyan/dim}] {pos}/{len}",
                )
                .unwrap()
                .progress_chars("━╸─")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            pb.enable_steady_tick(std::time::Duration::from_millis(80));
            *guard = Some(pb);
        }
        if let Some(pb) = guard.as_ref() {
            pb.set_position(done as u64);
        }
        if done == total {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}
