use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use duperscooper_core::album::matcher::MatchStrategy;
use duperscooper_core::config::CacheBackendKind;
use duperscooper_core::Algorithm;

#[derive(Debug, Parser)]
#[command(name = "duperscooper")]
#[command(about = "Find duplicate audio tracks and albums, and remove them safely", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan paths for duplicate tracks or albums
    Scan(ScanArgs),
    /// Apply deletion rules to a saved scan result
    Apply(ApplyArgs),
    /// Inspect and manage staged deletions
    Staging {
        #[command(subcommand)]
        command: StagingCommands,
    },
    /// Inspect and manage the fingerprint cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    Perceptual,
    Exact,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Algorithm {
        match arg {
            AlgorithmArg::Perceptual => Algorithm::Perceptual,
            AlgorithmArg::Exact => Algorithm::Exact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    Sqlite,
    Json,
}

impl From<CacheBackendArg> for CacheBackendKind {
    fn from(arg: CacheBackendArg) -> CacheBackendKind {
        match arg {
            CacheBackendArg::Sqlite => CacheBackendKind::Sqlite,
            CacheBackendArg::Json => CacheBackendKind::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Auto,
    Identifier,
    Fingerprint,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(arg: StrategyArg) -> MatchStrategy {
        match arg {
            StrategyArg::Auto => MatchStrategy::Auto,
            StrategyArg::Identifier => MatchStrategy::Identifier,
            StrategyArg::Fingerprint => MatchStrategy::Fingerprint,
        }
    }
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Files or directories to search
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Find duplicate albums instead of individual tracks
    #[arg(long)]
    pub album_mode: bool,

    /// Matching algorithm: perceptual audio similarity or byte-identical
    #[arg(short = 'a', long, value_enum, default_value_t = AlgorithmArg::Perceptual)]
    pub algorithm: AlgorithmArg,

    /// Minimum similarity percentage for perceptual matching
    #[arg(long, value_name = "PERCENT")]
    pub similarity_threshold: Option<f64>,

    /// Worker threads for fingerprinting (1 = sequential)
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Minimum file size in bytes (0 disables the filter)
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    #[arg(long, value_enum)]
    pub cache_backend: Option<CacheBackendArg>,

    /// Compute every fingerprint from scratch
    #[arg(long)]
    pub no_cache: bool,

    /// Recompute and overwrite cached fingerprints
    #[arg(long)]
    pub update_cache: bool,

    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Album matching strategy (album mode only)
    #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
    pub album_match_strategy: StrategyArg,

    /// Match albums with unequal track counts
    #[arg(long)]
    pub allow_partial_albums: bool,

    /// Minimum track overlap percentage for partial album matches
    #[arg(long, value_name = "PERCENT")]
    pub min_album_overlap: Option<f64>,

    /// Interactively stage duplicates for deletion after the scan
    #[arg(long)]
    pub delete: bool,

    /// Disable progress output
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Scan result file (record JSON or flat CSV)
    pub input: PathBuf,

    /// Built-in strategy: eliminate-duplicates, keep-lossless, keep-format,
    /// custom
    #[arg(long, default_value = "eliminate-duplicates")]
    pub strategy: String,

    /// Format to keep (required by keep-format)
    #[arg(long)]
    pub format: Option<String>,

    /// Rule config file (JSON), required by the custom strategy
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Stage the marked items instead of stopping at the dry-run report
    #[arg(long)]
    pub execute: bool,

    /// Root for the staging directory (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub scan_root: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum StagingCommands {
    /// List deletion batches under a scan root
    List {
        /// Scan root holding the staging directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Restore a batch by UUID, verifying content hashes
    Restore {
        batch_id: String,
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Restore under this root instead of the original locations
        #[arg(long, value_name = "PATH")]
        restore_to: Option<PathBuf>,
        /// Choose individual items to restore
        #[arg(long)]
        interactive: bool,
    },
    /// Permanently delete staged batches
    Empty {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Only delete batches older than this many days
        #[arg(long, value_name = "DAYS")]
        older_than: Option<u64>,
        /// Keep the N most recent batches
        #[arg(long, value_name = "N")]
        keep_last: Option<usize>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Show hit/miss counters and entry count
    Stats,
    /// Remove every cache entry
    Clear,
    /// Remove entries not accessed within the age limit
    Cleanup {
        #[arg(long, default_value_t = 90, value_name = "DAYS")]
        max_age_days: u64,
    },
    /// Import a legacy JSON cache into the SQLite backend
    Migrate,
}
