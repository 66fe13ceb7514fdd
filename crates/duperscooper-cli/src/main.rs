mod commands;
mod logging;
mod progress;
mod render;

use clap::{CommandFactory, Parser};
use dotenv::dotenv;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

use commands::{
    ApplyArgs, CacheCommands, Cli, Commands, OutputFormat, ScanArgs, StagingCommands,
};
use duperscooper_core::album::AlbumScanner;
use duperscooper_core::apply;
use duperscooper_core::cache;
use duperscooper_core::config::{self, AppConfig};
use duperscooper_core::grouper;
use duperscooper_core::report::{AlbumReport, TrackReport};
use duperscooper_core::rules::RuleEngine;
use duperscooper_core::staging;
use duperscooper_core::{
    Algorithm, AudioHasher, Error, ProgressReporter, SilentReporter, TrackScanner,
};
use progress::CliReporter;

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DUPLICATES: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();
    let code = match args.command {
        Some(Commands::Scan(scan_args)) => run_scan(scan_args),
        Some(Commands::Apply(apply_args)) => run_apply(apply_args),
        Some(Commands::Staging { command }) => run_staging(command),
        Some(Commands::Cache { command }) => run_cache(command),
        None => {
            let _ = Cli::command().print_long_help();
            EXIT_OK
        }
    };

    process::exit(code);
}

fn exit_code_for(e: &Error) -> i32 {
    match e {
        Error::Cancelled => EXIT_CANCELLED,
        _ => EXIT_ERROR,
    }
}

fn install_interrupt_handler(flag: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
        eprintln!("\nCancelling, draining in-flight workers...");
    }) {
        warn!("Could not install interrupt handler: {e}");
    }
}

fn load_config_with_overrides(args: &ScanArgs) -> duperscooper_core::Result<AppConfig> {
    let mut config = config::load_configuration()?;
    if let Some(backend) = args.cache_backend {
        config.cache_backend = backend.into();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(threshold) = args.similarity_threshold {
        config.similarity_threshold = config::clamp_threshold(threshold);
    }
    if let Some(min_size) = args.min_size {
        config.min_size = min_size;
    }
    if let Some(overlap) = args.min_album_overlap {
        config.min_album_overlap = overlap;
    }
    Ok(config)
}

/// Root under which the staging directory is created: the first scanned
/// directory, or the parent of a scanned file.
fn scan_root_of(paths: &[PathBuf]) -> PathBuf {
    let first = &paths[0];
    if first.is_dir() {
        first.clone()
    } else {
        first
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn run_scan(args: ScanArgs) -> i32 {
    let config = match load_config_with_overrides(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return EXIT_ERROR;
        }
    };

    let cache = if args.no_cache {
        None
    } else {
        cache::open_cache(&config)
    };
    let hasher = AudioHasher::new(cache, args.update_cache);

    let reporter: Box<dyn ProgressReporter> = if args.no_progress {
        Box::new(SilentReporter)
    } else {
        Box::new(CliReporter::new())
    };

    if args.album_mode {
        run_album_scan(&args, &config, hasher, reporter.as_ref())
    } else {
        run_track_scan(&args, &config, hasher, reporter.as_ref())
    }
}

fn run_track_scan(
    args: &ScanArgs,
    config: &AppConfig,
    hasher: AudioHasher,
    reporter: &dyn ProgressReporter,
) -> i32 {
    let algorithm: Algorithm = args.algorithm.into();
    let scanner = TrackScanner::new(
        hasher,
        algorithm,
        config.min_size,
        config.workers,
        &config.ignore_patterns,
    );
    install_interrupt_handler(scanner.stop_flag());

    let outcome = match scanner.scan(&args.paths, reporter) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e}");
            return exit_code_for(&e);
        }
    };

    let groups = match algorithm {
        Algorithm::Exact => grouper::group_exact(&outcome.tracks),
        Algorithm::Perceptual => {
            grouper::group_fuzzy(&outcome.tracks, config.similarity_threshold, reporter)
        }
    };
    let report = TrackReport::from_groups(&groups);

    match args.output {
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("{e}");
                return EXIT_ERROR;
            }
        },
        OutputFormat::Csv => match report.to_csv() {
            Ok(csv) => print!("{csv}"),
            Err(e) => {
                error!("{e}");
                return EXIT_ERROR;
            }
        },
        OutputFormat::Text => {
            render::print_track_report(&report);
            print_scan_summary(
                outcome.tracks.len(),
                report.total_groups,
                outcome.errors,
                &scanner,
            );
        }
    }

    if args.delete && !report.groups.is_empty() {
        match render::interactive_delete_tracks(&report, &scan_root_of(&args.paths)) {
            Ok(_) => return EXIT_OK,
            Err(e) => {
                error!("{e}");
                return exit_code_for(&e);
            }
        }
    }

    if report.groups.is_empty() {
        EXIT_OK
    } else {
        EXIT_DUPLICATES
    }
}

fn print_scan_summary(files: usize, groups: usize, errors: usize, scanner: &TrackScanner) {
    if let Some(cache) = scanner.hasher().cache() {
        let stats = cache.stats();
        println!(
            "\nFingerprint cache: {} hits, {} misses, {} entries ({})",
            stats.hits, stats.misses, stats.size, stats.backend
        );
    }
    println!("Scanned {files} file(s), {groups} duplicate group(s), {errors} error(s)");
}

fn run_album_scan(
    args: &ScanArgs,
    config: &AppConfig,
    hasher: AudioHasher,
    reporter: &dyn ProgressReporter,
) -> i32 {
    let stop = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(stop.clone());

    let scanner = AlbumScanner::new(&hasher, config.workers, stop);
    let albums = match scanner.scan_albums(&args.paths, reporter) {
        Ok(albums) => albums,
        Err(e) => {
            error!("{e}");
            return exit_code_for(&e);
        }
    };
    let album_count = albums.len();

    let matcher = duperscooper_core::album::matcher::AlbumMatcher::new(
        config.similarity_threshold,
        args.allow_partial_albums,
        config.min_album_overlap,
    );
    let groups = matcher.find_duplicates(albums, args.album_match_strategy.into());
    let report = AlbumReport::from_groups(&groups);

    match args.output {
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("{e}");
                return EXIT_ERROR;
            }
        },
        OutputFormat::Csv => match report.to_csv() {
            Ok(csv) => print!("{csv}"),
            Err(e) => {
                error!("{e}");
                return EXIT_ERROR;
            }
        },
        OutputFormat::Text => {
            render::print_album_report(&report);
            if let Some(cache) = hasher.cache() {
                let stats = cache.stats();
                println!(
                    "\nFingerprint cache: {} hits, {} misses, {} entries ({})",
                    stats.hits, stats.misses, stats.size, stats.backend
                );
            }
            let (album_hits, album_misses) = scanner.album_cache_counts();
            println!("Album cache: {album_hits} hits, {album_misses} misses");
            println!(
                "Scanned {album_count} album(s), {} duplicate group(s), {} error(s)",
                report.total_groups,
                scanner.error_count()
            );
        }
    }

    if args.delete && !report.groups.is_empty() {
        match render::interactive_delete_albums(&report, &scan_root_of(&args.paths)) {
            Ok(_) => return EXIT_OK,
            Err(e) => {
                error!("{e}");
                return exit_code_for(&e);
            }
        }
    }

    if report.groups.is_empty() {
        EXIT_OK
    } else {
        EXIT_DUPLICATES
    }
}

fn run_apply(args: ApplyArgs) -> i32 {
    let loaded = match apply::load_scan_result(&args.input) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            return EXIT_ERROR;
        }
    };

    let engine = match build_engine(&args) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{e}");
            return EXIT_ERROR;
        }
    };

    let plan = match apply::apply_rules(&loaded, &engine) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{e}");
            return EXIT_ERROR;
        }
    };

    println!("{}", apply::render_plan(&plan));

    if !args.execute {
        println!("\nDry run only. Re-run with --execute to stage deletions.");
        return EXIT_OK;
    }

    let delete_count = plan.delete_count();
    if delete_count == 0 {
        println!("\nNothing to delete.");
        return EXIT_OK;
    }

    match render::prompt_confirm(
        &format!("\nStage {delete_count} item(s) for deletion?"),
        Some(false),
    ) {
        Ok(true) => {}
        Ok(false) => {
            println!("Aborted.");
            return EXIT_OK;
        }
        Err(e) => {
            error!("{e}");
            return EXIT_ERROR;
        }
    }

    let scan_root = args.scan_root.clone().unwrap_or_else(|| PathBuf::from("."));
    match apply::execute_plan(&plan, &scan_root) {
        Ok((staged, Some(batch_id))) => {
            println!(
                "Staged {staged} item(s) ({}) in batch {batch_id}",
                staging::format_size(plan.bytes_to_free())
            );
            EXIT_OK
        }
        Ok((_, None)) => {
            println!("Nothing was staged.");
            EXIT_OK
        }
        Err(e) => {
            error!("{e}");
            EXIT_ERROR
        }
    }
}

fn build_engine(args: &ApplyArgs) -> duperscooper_core::Result<RuleEngine> {
    if args.strategy == "custom" {
        let rules_path = args.rules.as_ref().ok_or_else(|| {
            Error::Rules("--rules FILE is required with the custom strategy".to_string())
        })?;
        RuleEngine::load_from_config(rules_path)
    } else {
        let engine = RuleEngine::strategy(&args.strategy, args.format.as_deref())?;
        engine.validate()?;
        Ok(engine)
    }
}

fn run_staging(command: StagingCommands) -> i32 {
    match command {
        StagingCommands::List { path } => match staging::list_batches(&path) {
            Ok(batches) => {
                render::print_batches(&batches);
                EXIT_OK
            }
            Err(e) => {
                error!("{e}");
                EXIT_ERROR
            }
        },
        StagingCommands::Restore {
            batch_id,
            path,
            restore_to,
            interactive,
        } => {
            let selection = if interactive {
                let manifest = match staging::load_manifest(&path, &batch_id) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        error!("{e}");
                        return EXIT_ERROR;
                    }
                };
                match render::select_restore_items(&manifest) {
                    Ok(Some(indices)) => Some(indices),
                    Ok(None) => {
                        println!("Aborted.");
                        return EXIT_OK;
                    }
                    Err(e) => {
                        error!("{e}");
                        return EXIT_ERROR;
                    }
                }
            } else {
                None
            };

            match staging::restore_batch(
                &path,
                &batch_id,
                restore_to.as_deref(),
                selection.as_deref(),
            ) {
                Ok(report) => {
                    println!(
                        "Restored {} item(s), {} failed",
                        report.restored, report.failed
                    );
                    if report.archived {
                        println!("Batch fully restored and archived.");
                    }
                    if report.failed > 0 {
                        EXIT_ERROR
                    } else {
                        EXIT_OK
                    }
                }
                Err(e) => {
                    error!("{e}");
                    EXIT_ERROR
                }
            }
        }
        StagingCommands::Empty {
            path,
            older_than,
            keep_last,
        } => {
            if older_than.is_none() && keep_last.is_none() {
                match render::prompt_confirm(
                    "Permanently delete ALL staged batches?",
                    Some(false),
                ) {
                    Ok(true) => {}
                    Ok(false) => {
                        println!("Aborted.");
                        return EXIT_OK;
                    }
                    Err(e) => {
                        error!("{e}");
                        return EXIT_ERROR;
                    }
                }
            }
            match staging::empty_batches(&path, older_than, keep_last) {
                Ok(deleted) => {
                    println!("Emptied {deleted} batch(es)");
                    EXIT_OK
                }
                Err(e) => {
                    error!("{e}");
                    EXIT_ERROR
                }
            }
        }
    }
}

fn run_cache(command: CacheCommands) -> i32 {
    let config = match config::load_configuration() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return EXIT_ERROR;
        }
    };

    match command {
        CacheCommands::Migrate => {
            let json_path = match cache::default_json_path() {
                Some(path) => path,
                None => {
                    error!("No per-user config directory available");
                    return EXIT_ERROR;
                }
            };
            let db_path = config
                .cache_path
                .clone()
                .or_else(cache::default_sqlite_path)
                .expect("sqlite path follows json path availability");
            match cache::migrate_legacy(&json_path, &db_path) {
                Ok(count) => {
                    println!("Migrated {count} entr(ies) to {}", db_path.display());
                    EXIT_OK
                }
                Err(e) => {
                    error!("{e}");
                    EXIT_ERROR
                }
            }
        }
        other => {
            let cache = match cache::open_cache(&config) {
                Some(cache) => cache,
                None => {
                    error!("Cache is unavailable");
                    return EXIT_ERROR;
                }
            };
            match other {
                CacheCommands::Stats => {
                    let stats = cache.stats();
                    println!(
                        "Cache: {} entries, {} hits, {} misses ({} backend)",
                        stats.size, stats.hits, stats.misses, stats.backend
                    );
                    EXIT_OK
                }
                CacheCommands::Clear => {
                    if cache.clear() {
                        println!("Cache cleared");
                        EXIT_OK
                    } else {
                        error!("Failed to clear cache");
                        EXIT_ERROR
                    }
                }
                CacheCommands::Cleanup { max_age_days } => {
                    let removed = cache.cleanup_old(max_age_days);
                    cache.flush();
                    println!("Removed {removed} entr(ies) older than {max_age_days} day(s)");
                    EXIT_OK
                }
                CacheCommands::Migrate => unreachable!("handled above"),
            }
        }
    }
}
