use colored::*;
use std::io::{self, Write};
use std::path::Path;

use duperscooper_core::error::Result;
use duperscooper_core::report::{AlbumReport, TrackReport};
use duperscooper_core::staging::{self, BatchSummary, Manifest, StagingBatch, StagingMode};

fn similarity_colored(value: f64) -> ColoredString {
    let text = format!("{value:.1}%");
    if value >= 99.0 {
        text.green()
    } else if value >= 95.0 {
        text.yellow()
    } else {
        text.bright_red()
    }
}

pub fn print_track_report(report: &TrackReport) {
    if report.groups.is_empty() {
        println!("No duplicates found.");
        return;
    }

    println!(
        "{}\n",
        format!("Found {} group(s) of duplicate files:", report.total_groups)
            .cyan()
            .bold()
    );

    for group in &report.groups {
        println!("{}", format!("Group {}", group.group_id).cyan().bold());
        let duplicates: Vec<_> = group.items.iter().filter(|i| !i.is_best).collect();

        for item in group.items.iter().filter(|i| i.is_best) {
            println!(
                "  {} {} {} - {}",
                "[Best]".bright_green().bold(),
                item.path,
                format!("({})", staging::format_size(item.size)).dimmed(),
                item.quality_info.bright_green()
            );
        }

        for (idx, item) in duplicates.iter().enumerate() {
            let tree = if idx == duplicates.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "    {tree} {} {} - {} [{} match]",
                item.path,
                format!("({})", staging::format_size(item.size)).dimmed(),
                item.quality_info,
                similarity_colored(item.similarity_to_best)
            );
        }
        println!();
    }
}

pub fn print_album_report(report: &AlbumReport) {
    if report.groups.is_empty() {
        println!("No duplicate albums found.");
        return;
    }

    println!(
        "{}\n",
        format!(
            "Found {} group(s) of duplicate albums:",
            report.total_groups
        )
        .cyan()
        .bold()
    );

    for group in &report.groups {
        println!(
            "{}",
            format!(
                "Group {}: {} by {}",
                group.group_id, group.matched_album, group.matched_artist
            )
            .cyan()
            .bold()
        );

        for item in &group.items {
            let marker = if item.is_best {
                format!("{} ", "[Best]".bright_green().bold())
            } else {
                "  ".to_string()
            };
            println!(
                "{marker}{} {}",
                item.path,
                format!(
                    "({} tracks, {})",
                    item.track_count,
                    staging::format_size(item.total_size)
                )
                .dimmed()
            );

            let suffix = if item.quality_avg { " (avg)" } else { "" };
            println!("    Quality: {}{suffix}", item.quality_info);
            if let Some(method) = item.match_method {
                println!("    Matched by: {method}");
            }
            if item.is_partial_match {
                let overlap = item.overlap_percentage.unwrap_or(0.0);
                println!(
                    "    Match: {} {}",
                    similarity_colored(item.match_percentage),
                    format!("(Partial: {overlap:.1}% overlap)").dimmed()
                );
            } else {
                println!("    Match: {}", similarity_colored(item.match_percentage));
            }
            println!("    Confidence: {:.0}%", item.confidence);
            if let Some(id) = &item.album_identifier {
                println!("    Album ID: {id}");
            }
            if item.album_name.is_some() || item.artist_name.is_some() {
                println!(
                    "    Metadata: {} - {}",
                    item.artist_name.as_deref().unwrap_or("Unknown"),
                    item.album_name.as_deref().unwrap_or("Unknown")
                );
            }
            println!();
        }
    }
}

pub fn print_batches(batches: &[BatchSummary]) {
    if batches.is_empty() {
        println!("No staged deletions.");
        return;
    }

    for batch in batches {
        let archived = if batch.archived { " [archived]" } else { "" };
        println!(
            "{}{archived}",
            format!("Batch {}", batch.batch_id).cyan().bold()
        );
        println!("    Created: {} ({} day(s) ago)", batch.created_at, batch.age_days);
        println!("    Mode: {}", batch.mode);
        println!(
            "    Items: {} ({})",
            batch.item_count,
            staging::format_size(batch.total_size)
        );
        println!("    Restored: {}", batch.restoration);
        println!();
    }
}

pub fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{prompt} (Y/n): "),
            Some(false) | None => print!("{prompt} (y/N): "),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}

fn prompt_indices(prompt: &str) -> io::Result<Option<Vec<usize>>> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim().to_lowercase();

    if trimmed == "q" {
        return Ok(None);
    }
    Ok(Some(
        trimmed
            .split_whitespace()
            .filter_map(|token| token.parse::<usize>().ok())
            .collect(),
    ))
}

/// Walk duplicate groups, letting the operator pick members to stage.
/// All selections land in one batch; returns the staged item count.
pub fn interactive_delete_tracks(report: &TrackReport, scan_root: &Path) -> Result<usize> {
    let mut batch = StagingBatch::create(scan_root, StagingMode::Track)?;
    let mut staged = 0usize;

    'groups: for group in &report.groups {
        println!(
            "\n--- Duplicate Group {}/{} ---",
            group.group_id, report.total_groups
        );
        for (idx, item) in group.items.iter().enumerate() {
            let marker = if item.is_best { " [Best]" } else { "" };
            println!(
                "  [{idx}] {} ({}){marker}",
                item.path,
                staging::format_size(item.size)
            );
        }
        println!("\nEnter number(s) to delete, Enter to skip, 'q' to quit");

        match prompt_indices("Your choice: ")? {
            None => break 'groups,
            Some(indices) => {
                for idx in indices {
                    match group.items.get(idx) {
                        Some(item) => match batch.stage_file(Path::new(&item.path), None) {
                            Ok(()) => {
                                println!("  ✓ Staged: {}", item.path);
                                staged += 1;
                            }
                            Err(e) => println!("  ✗ Failed to stage {}: {e}", item.path),
                        },
                        None => println!("  ✗ Invalid index: {idx}"),
                    }
                }
            }
        }
    }

    if let Some(dir) = batch.finalize()? {
        println!("\nStaged {staged} file(s) in {}", dir.display());
    }
    Ok(staged)
}

pub fn interactive_delete_albums(report: &AlbumReport, scan_root: &Path) -> Result<usize> {
    let mut batch = StagingBatch::create(scan_root, StagingMode::Album)?;
    let mut staged = 0usize;

    'groups: for group in &report.groups {
        println!(
            "\n--- Duplicate Group {}/{}: {} by {} ---",
            group.group_id, report.total_groups, group.matched_album, group.matched_artist
        );
        for (idx, item) in group.items.iter().enumerate() {
            let marker = if item.is_best { " [Best]" } else { "" };
            println!(
                "  [{idx}] {} ({} tracks, {}){marker}",
                item.path,
                item.track_count,
                staging::format_size(item.total_size)
            );
        }
        println!("\nEnter number(s) to delete, Enter to skip, 'q' to quit");

        match prompt_indices("Your choice: ")? {
            None => break 'groups,
            Some(indices) => {
                for idx in indices {
                    match group.items.get(idx) {
                        Some(item) => match batch.stage_album(Path::new(&item.path)) {
                            Ok(count) => {
                                println!("  ✓ Staged: {} ({count} tracks)", item.path);
                                staged += 1;
                            }
                            Err(e) => println!("  ✗ Failed to stage {}: {e}", item.path),
                        },
                        None => println!("  ✗ Invalid index: {idx}"),
                    }
                }
            }
        }
    }

    if let Some(dir) = batch.finalize()? {
        println!("\nStaged {staged} album(s) in {}", dir.display());
    }
    Ok(staged)
}

/// Pick a subset of a batch's unrestored items.
pub fn select_restore_items(manifest: &Manifest) -> io::Result<Option<Vec<usize>>> {
    println!("Items in batch {}:", manifest.batch_id);
    for (idx, item) in manifest.items.iter().enumerate() {
        let state = if item.restored { " (restored)" } else { "" };
        println!("  [{idx}] {}{state}", item.original_path.display());
    }
    println!("\nEnter number(s) to restore, Enter for all, 'q' to cancel");

    match prompt_indices("Your choice: ")? {
        None => Ok(None),
        Some(indices) if indices.is_empty() => {
            Ok(Some((0..manifest.items.len()).collect()))
        }
        Some(indices) => Ok(Some(indices)),
    }
}
