use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::RecommendedAction;
use crate::report::{AlbumItemRecord, AlbumReport, TrackItemRecord, TrackReport};
use crate::rules::{FieldValue, RuleEngine};
use crate::staging::{self, StagingBatch, StagingMode};

/// A scan result loaded back from either serialized shape, with the mode
/// auto-detected.
pub enum LoadedReport {
    Track(TrackReport),
    Album(AlbumReport),
}

impl LoadedReport {
    pub fn mode(&self) -> StagingMode {
        match self {
            LoadedReport::Track(_) => StagingMode::Track,
            LoadedReport::Album(_) => StagingMode::Album,
        }
    }

    pub fn group_count(&self) -> usize {
        match self {
            LoadedReport::Track(report) => report.groups.len(),
            LoadedReport::Album(report) => report.groups.len(),
        }
    }
}

/// Load a serialized scan result from JSON or CSV, detecting the shape and
/// mode from the content.
pub fn load_scan_result(path: &Path) -> Result<LoadedReport> {
    let raw = std::fs::read_to_string(path)?;
    let trimmed = raw.trim_start();

    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let groups = value
            .get("groups")
            .and_then(|g| g.as_array())
            .ok_or_else(|| Error::ScanResult("JSON result must contain 'groups'".to_string()))?;
        let is_album = groups
            .first()
            .map(|g| g.get("matched_album").is_some())
            .unwrap_or(false);
        if is_album {
            Ok(LoadedReport::Album(serde_json::from_value(value)?))
        } else {
            Ok(LoadedReport::Track(serde_json::from_value(value)?))
        }
    } else {
        let header = trimmed
            .lines()
            .next()
            .ok_or_else(|| Error::ScanResult("empty scan result".to_string()))?;
        if header.split(',').any(|col| col == "track_count") {
            Ok(LoadedReport::Album(AlbumReport::from_csv(&raw)?))
        } else if header.split(',').any(|col| col == "similarity_to_best") {
            Ok(LoadedReport::Track(TrackReport::from_csv(&raw)?))
        } else {
            Err(Error::ScanResult(
                "unrecognized scan result format".to_string(),
            ))
        }
    }
}

/// Project the rule-relevant fields out of a track item.
pub fn track_fields(item: &TrackItemRecord) -> HashMap<&'static str, FieldValue> {
    let mut fields = HashMap::new();
    fields.insert("path", FieldValue::Str(item.path.clone()));
    fields.insert("is_best", FieldValue::Bool(item.is_best));
    fields.insert("quality_score", FieldValue::Num(item.quality_score));
    fields.insert("file_size", FieldValue::Num(item.size as f64));
    fields.insert(
        "similarity_to_best",
        FieldValue::Num(item.similarity_to_best),
    );
    fields.insert("is_lossless", FieldValue::Bool(item.is_lossless));
    if !item.codec.is_empty() {
        fields.insert("codec", FieldValue::Str(item.codec.to_uppercase()));
        fields.insert("format", FieldValue::Str(item.codec.to_uppercase()));
    }
    if let Some(bitrate) = item.bitrate {
        fields.insert("bitrate", FieldValue::Num(bitrate as f64 / 1000.0));
    }
    if let Some(sample_rate) = item.sample_rate {
        fields.insert("sample_rate", FieldValue::Num(sample_rate as f64));
    }
    if let Some(bit_depth) = item.bit_depth {
        fields.insert("bit_depth", FieldValue::Num(bit_depth as f64));
    }
    fields
}

/// Project the rule-relevant fields out of an album item. Numeric audio
/// fields are recovered from the aggregate quality string.
pub fn album_fields(item: &AlbumItemRecord) -> HashMap<&'static str, FieldValue> {
    let mut fields = HashMap::new();
    fields.insert("path", FieldValue::Str(item.path.clone()));
    fields.insert("is_best", FieldValue::Bool(item.is_best));
    fields.insert("quality_score", FieldValue::Num(item.quality_score));
    fields.insert("file_size", FieldValue::Num(item.total_size as f64));
    fields.insert("track_count", FieldValue::Num(item.track_count as f64));
    fields.insert("match_percentage", FieldValue::Num(item.match_percentage));
    fields.insert(
        "similarity_to_best",
        FieldValue::Num(item.match_percentage),
    );
    fields.insert(
        "is_lossless",
        FieldValue::Bool(item.quality_score >= 10_000.0),
    );
    if let Some(method) = item.match_method {
        fields.insert("match_method", FieldValue::Str(method.to_string()));
    }
    if let Some(id) = &item.album_identifier {
        fields.insert("album_identifier", FieldValue::Str(id.clone()));
    }
    if let Some(name) = &item.album_name {
        fields.insert("album_name", FieldValue::Str(name.clone()));
    }
    if let Some(artist) = &item.artist_name {
        fields.insert("artist_name", FieldValue::Str(artist.clone()));
    }

    if let Some(format) = Regex::new(r"^([A-Z0-9]+)")
        .ok()
        .and_then(|re| re.find(&item.quality_info))
    {
        fields.insert("format", FieldValue::Str(format.as_str().to_string()));
        fields.insert("codec", FieldValue::Str(format.as_str().to_string()));
    }
    if let Some(kbps) = capture_num(&item.quality_info, r"(\d+)kbps") {
        fields.insert("bitrate", FieldValue::Num(kbps));
    }
    if let Some(khz) = capture_num(&item.quality_info, r"([\d.]+)kHz") {
        fields.insert("sample_rate", FieldValue::Num(khz * 1000.0));
    }
    if let Some(bits) = capture_num(&item.quality_info, r"(\d+)bit") {
        fields.insert("bit_depth", FieldValue::Num(bits));
    }
    fields
}

fn capture_num(text: &str, pattern: &str) -> Option<f64> {
    Regex::new(pattern)
        .ok()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub struct PlanItem {
    pub path: String,
    pub size: u64,
    pub quality_info: String,
    pub is_best: bool,
    pub action: RecommendedAction,
}

#[derive(Debug, Clone)]
pub struct PlanGroup {
    pub group_id: usize,
    pub items: Vec<PlanItem>,
}

#[derive(Debug)]
pub struct DeletionPlan {
    pub mode: StagingMode,
    pub groups: Vec<PlanGroup>,
}

impl DeletionPlan {
    pub fn keep_count(&self) -> usize {
        self.iter_items()
            .filter(|i| i.action == RecommendedAction::Keep)
            .count()
    }

    pub fn delete_count(&self) -> usize {
        self.iter_items()
            .filter(|i| i.action == RecommendedAction::Delete)
            .count()
    }

    pub fn bytes_to_free(&self) -> u64 {
        self.iter_items()
            .filter(|i| i.action == RecommendedAction::Delete)
            .map(|i| i.size)
            .sum()
    }

    fn iter_items(&self) -> impl Iterator<Item = &PlanItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }
}

/// Evaluate the rule engine over a loaded report and produce a keep/delete
/// plan. A configuration that would delete every member of a group is
/// overridden by keeping the best item, with a warning.
pub fn apply_rules(report: &LoadedReport, engine: &RuleEngine) -> Result<DeletionPlan> {
    engine.validate()?;

    let mut groups = Vec::new();
    match report {
        LoadedReport::Track(track_report) => {
            for group in &track_report.groups {
                let items: Vec<PlanItem> = group
                    .items
                    .iter()
                    .map(|item| PlanItem {
                        path: item.path.clone(),
                        size: item.size,
                        quality_info: item.quality_info.clone(),
                        is_best: item.is_best,
                        action: engine.evaluate(&track_fields(item)),
                    })
                    .collect();
                groups.push(PlanGroup {
                    group_id: group.group_id,
                    items,
                });
            }
        }
        LoadedReport::Album(album_report) => {
            for group in &album_report.groups {
                let items: Vec<PlanItem> = group
                    .items
                    .iter()
                    .map(|item| PlanItem {
                        path: item.path.clone(),
                        size: item.total_size,
                        quality_info: item.quality_info.clone(),
                        is_best: item.is_best,
                        action: engine.evaluate(&album_fields(item)),
                    })
                    .collect();
                groups.push(PlanGroup {
                    group_id: group.group_id,
                    items,
                });
            }
        }
    }

    for group in &mut groups {
        enforce_keep_one(group);
    }

    Ok(DeletionPlan {
        mode: report.mode(),
        groups,
    })
}

/// Never mark an entire group for deletion.
fn enforce_keep_one(group: &mut PlanGroup) {
    if group.items.is_empty()
        || group
            .items
            .iter()
            .any(|i| i.action == RecommendedAction::Keep)
    {
        return;
    }

    let keep_idx = group
        .items
        .iter()
        .position(|i| i.is_best)
        .unwrap_or(0);
    group.items[keep_idx].action = RecommendedAction::Keep;
    warn!(
        "Group {} would have lost every member; keeping {}",
        group.group_id, group.items[keep_idx].path
    );
}

/// Render the dry-run deletion report.
pub fn render_plan(plan: &DeletionPlan) -> String {
    let mut lines = Vec::new();
    lines.push("=".repeat(70));
    lines.push("DELETION PLAN".to_string());
    lines.push("=".repeat(70));

    for group in &plan.groups {
        lines.push(format!("\nGroup {}:", group.group_id));
        for item in &group.items {
            let marker = if item.is_best { "[BEST] " } else { "       " };
            let action = match item.action {
                RecommendedAction::Delete => "DELETE",
                RecommendedAction::Keep => "KEEP  ",
            };
            lines.push(format!("  {marker}{action}: {}", item.path));
            if !item.quality_info.is_empty() {
                lines.push(format!("           {}", item.quality_info));
            }
        }
    }

    lines.push(format!("\n{}", "=".repeat(70)));
    lines.push("SUMMARY".to_string());
    lines.push("=".repeat(70));
    lines.push(format!("Items to keep:   {}", plan.keep_count()));
    lines.push(format!("Items to delete: {}", plan.delete_count()));
    lines.push(format!(
        "Space to free:   {}",
        staging::format_size(plan.bytes_to_free())
    ));
    lines.push("=".repeat(70));

    lines.join("\n")
}

/// Execute a plan by staging every marked item into one batch. Returns the
/// staged item count and the batch id, if anything was staged.
pub fn execute_plan(plan: &DeletionPlan, scan_root: &Path) -> Result<(usize, Option<String>)> {
    let mut batch = StagingBatch::create(scan_root, plan.mode)?;
    let mut staged = 0usize;
    let mut failed = 0usize;

    for group in &plan.groups {
        for item in &group.items {
            if item.action != RecommendedAction::Delete {
                continue;
            }
            let path = Path::new(&item.path);
            let result = match plan.mode {
                StagingMode::Track => batch.stage_file(path, None).map(|_| 1),
                StagingMode::Album => batch.stage_album(path),
            };
            match result {
                Ok(_) => staged += 1,
                Err(e) => {
                    warn!("Could not stage {}: {e}", item.path);
                    failed += 1;
                }
            }
        }
    }

    let batch_id = batch.batch_id().to_string();
    let finalized = batch.finalize()?;
    if failed > 0 {
        warn!("{failed} item(s) could not be staged");
    }
    if finalized.is_some() {
        info!("Staged {staged} item(s) in batch {batch_id}");
        Ok((staged, Some(batch_id)))
    } else {
        Ok((staged, None))
    }
}
