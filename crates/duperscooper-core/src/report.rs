use serde::{Deserialize, Serialize};

use crate::album::matcher::AlbumGroup;
use crate::album::MatchMethod;
use crate::error::Result;
use crate::model::{RecommendedAction, TrackGroup};

/// One track inside a serialized duplicate group. Carries every
/// rule-relevant field so both output shapes round-trip through apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackItemRecord {
    pub path: String,
    pub size: u64,
    pub quality_info: String,
    pub quality_score: f64,
    pub codec: String,
    pub bitrate: Option<u64>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub is_lossless: bool,
    pub similarity_to_best: f64,
    pub is_best: bool,
    pub recommended_action: RecommendedAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackGroupRecord {
    pub group_id: usize,
    pub items: Vec<TrackItemRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackReport {
    pub groups: Vec<TrackGroupRecord>,
    pub total_groups: usize,
    /// Redundant (non-best) members across all groups.
    pub total_duplicates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumItemRecord {
    pub path: String,
    pub track_count: usize,
    pub total_size: u64,
    pub quality_info: String,
    pub quality_avg: bool,
    pub quality_score: f64,
    pub match_percentage: f64,
    pub match_method: Option<MatchMethod>,
    pub confidence: f64,
    pub is_best: bool,
    pub recommended_action: RecommendedAction,
    pub album_identifier: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub mixed_identifiers: bool,
    pub is_partial_match: bool,
    pub overlap_percentage: Option<f64>,
    pub disc_number: Option<u32>,
    pub disc_subtitle: Option<String>,
    pub total_discs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumGroupRecord {
    pub group_id: usize,
    pub matched_album: String,
    pub matched_artist: String,
    pub items: Vec<AlbumItemRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumReport {
    pub groups: Vec<AlbumGroupRecord>,
    pub total_groups: usize,
    pub total_duplicates: usize,
}

impl TrackReport {
    pub fn from_groups(groups: &[TrackGroup]) -> Self {
        let group_records: Vec<TrackGroupRecord> = groups
            .iter()
            .enumerate()
            .map(|(idx, group)| TrackGroupRecord {
                group_id: idx + 1,
                items: group
                    .members
                    .iter()
                    .map(|member| TrackItemRecord {
                        path: member.record.path.to_string_lossy().into_owned(),
                        size: member.record.size,
                        quality_info: member.record.quality_info.clone(),
                        quality_score: member.record.quality_score,
                        codec: member.record.metadata.codec.to_uppercase(),
                        bitrate: member.record.metadata.bitrate,
                        sample_rate: member.record.metadata.sample_rate,
                        bit_depth: member.record.metadata.bit_depth,
                        is_lossless: member.record.metadata.lossless,
                        similarity_to_best: member.similarity_to_best,
                        is_best: member.is_best,
                        recommended_action: member.recommended_action,
                    })
                    .collect(),
            })
            .collect();

        let total_duplicates = group_records
            .iter()
            .map(|g| g.items.len().saturating_sub(1))
            .sum();
        TrackReport {
            total_groups: group_records.len(),
            total_duplicates,
            groups: group_records,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for group in &self.groups {
            for item in &group.items {
                writer.serialize(TrackCsvRow::new(group.group_id, item))?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::Error::ScanResult(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut groups: Vec<TrackGroupRecord> = Vec::new();
        for row in reader.deserialize::<TrackCsvRow>() {
            let row = row?;
            let group_id = row.group_id;
            match groups.iter_mut().find(|g| g.group_id == group_id) {
                Some(group) => group.items.push(row.into_item()),
                None => groups.push(TrackGroupRecord {
                    group_id,
                    items: vec![row.into_item()],
                }),
            }
        }
        let total_duplicates = groups
            .iter()
            .map(|g| g.items.len().saturating_sub(1))
            .sum();
        Ok(TrackReport {
            total_groups: groups.len(),
            total_duplicates,
            groups,
        })
    }
}

impl AlbumReport {
    pub fn from_groups(groups: &[AlbumGroup]) -> Self {
        let group_records: Vec<AlbumGroupRecord> = groups
            .iter()
            .enumerate()
            .map(|(idx, group)| AlbumGroupRecord {
                group_id: idx + 1,
                matched_album: group.matched_album.clone(),
                matched_artist: group.matched_artist.clone(),
                items: group
                    .members
                    .iter()
                    .map(|member| AlbumItemRecord {
                        path: member.album.path.to_string_lossy().into_owned(),
                        track_count: member.album.track_count,
                        total_size: member.album.total_size,
                        quality_info: member.album.quality_info.clone(),
                        quality_avg: member.album.quality_averaged,
                        quality_score: member.album.avg_quality_score,
                        match_percentage: member.match_percentage,
                        match_method: member.album.match_method,
                        confidence: member.confidence,
                        is_best: member.is_best,
                        recommended_action: member.recommended_action,
                        album_identifier: member.album.album_id.clone(),
                        album_name: member.album.album_name.clone(),
                        artist_name: member.album.artist_name.clone(),
                        mixed_identifiers: member.album.mixed_identifiers,
                        is_partial_match: member.album.is_partial_match,
                        overlap_percentage: member.album.overlap_percentage,
                        disc_number: member.album.disc_number,
                        disc_subtitle: member.album.disc_subtitle.clone(),
                        total_discs: member.album.total_discs,
                    })
                    .collect(),
            })
            .collect();

        let total_duplicates = group_records
            .iter()
            .map(|g| g.items.len().saturating_sub(1))
            .sum();
        AlbumReport {
            total_groups: group_records.len(),
            total_duplicates,
            groups: group_records,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for group in &self.groups {
            for item in &group.items {
                writer.serialize(AlbumCsvRow::new(
                    group.group_id,
                    &group.matched_album,
                    &group.matched_artist,
                    item,
                ))?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::Error::ScanResult(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut groups: Vec<AlbumGroupRecord> = Vec::new();
        for row in reader.deserialize::<AlbumCsvRow>() {
            let row = row?;
            let group_id = row.group_id;
            match groups.iter_mut().find(|g| g.group_id == group_id) {
                Some(group) => group.items.push(row.into_item()),
                None => groups.push(AlbumGroupRecord {
                    group_id,
                    matched_album: row.matched_album.clone(),
                    matched_artist: row.matched_artist.clone(),
                    items: vec![row.into_item()],
                }),
            }
        }
        let total_duplicates = groups
            .iter()
            .map(|g| g.items.len().saturating_sub(1))
            .sum();
        Ok(AlbumReport {
            total_groups: groups.len(),
            total_duplicates,
            groups,
        })
    }
}

// Flat tabular rows. The csv crate rejects nested data, so every column is
// spelled out and converted to and from the record types.
#[derive(Debug, Serialize, Deserialize)]
struct TrackCsvRow {
    group_id: usize,
    path: String,
    size: u64,
    quality_info: String,
    quality_score: f64,
    codec: String,
    bitrate: Option<u64>,
    sample_rate: Option<u32>,
    bit_depth: Option<u32>,
    is_lossless: bool,
    similarity_to_best: f64,
    is_best: bool,
    recommended_action: RecommendedAction,
}

impl TrackCsvRow {
    fn new(group_id: usize, item: &TrackItemRecord) -> Self {
        TrackCsvRow {
            group_id,
            path: item.path.clone(),
            size: item.size,
            quality_info: item.quality_info.clone(),
            quality_score: item.quality_score,
            codec: item.codec.clone(),
            bitrate: item.bitrate,
            sample_rate: item.sample_rate,
            bit_depth: item.bit_depth,
            is_lossless: item.is_lossless,
            similarity_to_best: item.similarity_to_best,
            is_best: item.is_best,
            recommended_action: item.recommended_action,
        }
    }

    fn into_item(self) -> TrackItemRecord {
        TrackItemRecord {
            path: self.path,
            size: self.size,
            quality_info: self.quality_info,
            quality_score: self.quality_score,
            codec: self.codec,
            bitrate: self.bitrate,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
            is_lossless: self.is_lossless,
            similarity_to_best: self.similarity_to_best,
            is_best: self.is_best,
            recommended_action: self.recommended_action,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AlbumCsvRow {
    group_id: usize,
    matched_album: String,
    matched_artist: String,
    path: String,
    track_count: usize,
    total_size: u64,
    quality_info: String,
    quality_avg: bool,
    quality_score: f64,
    match_percentage: f64,
    match_method: Option<MatchMethod>,
    confidence: f64,
    is_best: bool,
    recommended_action: RecommendedAction,
    album_identifier: Option<String>,
    album_name: Option<String>,
    artist_name: Option<String>,
    mixed_identifiers: bool,
    is_partial_match: bool,
    overlap_percentage: Option<f64>,
    disc_number: Option<u32>,
    disc_subtitle: Option<String>,
    total_discs: Option<u32>,
}

impl AlbumCsvRow {
    fn new(
        group_id: usize,
        matched_album: &str,
        matched_artist: &str,
        item: &AlbumItemRecord,
    ) -> Self {
        AlbumCsvRow {
            group_id,
            matched_album: matched_album.to_string(),
            matched_artist: matched_artist.to_string(),
            path: item.path.clone(),
            track_count: item.track_count,
            total_size: item.total_size,
            quality_info: item.quality_info.clone(),
            quality_avg: item.quality_avg,
            quality_score: item.quality_score,
            match_percentage: item.match_percentage,
            match_method: item.match_method,
            confidence: item.confidence,
            is_best: item.is_best,
            recommended_action: item.recommended_action,
            album_identifier: item.album_identifier.clone(),
            album_name: item.album_name.clone(),
            artist_name: item.artist_name.clone(),
            mixed_identifiers: item.mixed_identifiers,
            is_partial_match: item.is_partial_match,
            overlap_percentage: item.overlap_percentage,
            disc_number: item.disc_number,
            disc_subtitle: item.disc_subtitle.clone(),
            total_discs: item.total_discs,
        }
    }

    fn into_item(self) -> AlbumItemRecord {
        AlbumItemRecord {
            path: self.path,
            track_count: self.track_count,
            total_size: self.total_size,
            quality_info: self.quality_info,
            quality_avg: self.quality_avg,
            quality_score: self.quality_score,
            match_percentage: self.match_percentage,
            match_method: self.match_method,
            confidence: self.confidence,
            is_best: self.is_best,
            recommended_action: self.recommended_action,
            album_identifier: self.album_identifier,
            album_name: self.album_name,
            artist_name: self.artist_name,
            mixed_identifiers: self.mixed_identifiers,
            is_partial_match: self.is_partial_match,
            overlap_percentage: self.overlap_percentage,
            disc_number: self.disc_number,
            disc_subtitle: self.disc_subtitle,
            total_discs: self.total_discs,
        }
    }
}
