use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fingerprint::Fingerprint;
use crate::hasher::AudioMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Keep,
    Delete,
}

/// Immutable per-file record produced by the track scanner.
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub path: PathBuf,
    pub size: u64,
    /// SHA-256 of the file bytes.
    pub content_hash: String,
    /// Present in perceptual mode; exact mode reuses the content hash.
    pub fingerprint: Option<Fingerprint>,
    pub metadata: AudioMetadata,
    pub quality_score: f64,
    pub quality_info: String,
}

/// A member of a duplicate group, annotated relative to the group's best.
#[derive(Debug, Clone)]
pub struct TrackMember {
    pub record: TrackRecord,
    pub similarity_to_best: f64,
    pub is_best: bool,
    pub recommended_action: RecommendedAction,
}

/// A set of at least two tracks asserted equivalent. The best member
/// (highest quality score, ties by lexicographic path) comes first.
#[derive(Debug, Clone)]
pub struct TrackGroup {
    pub members: Vec<TrackMember>,
}

impl TrackGroup {
    pub fn best(&self) -> &TrackMember {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of a track scan: records in discovery order plus the per-file
/// error tally.
#[derive(Debug)]
pub struct ScanOutcome {
    pub tracks: Vec<TrackRecord>,
    pub errors: usize,
}
