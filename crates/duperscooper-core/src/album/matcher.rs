use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{consensus, Album, MatchMethod};
use crate::fingerprint::{self, Fingerprint};
use crate::grouper::UnionFind;
use crate::model::RecommendedAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Identifier,
    Fingerprint,
    Auto,
}

/// An album inside a duplicate group, annotated relative to the group.
#[derive(Debug, Clone)]
pub struct AlbumMember {
    pub album: Album,
    /// Mean similarity to the best member; 100 for the best itself and for
    /// identifier-matched members.
    pub match_percentage: f64,
    pub confidence: f64,
    pub is_best: bool,
    pub recommended_action: RecommendedAction,
}

#[derive(Debug, Clone)]
pub struct AlbumGroup {
    pub matched_album: String,
    pub matched_artist: String,
    pub members: Vec<AlbumMember>,
}

impl AlbumGroup {
    pub fn best(&self) -> &AlbumMember {
        &self.members[0]
    }
}

/// Groups albums with identifier, fingerprint and auto strategies.
pub struct AlbumMatcher {
    threshold: f64,
    allow_partial: bool,
    min_overlap: f64,
}

impl AlbumMatcher {
    pub fn new(threshold: f64, allow_partial: bool, min_overlap: f64) -> Self {
        AlbumMatcher {
            threshold: threshold.clamp(0.0, 100.0),
            allow_partial,
            min_overlap,
        }
    }

    pub fn find_duplicates(
        &self,
        mut albums: Vec<Album>,
        strategy: MatchStrategy,
    ) -> Vec<AlbumGroup> {
        let all: Vec<usize> = (0..albums.len()).collect();
        let groups_idx = match strategy {
            MatchStrategy::Identifier => self.match_by_identifier(&mut albums, &all),
            MatchStrategy::Fingerprint => {
                let groups = self.match_by_fingerprints(&albums, &all);
                for group in &groups {
                    for &i in group {
                        albums[i].match_method = Some(MatchMethod::Fingerprint);
                    }
                }
                groups
            }
            MatchStrategy::Auto => self.match_auto(&mut albums),
        };

        if self.allow_partial {
            for group in &groups_idx {
                annotate_partial(&mut albums, group);
            }
        }

        debug!("Album matching produced {} group(s)", groups_idx.len());
        groups_idx
            .into_iter()
            .map(|indices| self.finalize_group(&albums, &indices))
            .collect()
    }

    /// Mean similarity between two albums over positionally paired tracks
    /// (each album's tracks are already filename-sorted). `None` when the
    /// albums are not comparable under the current settings.
    pub fn album_similarity(&self, a: &Album, b: &Album) -> Option<f64> {
        if a.track_count != b.track_count {
            if !self.allow_partial {
                return None;
            }
            let min = a.track_count.min(b.track_count);
            let max = a.track_count.max(b.track_count);
            if min == 0 {
                return None;
            }
            let overlap = min as f64 / max as f64 * 100.0;
            if overlap < self.min_overlap {
                return None;
            }
            return mean_pair_similarity(&a.fingerprints[..min], &b.fingerprints[..min]);
        }
        mean_pair_similarity(&a.fingerprints, &b.fingerprints)
    }

    /// Partition by (identifier, track count). Mixed-identifier albums
    /// never match here; partial mode never relaxes the track-count key.
    fn match_by_identifier(&self, albums: &mut [Album], indices: &[usize]) -> Vec<Vec<usize>> {
        let mut partitions: HashMap<(String, usize), Vec<usize>> = HashMap::new();
        let mut key_order: Vec<(String, usize)> = Vec::new();

        for &i in indices {
            let album = &albums[i];
            if album.mixed_identifiers {
                continue;
            }
            if let Some(id) = &album.album_id {
                let key = (id.clone(), album.track_count);
                let bucket = partitions.entry(key.clone()).or_default();
                if bucket.is_empty() {
                    key_order.push(key);
                }
                bucket.push(i);
            }
        }

        let mut groups = Vec::new();
        for key in key_order {
            let members = &partitions[&key];
            if members.len() >= 2 {
                for &i in members {
                    albums[i].match_method = Some(MatchMethod::Identifier);
                }
                groups.push(members.clone());
            }
        }
        groups
    }

    /// Union–find over pairwise album similarity edges.
    fn match_by_fingerprints(&self, albums: &[Album], indices: &[usize]) -> Vec<Vec<usize>> {
        let n = indices.len();
        if n < 2 {
            return Vec::new();
        }

        let mut uf = UnionFind::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if let Some(sim) = self.album_similarity(&albums[indices[i]], &albums[indices[j]])
                {
                    if sim >= self.threshold {
                        uf.union(i, j);
                    }
                }
            }
        }

        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut root_order = Vec::new();
        for pos in 0..n {
            let root = uf.find(pos);
            let bucket = components.entry(root).or_default();
            if bucket.is_empty() {
                root_order.push(root);
            }
            bucket.push(indices[pos]);
        }

        root_order
            .into_iter()
            .filter_map(|root| {
                let group = &components[&root];
                (group.len() >= 2).then(|| group.clone())
            })
            .collect()
    }

    /// Canonical-first matching: identifier groups, then fingerprint groups
    /// among remaining canonicals, then each non-canonical joins the
    /// candidate group it matches best and inherits its matched names.
    fn match_auto(&self, albums: &mut Vec<Album>) -> Vec<Vec<usize>> {
        let mut canonical = Vec::new();
        let mut untagged = Vec::new();
        for i in 0..albums.len() {
            if albums[i].album_id.is_some() {
                albums[i].match_method = Some(MatchMethod::Identifier);
                canonical.push(i);
            } else if albums[i].is_canonical() {
                albums[i].match_method = Some(MatchMethod::Tags);
                canonical.push(i);
            } else {
                untagged.push(i);
            }
        }
        debug!(
            "{} canonical album(s), {} untagged",
            canonical.len(),
            untagged.len()
        );

        let id_groups = self.match_by_identifier(albums, &canonical);
        let grouped_by_id: HashSet<usize> = id_groups.iter().flatten().copied().collect();

        let remaining: Vec<usize> = canonical
            .iter()
            .copied()
            .filter(|i| !grouped_by_id.contains(i))
            .collect();
        let fp_groups = self.match_by_fingerprints(albums, &remaining);
        let grouped_by_fp: HashSet<usize> = fp_groups.iter().flatten().copied().collect();

        // Candidate groups include lone canonicals so a single canonical
        // album can still anchor untagged duplicates.
        let mut candidates: Vec<Vec<usize>> = id_groups;
        candidates.extend(fp_groups);
        for &i in &remaining {
            if !grouped_by_fp.contains(&i) {
                candidates.push(vec![i]);
            }
        }

        for &u in &untagged {
            let mut best: Option<(usize, f64)> = None;
            for (candidate_idx, group) in candidates.iter().enumerate() {
                let representative = group[0];
                if let Some(sim) = self.album_similarity(&albums[u], &albums[representative]) {
                    if sim >= self.threshold && best.map(|(_, s)| sim > s).unwrap_or(true) {
                        best = Some((candidate_idx, sim));
                    }
                }
            }
            match best {
                Some((candidate_idx, _)) => {
                    albums[u].match_method = Some(MatchMethod::Fingerprint);
                    candidates[candidate_idx].push(u);
                }
                // Unmatched albums seed candidate groups of their own so
                // untagged duplicates of each other still group.
                None => candidates.push(vec![u]),
            }
        }

        candidates.retain(|group| group.len() >= 2);
        candidates
    }

    fn finalize_group(&self, albums: &[Album], indices: &[usize]) -> AlbumGroup {
        let (matched_album, matched_artist) = matched_info(albums, indices);

        let best_idx = *indices
            .iter()
            .max_by(|&&a, &&b| {
                albums[a]
                    .avg_quality_score
                    .partial_cmp(&albums[b].avg_quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| albums[b].path.cmp(&albums[a].path))
            })
            .expect("group is non-empty");
        let best = &albums[best_idx];

        let mut rest: Vec<(f64, usize)> = indices
            .iter()
            .filter(|&&i| i != best_idx)
            .map(|&i| {
                let album = &albums[i];
                let pct = if album.match_method == Some(MatchMethod::Identifier) {
                    100.0
                } else {
                    self.album_similarity(album, best).unwrap_or(0.0)
                };
                (pct, i)
            })
            .collect();
        rest.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| albums[a.1].path.cmp(&albums[b.1].path))
        });

        let mut members = Vec::with_capacity(indices.len());
        members.push(self.build_member(
            albums, indices, best_idx, 100.0, true, &matched_album, &matched_artist,
        ));
        for (pct, i) in rest {
            members.push(self.build_member(
                albums, indices, i, pct, false, &matched_album, &matched_artist,
            ));
        }

        AlbumGroup {
            matched_album,
            matched_artist,
            members,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_member(
        &self,
        albums: &[Album],
        indices: &[usize],
        idx: usize,
        match_percentage: f64,
        is_best: bool,
        matched_album: &str,
        matched_artist: &str,
    ) -> AlbumMember {
        let mut album = albums[idx].clone();
        // Members of an untagged-only group matched acoustically.
        if album.match_method.is_none() {
            album.match_method = Some(MatchMethod::Fingerprint);
        }
        let confidence =
            self.confidence(albums, indices, idx, matched_album, matched_artist);
        AlbumMember {
            album,
            match_percentage,
            confidence,
            is_best,
            recommended_action: if is_best {
                RecommendedAction::Keep
            } else {
                RecommendedAction::Delete
            },
        }
    }

    /// Presentation confidence. Identifier-matched members are pinned at
    /// 100; otherwise 80 base, +5 per matching name (inherited names count
    /// for fingerprint-matched members), plus up to 10 scaled linearly over
    /// the 98–100% mean-similarity range.
    fn confidence(
        &self,
        albums: &[Album],
        indices: &[usize],
        idx: usize,
        matched_album: &str,
        matched_artist: &str,
    ) -> f64 {
        let album = &albums[idx];
        if album.match_method == Some(MatchMethod::Identifier) {
            return 100.0;
        }

        let inherited = album.match_method == Some(MatchMethod::Fingerprint)
            || album.match_method.is_none();
        let mut confidence = 80.0;

        let album_name = album
            .album_name
            .as_deref()
            .or(if inherited { Some(matched_album) } else { None });
        if album_name == Some(matched_album) && !matched_album.is_empty() {
            confidence += 5.0;
        }
        let artist_name = album
            .artist_name
            .as_deref()
            .or(if inherited { Some(matched_artist) } else { None });
        if artist_name == Some(matched_artist) && !matched_artist.is_empty() {
            confidence += 5.0;
        }

        let similarities: Vec<f64> = indices
            .iter()
            .filter(|&&other| other != idx)
            .filter_map(|&other| self.album_similarity(album, &albums[other]))
            .collect();
        if !similarities.is_empty() {
            let avg = similarities.iter().sum::<f64>() / similarities.len() as f64;
            confidence += ((avg - 98.0) / 2.0).clamp(0.0, 1.0) * 10.0;
        }

        confidence.min(100.0)
    }
}

fn mean_pair_similarity(a: &[Option<Fingerprint>], b: &[Option<Fingerprint>]) -> Option<f64> {
    let sims: Vec<f64> = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => fingerprint::similarity(x, y),
            _ => None,
        })
        .collect();
    if sims.is_empty() {
        None
    } else {
        Some(sims.iter().sum::<f64>() / sims.len() as f64)
    }
}

/// Matched album/artist for display: a canonical member's names when one
/// exists (identifier holders first), otherwise tag consensus.
fn matched_info(albums: &[Album], indices: &[usize]) -> (String, String) {
    let canonical = indices
        .iter()
        .find(|&&i| albums[i].album_id.is_some() && !albums[i].mixed_identifiers)
        .or_else(|| {
            indices
                .iter()
                .find(|&&i| albums[i].album_name.is_some() && albums[i].artist_name.is_some())
        });

    if let Some(&i) = canonical {
        return (
            albums[i].album_name.clone().unwrap_or_else(|| "Unknown".to_string()),
            albums[i].artist_name.clone().unwrap_or_else(|| "Unknown".to_string()),
        );
    }

    let album_name = consensus(indices.iter().filter_map(|&i| albums[i].album_name.clone()))
        .unwrap_or_else(|| "Unknown".to_string());
    let artist_name = consensus(indices.iter().filter_map(|&i| albums[i].artist_name.clone()))
        .unwrap_or_else(|| "Unknown".to_string());
    (album_name, artist_name)
}

/// Mark members whose track count differs from the group's most common
/// count, recording their overlap against that reference.
fn annotate_partial(albums: &mut [Album], indices: &[usize]) {
    let reference_count = match consensus(indices.iter().map(|&i| albums[i].track_count)) {
        Some(count) => count,
        None => return,
    };

    for &i in indices {
        let count = albums[i].track_count;
        if count != reference_count && reference_count > 0 {
            let overlap =
                count.min(reference_count) as f64 / count.max(reference_count) as f64 * 100.0;
            albums[i].is_partial_match = true;
            albums[i].overlap_percentage = Some(overlap);
        }
    }
}
