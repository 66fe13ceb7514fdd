use std::collections::HashMap;
use tracing::debug;

use crate::fingerprint;
use crate::model::{RecommendedAction, TrackGroup, TrackMember, TrackRecord};
use crate::progress::ProgressReporter;

/// Parent-array union–find with path compression. Nodes are indices into
/// the caller's flat record slice.
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        UnionFind {
            parent: (0..size).collect(),
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    pub fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x != root_y {
            self.parent[root_y] = root_x;
        }
    }
}

/// Partition tracks by exact content hash. O(n); any partition of size ≥ 2
/// becomes a group with all members byte-identical.
pub fn group_exact(records: &[TrackRecord]) -> Vec<TrackGroup> {
    let mut by_hash: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut hash_order: Vec<&str> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let bucket = by_hash.entry(record.content_hash.as_str()).or_default();
        if bucket.is_empty() {
            hash_order.push(record.content_hash.as_str());
        }
        bucket.push(idx);
    }

    let mut groups = Vec::new();
    for hash in hash_order {
        let indices = &by_hash[hash];
        if indices.len() < 2 {
            continue;
        }
        // Byte-identical members are trivially 100% similar.
        groups.push(annotate_group(records, indices, |_, _| 100.0));
    }

    debug!("Exact grouping found {} group(s)", groups.len());
    groups
}

/// All-pairs fuzzy grouping: pairs whose Hamming similarity over the common
/// fingerprint prefix meets the threshold induce union–find edges; connected
/// components of size ≥ 2 become groups. Tracks without a fingerprint do not
/// participate.
pub fn group_fuzzy(
    records: &[TrackRecord],
    threshold: f64,
    reporter: &dyn ProgressReporter,
) -> Vec<TrackGroup> {
    let eligible: Vec<usize> = (0..records.len())
        .filter(|&i| {
            records[i]
                .fingerprint
                .as_ref()
                .map(|fp| !fp.is_empty())
                .unwrap_or(false)
        })
        .collect();

    let n = eligible.len();
    if n == 0 {
        return Vec::new();
    }

    reporter.on_compare_start(n * (n - 1) / 2);

    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let fp_a = records[eligible[i]].fingerprint.as_ref().unwrap();
            let fp_b = records[eligible[j]].fingerprint.as_ref().unwrap();
            // Pairs with an empty common prefix have undefined similarity
            // and never form an edge.
            if let Some(sim) = fingerprint::similarity(fp_a, fp_b) {
                if sim >= threshold {
                    uf.union(i, j);
                }
            }
        }
    }

    // Collect components in first-seen discovery order.
    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut root_order: Vec<usize> = Vec::new();
    for (pos, &record_idx) in eligible.iter().enumerate() {
        let root = uf.find(pos);
        let bucket = components.entry(root).or_default();
        if bucket.is_empty() {
            root_order.push(root);
        }
        bucket.push(record_idx);
    }

    let mut groups = Vec::new();
    for root in root_order {
        let indices = &components[&root];
        if indices.len() < 2 {
            continue;
        }
        groups.push(annotate_group(records, indices, |best, member| {
            fingerprint::similarity(
                best.fingerprint.as_ref().unwrap(),
                member.fingerprint.as_ref().unwrap(),
            )
            .unwrap_or(0.0)
        }));
    }

    reporter.on_compare_complete(groups.len());
    debug!("Fuzzy grouping found {} group(s)", groups.len());
    groups
}

/// Build an annotated group from record indices: best = max quality score
/// with lexicographic-path tie-break, non-best members sorted by descending
/// similarity to best (ties lexicographic), actions keep/delete.
fn annotate_group(
    records: &[TrackRecord],
    indices: &[usize],
    similarity_to: impl Fn(&TrackRecord, &TrackRecord) -> f64,
) -> TrackGroup {
    let best_idx = *indices
        .iter()
        .max_by(|&&a, &&b| {
            records[a]
                .quality_score
                .partial_cmp(&records[b].quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                // On equal quality the lexicographically smaller path wins.
                .then_with(|| records[b].path.cmp(&records[a].path))
        })
        .expect("group indices are non-empty");
    let best = &records[best_idx];

    let mut rest: Vec<(f64, usize)> = indices
        .iter()
        .filter(|&&i| i != best_idx)
        .map(|&i| (similarity_to(best, &records[i]), i))
        .collect();
    rest.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| records[a.1].path.cmp(&records[b.1].path))
    });

    let mut members = Vec::with_capacity(indices.len());
    members.push(TrackMember {
        record: best.clone(),
        similarity_to_best: 100.0,
        is_best: true,
        recommended_action: RecommendedAction::Keep,
    });
    for (similarity, idx) in rest {
        members.push(TrackMember {
            record: records[idx].clone(),
            similarity_to_best: similarity,
            is_best: false,
            recommended_action: RecommendedAction::Delete,
        });
    }

    TrackGroup { members }
}
