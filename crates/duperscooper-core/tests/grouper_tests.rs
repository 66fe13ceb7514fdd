use std::path::PathBuf;

use duperscooper_core::fingerprint::{similarity, Fingerprint};
use duperscooper_core::grouper::{group_exact, group_fuzzy};
use duperscooper_core::hasher::AudioMetadata;
use duperscooper_core::model::{RecommendedAction, TrackRecord};
use duperscooper_core::SilentReporter;

fn track(path: &str, hash: &str, fingerprint: Option<Vec<u32>>, quality: f64) -> TrackRecord {
    TrackRecord {
        path: PathBuf::from(path),
        size: 1_000_000,
        content_hash: hash.to_string(),
        fingerprint: fingerprint.map(Fingerprint::new),
        metadata: AudioMetadata::default(),
        quality_score: quality,
        quality_info: String::new(),
    }
}

/// A fingerprint differing from the all-zero base in `bits` bits.
fn with_flipped_bits(words: usize, bits: u32) -> Vec<u32> {
    let mut values = vec![0u32; words];
    let mut remaining = bits;
    let mut word = 0;
    while remaining > 0 {
        let flip = remaining.min(32);
        values[word] = if flip == 32 { u32::MAX } else { (1u32 << flip) - 1 };
        remaining -= flip;
        word += 1;
    }
    values
}

#[test]
fn test_exact_grouping_partitions_by_hash() {
    let records = vec![
        track("/music/a.mp3", "same", None, 128.0),
        track("/music/b.mp3", "same", None, 128.0),
        track("/music/c.mp3", "other", None, 128.0),
    ];

    let groups = group_exact(&records);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);

    let paths: Vec<_> = groups[0]
        .members
        .iter()
        .map(|m| m.record.path.to_string_lossy().into_owned())
        .collect();
    assert!(paths.contains(&"/music/a.mp3".to_string()));
    assert!(paths.contains(&"/music/b.mp3".to_string()));
    assert!(!paths.contains(&"/music/c.mp3".to_string()));
}

#[test]
fn test_exact_group_members_are_fully_similar() {
    let records = vec![
        track("/music/a.mp3", "same", None, 128.0),
        track("/music/b.mp3", "same", None, 128.0),
    ];
    let groups = group_exact(&records);
    for member in &groups[0].members {
        assert_eq!(member.similarity_to_best, 100.0);
    }
}

#[test]
fn test_group_of_one_is_never_emitted() {
    let records = vec![
        track("/music/a.mp3", "h1", Some(vec![1, 2, 3]), 128.0),
        track("/music/b.mp3", "h2", Some(vec![u32::MAX; 3]), 128.0),
    ];
    assert!(group_exact(&records).is_empty());
    assert!(group_fuzzy(&records, 97.0, &SilentReporter).is_empty());
}

#[test]
fn test_fuzzy_groups_similar_fingerprints() {
    // 1024 bits per fingerprint; 5 flipped bits ≈ 99.5% similar.
    let base = vec![0u32; 32];
    let near = with_flipped_bits(32, 5);
    let far = vec![u32::MAX; 32];

    let records = vec![
        track("/music/flac.flac", "h1", Some(base), 11_644.1),
        track("/music/mp3.mp3", "h2", Some(near), 320.0),
        track("/music/unrelated.mp3", "h3", Some(far), 320.0),
    ];

    let groups = group_fuzzy(&records, 97.0, &SilentReporter);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);

    let best = groups[0].best();
    assert!(best.is_best);
    assert_eq!(best.record.path, PathBuf::from("/music/flac.flac"));
    assert_eq!(best.recommended_action, RecommendedAction::Keep);
    assert_eq!(
        groups[0].members[1].recommended_action,
        RecommendedAction::Delete
    );
    assert!(groups[0].members[1].similarity_to_best > 99.0);
}

#[test]
fn test_threshold_100_requires_zero_hamming_distance() {
    let base = vec![7u32; 16];
    let one_bit_off = {
        let mut values = vec![7u32; 16];
        values[0] ^= 1;
        values
    };

    let records = vec![
        track("/a.flac", "h1", Some(base.clone()), 100.0),
        track("/b.flac", "h2", Some(one_bit_off), 100.0),
        track("/c.flac", "h3", Some(base), 90.0),
    ];

    let groups = group_fuzzy(&records, 100.0, &SilentReporter);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    let paths: Vec<_> = groups[0].members.iter().map(|m| &m.record.path).collect();
    assert!(paths.contains(&&PathBuf::from("/a.flac")));
    assert!(paths.contains(&&PathBuf::from("/c.flac")));
}

#[test]
fn test_fingerprints_of_different_lengths_compare_over_prefix() {
    let records = vec![
        track("/short.flac", "h1", Some(vec![3, 3]), 100.0),
        track("/long.flac", "h2", Some(vec![3, 3, 0xFFFF_FFFF]), 90.0),
    ];

    let groups = group_fuzzy(&records, 100.0, &SilentReporter);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[test]
fn test_tracks_without_fingerprints_are_excluded() {
    let records = vec![
        track("/ok-1.flac", "h1", Some(vec![1, 1]), 100.0),
        track("/ok-2.flac", "h2", Some(vec![1, 1]), 90.0),
        track("/failed.flac", "h3", None, 95.0),
    ];

    let groups = group_fuzzy(&records, 97.0, &SilentReporter);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(groups[0]
        .members
        .iter()
        .all(|m| m.record.path != PathBuf::from("/failed.flac")));
}

#[test]
fn test_best_selection_prefers_quality_then_path() {
    let records = vec![
        track("/z/copy.flac", "h", Some(vec![1]), 11_644.1),
        track("/a/copy.flac", "h", Some(vec![1]), 11_644.1),
        track("/m/copy.mp3", "h2", Some(vec![1]), 320.0),
    ];

    let groups = group_fuzzy(&records, 97.0, &SilentReporter);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    // Equal quality: the lexicographically smaller path wins.
    assert_eq!(groups[0].best().record.path, PathBuf::from("/a/copy.flac"));
}

#[test]
fn test_non_best_sorted_by_similarity_descending() {
    let base = vec![0u32; 32];
    let close = with_flipped_bits(32, 2);
    let farther = with_flipped_bits(32, 20);

    let records = vec![
        track("/best.flac", "h1", Some(base), 11_644.1),
        track("/farther.mp3", "h2", Some(farther), 128.0),
        track("/close.mp3", "h3", Some(close), 128.0),
    ];

    let groups = group_fuzzy(&records, 97.0, &SilentReporter);
    assert_eq!(groups.len(), 1);
    let members = &groups[0].members;
    assert_eq!(members[1].record.path, PathBuf::from("/close.mp3"));
    assert_eq!(members[2].record.path, PathBuf::from("/farther.mp3"));
    assert!(members[1].similarity_to_best >= members[2].similarity_to_best);
}

#[test]
fn test_similarity_properties_hold_for_arbitrary_pairs() {
    let a = Fingerprint::new(vec![0xDEAD_BEEF, 0x0102_0304, 42]);
    let b = Fingerprint::new(vec![0xDEAD_0000, 0x0102_0304]);

    assert_eq!(similarity(&a, &a), Some(100.0));
    assert_eq!(similarity(&a, &b), similarity(&b, &a));
}
