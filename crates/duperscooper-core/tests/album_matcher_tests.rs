use std::path::PathBuf;

use duperscooper_core::album::matcher::{AlbumMatcher, MatchStrategy};
use duperscooper_core::album::{Album, MatchMethod};
use duperscooper_core::fingerprint::Fingerprint;
use duperscooper_core::model::RecommendedAction;

fn album(
    path: &str,
    fingerprints: Vec<Vec<u32>>,
    album_id: Option<&str>,
    album_name: Option<&str>,
    artist_name: Option<&str>,
    quality: f64,
) -> Album {
    let track_count = fingerprints.len();
    Album {
        path: PathBuf::from(path),
        tracks: (1..=track_count)
            .map(|i| PathBuf::from(format!("{path}/{i:02}.flac")))
            .collect(),
        track_count,
        album_id: album_id.map(|s| s.to_string()),
        album_name: album_name.map(|s| s.to_string()),
        artist_name: artist_name.map(|s| s.to_string()),
        total_size: 10_000_000,
        avg_quality_score: quality,
        fingerprints: fingerprints
            .into_iter()
            .map(|fp| Some(Fingerprint::new(fp)))
            .collect(),
        mixed_identifiers: false,
        quality_info: "FLAC 44.1kHz 16bit".to_string(),
        quality_averaged: true,
        match_method: None,
        disc_number: None,
        disc_subtitle: None,
        total_discs: None,
        is_partial_match: false,
        overlap_percentage: None,
    }
}

/// Three tracks of 32 words each, every track differing from the all-zero
/// base in `bits_per_track` bits (1024 bits per track total).
fn tracks_with_flipped_bits(bits_per_track: u32) -> Vec<Vec<u32>> {
    let mut track = vec![0u32; 32];
    let mut remaining = bits_per_track;
    let mut word = 0;
    while remaining > 0 {
        let flip = remaining.min(32);
        track[word] = if flip == 32 { u32::MAX } else { (1u32 << flip) - 1 };
        remaining -= flip;
        word += 1;
    }
    vec![track.clone(), track.clone(), track]
}

fn base_tracks() -> Vec<Vec<u32>> {
    tracks_with_flipped_bits(0)
}

#[test]
fn test_identifier_strategy_groups_matching_albums() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let albums = vec![
        album(
            "/music/rip-flac",
            base_tracks(),
            Some("mbid-x"),
            Some("Blue Train"),
            Some("John Coltrane"),
            11_644.1,
        ),
        album(
            "/music/rip-mp3",
            base_tracks(),
            Some("mbid-x"),
            Some("Blue Train"),
            Some("John Coltrane"),
            320.0,
        ),
        album(
            "/music/other",
            base_tracks(),
            Some("mbid-y"),
            Some("Giant Steps"),
            Some("John Coltrane"),
            320.0,
        ),
    ];

    let groups = matcher.find_duplicates(albums, MatchStrategy::Identifier);
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.members.len(), 2);
    assert_eq!(group.matched_album, "Blue Train");
    assert_eq!(group.matched_artist, "John Coltrane");

    // Confidence is pinned at 100 for identifier matches.
    for member in &group.members {
        assert_eq!(member.confidence, 100.0);
        assert_eq!(member.album.match_method, Some(MatchMethod::Identifier));
    }

    let best = group.best();
    assert!(best.is_best);
    assert_eq!(best.album.path, PathBuf::from("/music/rip-flac"));
    assert_eq!(best.recommended_action, RecommendedAction::Keep);
    assert_eq!(group.members[1].recommended_action, RecommendedAction::Delete);
}

#[test]
fn test_identifier_strategy_requires_equal_track_counts() {
    let matcher = AlbumMatcher::new(97.0, true, 70.0);
    let mut four_tracks = base_tracks();
    four_tracks.push(vec![0u32; 32]);

    let albums = vec![
        album("/music/a", base_tracks(), Some("mbid-x"), None, None, 100.0),
        album("/music/b", four_tracks, Some("mbid-x"), None, None, 100.0),
    ];

    // Partial mode never relaxes the identifier partition key.
    let groups = matcher.find_duplicates(albums, MatchStrategy::Identifier);
    assert!(groups.is_empty());
}

#[test]
fn test_mixed_identifiers_never_match_by_identifier() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let mut tainted = album(
        "/music/tainted",
        base_tracks(),
        Some("mbid-x"),
        None,
        None,
        100.0,
    );
    tainted.album_id = None;
    tainted.mixed_identifiers = true;

    let clean = album("/music/clean", base_tracks(), Some("mbid-x"), None, None, 90.0);

    let groups = matcher.find_duplicates(vec![tainted.clone(), clean.clone()], MatchStrategy::Identifier);
    assert!(groups.is_empty());

    // The same pair still groups acoustically.
    let groups = matcher.find_duplicates(vec![tainted, clean], MatchStrategy::Fingerprint);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members.len(), 2);
}

#[test]
fn test_fingerprint_strategy_respects_threshold() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let albums = vec![
        album("/music/a", base_tracks(), None, Some("X"), Some("Y"), 100.0),
        // ~95.3% similar: 48 of 1024 bits differ per track.
        album(
            "/music/b",
            tracks_with_flipped_bits(48),
            None,
            Some("X"),
            Some("Y"),
            90.0,
        ),
    ];

    assert!(matcher
        .find_duplicates(albums.clone(), MatchStrategy::Fingerprint)
        .is_empty());

    let relaxed = AlbumMatcher::new(95.0, false, 70.0);
    assert_eq!(
        relaxed
            .find_duplicates(albums, MatchStrategy::Fingerprint)
            .len(),
        1
    );
}

#[test]
fn test_auto_mode_untagged_album_inherits_canonical_names() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let albums = vec![
        album(
            "/music/canonical-flac",
            base_tracks(),
            Some("mbid-x"),
            Some("Kind of Blue"),
            Some("Miles Davis"),
            11_644.1,
        ),
        album(
            "/music/canonical-mp3",
            base_tracks(),
            Some("mbid-x"),
            Some("Kind of Blue"),
            Some("Miles Davis"),
            320.0,
        ),
        // Untagged rip, ~98.4% similar per track (16 of 1024 bits).
        album(
            "/music/mystery-rip",
            tracks_with_flipped_bits(16),
            None,
            None,
            None,
            256.0,
        ),
    ];

    let groups = matcher.find_duplicates(albums, MatchStrategy::Auto);
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.members.len(), 3);
    assert_eq!(group.matched_album, "Kind of Blue");
    assert_eq!(group.matched_artist, "Miles Davis");

    let untagged = group
        .members
        .iter()
        .find(|m| m.album.path == PathBuf::from("/music/mystery-rip"))
        .unwrap();
    assert_eq!(untagged.album.match_method, Some(MatchMethod::Fingerprint));
    assert!(
        untagged.confidence >= 88.0 && untagged.confidence <= 95.0,
        "confidence {} outside [88, 95]",
        untagged.confidence
    );
    assert!(untagged.match_percentage >= 98.0);
}

#[test]
fn test_auto_mode_single_canonical_anchors_untagged() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let albums = vec![
        album(
            "/music/canonical",
            base_tracks(),
            Some("mbid-x"),
            Some("Aja"),
            Some("Steely Dan"),
            11_644.1,
        ),
        album("/music/untagged", base_tracks(), None, None, None, 320.0),
    ];

    let groups = matcher.find_duplicates(albums, MatchStrategy::Auto);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members.len(), 2);
    assert_eq!(groups[0].matched_album, "Aja");
}

#[test]
fn test_auto_mode_groups_untagged_only_duplicates() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let albums = vec![
        album("/music/rip-1", base_tracks(), None, None, None, 320.0),
        album("/music/rip-2", base_tracks(), None, None, None, 128.0),
    ];

    let groups = matcher.find_duplicates(albums, MatchStrategy::Auto);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members.len(), 2);
    assert_eq!(groups[0].matched_album, "Unknown");
}

#[test]
fn test_partial_mode_matches_albums_with_missing_tracks() {
    let matcher = AlbumMatcher::new(97.0, true, 70.0);

    let full: Vec<Vec<u32>> = (0..10).map(|_| vec![0u32; 32]).collect();
    let missing_two: Vec<Vec<u32>> = (0..8).map(|_| vec![0u32; 32]).collect();

    let albums = vec![
        album("/music/complete", full, None, Some("X"), Some("Y"), 11_644.1),
        album("/music/incomplete", missing_two, None, Some("X"), Some("Y"), 320.0),
    ];

    let groups = matcher.find_duplicates(albums, MatchStrategy::Fingerprint);
    assert_eq!(groups.len(), 1);

    let partial = groups[0]
        .members
        .iter()
        .find(|m| m.album.path == PathBuf::from("/music/incomplete"))
        .unwrap();
    assert!(partial.album.is_partial_match);
    assert_eq!(partial.album.overlap_percentage, Some(80.0));
}

#[test]
fn test_partial_mode_rejects_low_overlap() {
    let matcher = AlbumMatcher::new(97.0, true, 70.0);

    let full: Vec<Vec<u32>> = (0..10).map(|_| vec![0u32; 32]).collect();
    let tiny: Vec<Vec<u32>> = (0..3).map(|_| vec![0u32; 32]).collect();

    let albums = vec![
        album("/music/complete", full, None, None, None, 100.0),
        album("/music/fragment", tiny, None, None, None, 90.0),
    ];

    // 3/10 overlap is below the 70% minimum even though tracks match.
    assert!(matcher
        .find_duplicates(albums, MatchStrategy::Fingerprint)
        .is_empty());
}

#[test]
fn test_best_album_ties_break_lexicographically() {
    let matcher = AlbumMatcher::new(97.0, false, 70.0);
    let albums = vec![
        album("/music/zeta", base_tracks(), Some("mbid-x"), Some("A"), Some("B"), 500.0),
        album("/music/alpha", base_tracks(), Some("mbid-x"), Some("A"), Some("B"), 500.0),
    ];

    let groups = matcher.find_duplicates(albums, MatchStrategy::Identifier);
    assert_eq!(groups[0].best().album.path, PathBuf::from("/music/alpha"));
}
