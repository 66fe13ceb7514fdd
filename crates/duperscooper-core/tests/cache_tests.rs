use tempfile::tempdir;

use duperscooper_core::cache::{
    migrate_legacy, CachedAlbum, FingerprintCache, JsonCache, SqliteCache,
};
use duperscooper_core::fingerprint::Fingerprint;

fn fp(values: &[u32]) -> Fingerprint {
    Fingerprint::new(values.to_vec())
}

#[test]
fn test_sqlite_set_then_get_roundtrip() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();

    let fingerprint = fp(&[1, 2, 3, 4]);
    cache.set("hash-a", &fingerprint, "chromaprint");
    assert_eq!(cache.get("hash-a"), Some(fingerprint));
}

#[test]
fn test_sqlite_get_nonexistent() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();
    assert_eq!(cache.get("missing"), None);
}

#[test]
fn test_sqlite_set_is_idempotent() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();

    let fingerprint = fp(&[9, 8, 7]);
    cache.set("hash-a", &fingerprint, "chromaprint");
    cache.set("hash-a", &fingerprint, "chromaprint");
    assert_eq!(cache.get("hash-a"), Some(fingerprint));
    assert_eq!(cache.stats().size, 1);
}

#[test]
fn test_sqlite_stats_track_hits_and_misses() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.size, 0);
    assert_eq!(stats.backend, "sqlite");

    cache.set("k1", &fp(&[1]), "chromaprint");
    cache.set("k2", &fp(&[2]), "chromaprint");

    cache.get("nope");
    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 2);

    cache.get("k1");
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_sqlite_clear() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();

    cache.set("k1", &fp(&[1]), "chromaprint");
    cache.set("k2", &fp(&[2]), "chromaprint");
    assert!(cache.clear());

    let stats = cache.stats();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
}

#[test]
fn test_sqlite_persists_across_instances() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("test.db");

    {
        let cache = SqliteCache::open(&db_path).unwrap();
        cache.set("k1", &fp(&[5, 6]), "chromaprint");
    }

    let cache = SqliteCache::open(&db_path).unwrap();
    assert_eq!(cache.get("k1"), Some(fp(&[5, 6])));
}

#[test]
fn test_sqlite_cleanup_old() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();

    // Entries stamped in 1970 are well past any cutoff.
    cache.set_with_timestamps("old", &fp(&[1]), "chromaprint", Some(0), Some(0));
    cache.set("fresh", &fp(&[2]), "chromaprint");

    let removed = cache.cleanup_old(90);
    assert_eq!(removed, 1);
    assert_eq!(cache.get("old"), None);
    assert!(cache.get("fresh").is_some());
}

#[test]
fn test_sqlite_concurrent_readers_and_writer() {
    let tmp = tempdir().unwrap();
    let cache = std::sync::Arc::new(SqliteCache::open(&tmp.path().join("test.db")).unwrap());

    let mut handles = Vec::new();
    for worker in 0..4u32 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25u32 {
                let key = format!("w{worker}-{i}");
                cache.set(&key, &Fingerprint::new(vec![worker, i]), "chromaprint");
                assert_eq!(cache.get(&key), Some(Fingerprint::new(vec![worker, i])));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.stats().size, 100);
}

#[test]
fn test_album_cache_roundtrip() {
    let tmp = tempdir().unwrap();
    let cache = SqliteCache::open(&tmp.path().join("test.db")).unwrap();

    let album = CachedAlbum {
        track_count: 2,
        album_id: Some("mbid-1".to_string()),
        album_name: Some("Blue Train".to_string()),
        artist_name: Some("John Coltrane".to_string()),
        total_size: 123_456,
        avg_quality_score: 11_644.1,
        quality_info: "FLAC 44.1kHz 16bit".to_string(),
        mixed_identifiers: false,
        disc_number: Some(1),
        disc_subtitle: None,
        total_discs: Some(1),
        directory_mtime: 1_700_000_000,
        tracks: vec![
            ("/music/blue-train/01.flac".to_string(), "aaa".to_string()),
            ("/music/blue-train/02.flac".to_string(), "bbb".to_string()),
        ],
    };

    cache.set_album("/music/blue-train", &album);
    let loaded = cache.get_album("/music/blue-train").unwrap();
    assert_eq!(loaded, album);

    assert!(cache.clear_albums());
    assert!(cache.get_album("/music/blue-train").is_none());
}

#[test]
fn test_json_set_then_get_and_persistence() {
    let tmp = tempdir().unwrap();
    let json_path = tmp.path().join("hashes.json");

    {
        let cache = JsonCache::open(&json_path).unwrap();
        cache.set("k1", &fp(&[1, 2]), "chromaprint");
        assert_eq!(cache.get("k1"), Some(fp(&[1, 2])));
        cache.flush();
    }

    let cache = JsonCache::open(&json_path).unwrap();
    assert_eq!(cache.get("k1"), Some(fp(&[1, 2])));
    assert_eq!(cache.stats().backend, "json");
}

#[test]
fn test_json_accepts_legacy_bare_entries() {
    let tmp = tempdir().unwrap();
    let json_path = tmp.path().join("hashes.json");
    std::fs::write(&json_path, r#"{"legacy-hash": "3:10,20,30"}"#).unwrap();

    let cache = JsonCache::open(&json_path).unwrap();
    assert_eq!(cache.get("legacy-hash"), Some(fp(&[10, 20, 30])));
}

#[test]
fn test_json_clear_removes_file() {
    let tmp = tempdir().unwrap();
    let json_path = tmp.path().join("hashes.json");

    let cache = JsonCache::open(&json_path).unwrap();
    cache.set("k1", &fp(&[1]), "chromaprint");
    cache.flush();
    assert!(json_path.exists());

    assert!(cache.clear());
    assert!(!json_path.exists());
    assert_eq!(cache.stats().size, 0);
}

#[test]
fn test_migrate_legacy_json_to_sqlite() {
    let tmp = tempdir().unwrap();
    let json_path = tmp.path().join("hashes.json");
    let db_path = tmp.path().join("fingerprints.db");

    std::fs::write(
        &json_path,
        r#"{
            "h1": "2:1,2",
            "h2": {"fingerprint": "1:42", "algorithm": "chromaprint",
                   "created_at": 1000, "last_accessed": 2000},
            "junk": "not a fingerprint"
        }"#,
    )
    .unwrap();

    let migrated = migrate_legacy(&json_path, &db_path).unwrap();
    assert_eq!(migrated, 2);

    let cache = SqliteCache::open(&db_path).unwrap();
    assert_eq!(cache.get("h1"), Some(fp(&[1, 2])));
    assert_eq!(cache.get("h2"), Some(fp(&[42])));
    assert_eq!(cache.get("junk"), None);
}

#[test]
fn test_migrate_missing_json_is_a_noop() {
    let tmp = tempdir().unwrap();
    let migrated = migrate_legacy(
        &tmp.path().join("nope.json"),
        &tmp.path().join("fingerprints.db"),
    )
    .unwrap();
    assert_eq!(migrated, 0);
}
