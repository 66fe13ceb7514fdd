use std::fs;
use std::path::Path;
use tempfile::tempdir;

use duperscooper_core::staging::{
    self, RestorationState, StagingBatch, StagingMode, RESTORED_DIR_NAME, STAGING_DIR_NAME,
};

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_stage_and_restore_roundtrip() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let keep = root.join("album/song.flac");
    let dupe_a = root.join("album/song.mp3");
    let dupe_b = root.join("backup/song.mp3");
    write_file(&keep, b"flac bytes");
    write_file(&dupe_a, b"mp3 bytes a");
    write_file(&dupe_b, b"mp3 bytes b");

    let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    batch.stage_file(&dupe_a, None).unwrap();
    batch.stage_file(&dupe_b, None).unwrap();
    let batch_id = batch.batch_id().to_string();
    let batch_dir = batch.finalize().unwrap().unwrap();

    // The live tree keeps only the best file.
    assert!(keep.exists());
    assert!(!dupe_a.exists());
    assert!(!dupe_b.exists());
    assert!(batch_dir.join("manifest").exists());

    let batches = staging::list_batches(&root).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].batch_id, batch_id);
    assert_eq!(batches[0].item_count, 2);
    assert_eq!(batches[0].mode, StagingMode::Track);
    assert_eq!(batches[0].restoration, RestorationState::None);
    assert_eq!(batches[0].total_size, 22);

    let report = staging::restore_batch(&root, &batch_id, None, None).unwrap();
    assert_eq!(report.restored, 2);
    assert_eq!(report.failed, 0);
    assert!(report.archived);

    // Bit-identical content is back at the original paths.
    assert_eq!(fs::read(&dupe_a).unwrap(), b"mp3 bytes a");
    assert_eq!(fs::read(&dupe_b).unwrap(), b"mp3 bytes b");

    // The batch moved into the archive.
    assert!(!root.join(STAGING_DIR_NAME).join(&batch_id).exists());
    assert!(root
        .join(STAGING_DIR_NAME)
        .join(RESTORED_DIR_NAME)
        .join(&batch_id)
        .exists());
}

#[test]
fn test_empty_batch_leaves_nothing_behind() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    fs::create_dir_all(&root).unwrap();

    let batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    assert!(batch.finalize().unwrap().is_none());
    assert!(staging::list_batches(&root).unwrap().is_empty());
}

#[test]
fn test_restore_detects_tampered_content() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let target = root.join("song.mp3");
    write_file(&target, b"original bytes");

    let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    batch.stage_file(&target, None).unwrap();
    let batch_id = batch.batch_id().to_string();
    let batch_dir = batch.finalize().unwrap().unwrap();

    // Corrupt the staged copy.
    fs::write(batch_dir.join("song.mp3"), b"tampered bytes").unwrap();

    let report = staging::restore_batch(&root, &batch_id, None, None).unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.failed, 1);
    assert!(!report.archived);
    assert!(!target.exists());

    // The batch stays in place with the manifest untouched for that item.
    let manifest = staging::load_manifest(&root, &batch_id).unwrap();
    assert!(!manifest.items[0].restored);
    assert_eq!(manifest.restoration_state(), RestorationState::None);
}

#[test]
fn test_restore_never_overwrites_existing_target() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let target = root.join("song.mp3");
    write_file(&target, b"staged away");

    let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    batch.stage_file(&target, None).unwrap();
    let batch_id = batch.batch_id().to_string();
    batch.finalize().unwrap();

    // Something new appeared at the original path.
    write_file(&target, b"newcomer");

    let report = staging::restore_batch(&root, &batch_id, None, None).unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(fs::read(&target).unwrap(), b"newcomer");
}

#[test]
fn test_partial_restore_by_selection() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let first = root.join("a.mp3");
    let second = root.join("b.mp3");
    write_file(&first, b"first");
    write_file(&second, b"second");

    let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    batch.stage_file(&first, None).unwrap();
    batch.stage_file(&second, None).unwrap();
    let batch_id = batch.batch_id().to_string();
    batch.finalize().unwrap();

    let report = staging::restore_batch(&root, &batch_id, None, Some(&[0])).unwrap();
    assert_eq!(report.restored, 1);
    assert!(!report.archived);
    assert!(first.exists());
    assert!(!second.exists());

    let batches = staging::list_batches(&root).unwrap();
    assert_eq!(batches[0].restoration, RestorationState::Partial);

    // Restoring the rest archives the batch.
    let report = staging::restore_batch(&root, &batch_id, None, None).unwrap();
    assert_eq!(report.restored, 1);
    assert!(report.archived);
    assert!(second.exists());
}

#[test]
fn test_restore_to_alternate_root() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let target = root.join("album/song.mp3");
    write_file(&target, b"bytes");

    let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    batch.stage_file(&target, None).unwrap();
    let batch_id = batch.batch_id().to_string();
    batch.finalize().unwrap();

    let alternate = tmp.path().join("rescued");
    let report = staging::restore_batch(&root, &batch_id, Some(&alternate), None).unwrap();
    assert_eq!(report.restored, 1);
    assert!(alternate.join("album/song.mp3").exists());
    assert!(!target.exists());
}

#[test]
fn test_stage_album_moves_directory_contents() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let album_dir = root.join("worse-rip");
    write_file(&album_dir.join("01.mp3"), b"one");
    write_file(&album_dir.join("02.mp3"), b"two");

    let mut batch = StagingBatch::create(&root, StagingMode::Album).unwrap();
    let staged = batch.stage_album(&album_dir).unwrap();
    assert_eq!(staged, 2);
    let batch_id = batch.batch_id().to_string();
    batch.finalize().unwrap();

    // The emptied album directory is gone.
    assert!(!album_dir.exists());

    let report = staging::restore_batch(&root, &batch_id, None, None).unwrap();
    assert_eq!(report.restored, 2);
    assert!(album_dir.join("01.mp3").exists());
    assert!(album_dir.join("02.mp3").exists());
}

#[test]
fn test_empty_batches_respects_keep_last() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");

    for i in 0..3 {
        let file = root.join(format!("file-{i}.mp3"));
        write_file(&file, b"bytes");
        let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
        batch.stage_file(&file, None).unwrap();
        batch.finalize().unwrap();
        // Distinct creation timestamps for a stable newest-first order.
        std::thread::sleep(std::time::Duration::from_millis(1100));
    }

    let deleted = staging::empty_batches(&root, None, Some(2)).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(staging::list_batches(&root).unwrap().len(), 2);
}

#[test]
fn test_empty_batches_respects_age_filter() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("music");
    let file = root.join("file.mp3");
    write_file(&file, b"bytes");

    let mut batch = StagingBatch::create(&root, StagingMode::Track).unwrap();
    batch.stage_file(&file, None).unwrap();
    batch.finalize().unwrap();

    // A fresh batch is younger than any cutoff.
    assert_eq!(staging::empty_batches(&root, Some(30), None).unwrap(), 0);
    assert_eq!(staging::empty_batches(&root, Some(0), None).unwrap(), 1);
    assert!(staging::list_batches(&root).unwrap().is_empty());
}
