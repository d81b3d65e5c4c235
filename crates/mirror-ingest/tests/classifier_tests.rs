//! Classification of export rows into active items and deleted ids

mod common;

use common::{export_csv, ids, row, write_export};
use mirror_ingest::classifier::Classifier;
use std::collections::HashSet;
use tempfile::TempDir;

const STATIC: &str = "https://static.example";

#[test]
fn test_rows_split_into_active_and_deleted() {
    let export = export_csv(&[row("1", "jpg", false), row("2", "jpg", true), row("3", "txt", false)]);

    let info = Classifier::new(STATIC)
        .classify_reader(export.as_bytes(), &HashSet::new())
        .expect("classify");

    assert_eq!(info.active.keys().cloned().collect::<HashSet<_>>(), ids(&["1"]));
    assert_eq!(info.deleted, ids(&["2"]));
    assert_eq!(info.stats.unsupported, 1);
}

#[test]
fn test_checkpointed_ids_are_never_reemitted() {
    let export = export_csv(&[row("1", "jpg", false), row("2", "jpg", true), row("3", "txt", false)]);

    let info = Classifier::new(STATIC)
        .classify_reader(export.as_bytes(), &ids(&["1"]))
        .expect("classify");

    assert!(info.active.is_empty());
    assert_eq!(info.deleted, ids(&["2"]));
    assert_eq!(info.stats.already_processed, 1);
}

#[test]
fn test_unsupported_extensions_are_dropped_even_when_deleted() {
    let export = export_csv(&[
        row("10", "swf", false),
        row("11", "swf", true),
        row("12", "zip", true),
        row("13", "webm", true),
        row("14", "mp4", false),
        row("15", "gif", false),
    ]);

    let info = Classifier::new(STATIC)
        .classify_reader(export.as_bytes(), &HashSet::new())
        .expect("classify");

    for dropped in ["10", "11", "12"] {
        assert!(!info.active.contains_key(dropped));
        assert!(!info.deleted.contains(dropped));
    }
    assert_eq!(info.deleted, ids(&["13"]));
    assert_eq!(info.active.len(), 2);
    assert_eq!(info.stats.unsupported, 3);
}

#[test]
fn test_active_items_point_at_sharded_previews() {
    let export = export_csv(&[row("42", "png", false)]);

    let info = Classifier::new(STATIC)
        .classify_reader(export.as_bytes(), &HashSet::new())
        .expect("classify");

    let item = &info.active["42"];
    let hash = item.hash.as_str();
    assert_eq!(
        item.url,
        format!("{}/data/preview/{}/{}/{}.jpg", STATIC, &hash[0..2], &hash[2..4], hash)
    );
}

#[test]
fn test_classify_path_reads_export_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_export(&dir, &[row("1", "jpg", false), row("2", "png", false)]);

    let info = Classifier::new(STATIC)
        .classify_path(&path, &HashSet::new())
        .expect("classify");
    assert_eq!(info.active.len(), 2);
    assert_eq!(info.stats.rows, 2);
}

#[test]
fn test_missing_export_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let result = Classifier::new(STATIC).classify_path(&dir.path().join("nope.csv"), &HashSet::new());
    assert!(result.is_err());
}
