use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;
use transpile_cache::store::DB_FILE_NAME;
use transpile_cache::{Cache, CacheConfig, CacheError, CacheFile};

#[test]
fn test_corrupted_store_is_rebuilt() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(DB_FILE_NAME),
        b"this is definitely not a sqlite database, just garbage bytes",
    )
    .unwrap();

    let cache = Cache::new(CacheConfig::new("/project").with_dir(dir.path()))
        .expect("a corrupt store should be discarded and recreated");

    assert_eq!(cache.get_code("/project/a.js"), None);
    cache.update("/project/a.js", &CacheFile::new("1", "a", json!({})));
    assert_eq!(cache.get_code("/project/a.js").as_deref(), Some("a"));
    cache.settle();
}

#[test]
fn test_relative_path_root_is_a_construction_error() {
    let dir = tempdir().unwrap();
    let err = Cache::new(CacheConfig::new(Path::new("not/absolute")).with_dir(dir.path()))
        .unwrap_err();
    assert!(matches!(err, CacheError::RelativePathRoot(ref p) if p == Path::new("not/absolute")));
}

#[cfg(unix)]
#[test]
fn test_store_dir_that_is_a_file_fails_to_open() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"file, not a directory").unwrap();

    let err = Cache::new(CacheConfig::new("/project").with_dir(&blocker)).unwrap_err();
    assert!(matches!(err, CacheError::CreateDir { .. }));
}
