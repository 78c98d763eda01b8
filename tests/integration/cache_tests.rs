use std::path::Path;
use std::sync::Arc;
use std::thread;

use serde_json::json;
use tempfile::tempdir;
use transpile_cache::clock::{FixedClock, DAY_MS};
use transpile_cache::{Cache, CacheConfig, CacheFile};

use super::common::Lines;

const T0: u64 = 1_700_000_000_000;

fn config(root: &str, store: &Path) -> CacheConfig {
    CacheConfig::new(root)
        .with_prefix("test:")
        .with_dir(store)
        .with_clock(Arc::new(FixedClock(T0)))
}

#[test]
fn test_round_trip() {
    let dir = tempdir().unwrap();
    let cache = Cache::new(config("/project", dir.path())).unwrap();
    let path = Path::new("/project/src/components/button.tsx");
    let map = json!({
        "version": 3,
        "sources": ["button.tsx"],
        "names": [],
        "mappings": ";;AAAA,SAAS"
    });

    cache.update(path, &CacheFile::new("1699999999000", "export const Button = 1;", map.clone()));

    assert_eq!(cache.get_mtime(path).as_deref(), Some("1699999999000"));
    assert_eq!(cache.get_code(path).as_deref(), Some("export const Button = 1;"));
    assert_eq!(cache.get_source_map(path).unwrap(), Some(map));
    cache.settle();
}

#[test]
fn test_update_overwrites_every_namespace() {
    let dir = tempdir().unwrap();
    let cache = Cache::new(config("/project", dir.path())).unwrap();
    let path = Path::new("/project/a.js");

    cache.update(path, &CacheFile::new("1", "old", json!({"v": 1})));
    cache.update(path, &CacheFile::new("2", "new", json!({"v": 2})));

    assert_eq!(cache.get_mtime(path).as_deref(), Some("2"));
    assert_eq!(cache.get_code(path).as_deref(), Some("new"));
    assert_eq!(cache.get_source_map(path).unwrap(), Some(json!({"v": 2})));
    cache.settle();
}

#[test]
fn test_misses_are_absent() {
    let dir = tempdir().unwrap();
    let cache = Cache::new(config("/project", dir.path())).unwrap();
    let path = Path::new("/project/never/written.js");

    assert_eq!(cache.get_code(path), None);
    assert_eq!(cache.get_mtime(path), None);
    assert_eq!(cache.get_source_map(path).unwrap(), None);
}

#[test]
fn test_entries_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = Path::new("/project/lib/index.js");
    {
        let cache = Cache::new(config("/project", dir.path())).unwrap();
        cache.update(path, &CacheFile::new("7", "module.exports = 7;", json!({})));
        cache.close();
    }

    let cache = Cache::new(config("/project", dir.path())).unwrap();
    assert_eq!(cache.get_code(path).as_deref(), Some("module.exports = 7;"));
    cache.settle();
}

#[test]
fn test_same_relative_path_under_different_roots_shares_entry() {
    let dir = tempdir().unwrap();
    let a = Cache::new(config("/checkout-a", dir.path())).unwrap();
    let b = Cache::new(config("/checkout-b", dir.path())).unwrap();

    a.update("/checkout-a/src/x.js", &CacheFile::new("1", "x", json!({})));
    assert_eq!(b.get_code("/checkout-b/src/x.js").as_deref(), Some("x"));
    b.settle();
}

#[test]
fn test_diagnostic_lines_for_update_and_reads() {
    let dir = tempdir().unwrap();
    let lines = Lines::default();
    let cache = Cache::new(config("/project", dir.path()).with_log(lines.clone())).unwrap();
    let path = Path::new("/project/a.js");

    assert!(cache.get_code(path).is_none());
    cache.update(path, &CacheFile::new("1", "a", json!({})));
    assert!(cache.get_code(path).is_some());
    cache.settle();

    let text = lines.text();
    assert!(text.contains("MISS  [codes]  test:a.js\n"));
    assert!(text.contains("PUT  [mtimes]  test:a.js\n"));
    assert!(text.contains("PUT  [codes]  test:a.js\n"));
    assert!(text.contains("PUT  [sourceMaps]  test:a.js\n"));
    assert!(text.contains("HIT  [codes]  test:a.js\n"));
    // one atime write from update, one from the hit
    assert_eq!(text.matches("PUT  [atimes]  test:a.js\n").count(), 2);
}

#[test]
fn test_miss_does_not_touch_atimes() {
    let dir = tempdir().unwrap();
    let lines = Lines::default();
    let cache = Cache::new(config("/project", dir.path()).with_log(lines.clone())).unwrap();

    assert!(cache.get_code("/project/none.js").is_none());
    cache.settle();
    assert!(!lines.text().contains("[atimes]"));
}

#[test]
fn test_concurrent_updates_and_reads() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(Cache::new(config("/project", dir.path())).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..25 {
                    let path = format!("/project/t{}/f{}.js", t, i);
                    cache.update(&path, &CacheFile::new(i.to_string(), format!("code {}", i), json!({"i": i})));
                    assert_eq!(cache.get_code(&path), Some(format!("code {}", i)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    cache.settle();

    assert_eq!(cache.get_mtime("/project/t7/f24.js").as_deref(), Some("24"));
    assert_eq!(
        cache.get_source_map("/project/t3/f10.js").unwrap(),
        Some(json!({"i": 10}))
    );
    cache.settle();
}

#[test]
fn test_two_handles_on_one_directory() {
    let dir = tempdir().unwrap();
    let writer = Cache::new(config("/project", dir.path())).unwrap();
    let reader = Cache::new(config("/project", dir.path())).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = format!("/project/w{}.js", i);
            (path, CacheFile::new("1", format!("w{}", i), json!(null)))
        })
        .collect();

    thread::scope(|s| {
        s.spawn(|| {
            for (path, file) in &handles {
                writer.update(path, file);
            }
        });
        s.spawn(|| {
            for (path, _) in &handles {
                // may or may not see the write yet
                let _ = reader.get_code(path);
            }
        });
    });

    for (path, file) in &handles {
        assert_eq!(reader.get_code(path).as_deref(), Some(file.code.as_str()));
    }
    reader.settle();
    writer.settle();
}

#[test]
fn test_access_token_comes_from_injected_clock() {
    let dir = tempdir().unwrap();
    let cache = Cache::new(config("/project", dir.path())).unwrap();
    assert_eq!(cache.access_token(), T0.to_string());

    let later = Cache::new(
        config("/project", dir.path()).with_clock(Arc::new(FixedClock(T0 + DAY_MS))),
    )
    .unwrap();
    assert_eq!(later.access_token(), (T0 + DAY_MS).to_string());
}
