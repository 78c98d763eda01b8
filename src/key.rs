//! Cache key derivation.
//!
//! A key is the caller's prefix followed by the path of the source file
//! relative to the cache's path root, with `/` separators on every platform.
//!
//! # Normalization
//!
//! The relative path is computed lexically: `.` components are dropped and
//! `..` components fold into their parent without touching the filesystem.
//! Each component is converted to NFC so that the NFD names macOS reports and
//! the NFC names other platforms use map to the same key.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use transpile_cache::key::derive_key;
//!
//! let key = derive_key("v1:", Path::new("/repo/src/app/index.js"), Path::new("/repo"));
//! assert_eq!(key, "v1:src/app/index.js");
//! ```

use std::path::{Component, Path};
use unicode_normalization::UnicodeNormalization;

/// Derive the cache key for `path` under `path_root`.
///
/// `prefix` is prepended verbatim; callers sharing one store between logically
/// distinct caches must pick prefixes that do not collide. A relative `path`
/// is taken to be relative to `path_root`.
///
/// Paths outside `path_root` produce leading `..` segments, and `path_root`
/// itself produces an empty relative part (the key equals the prefix).
#[must_use]
pub fn derive_key(prefix: &str, path: &Path, path_root: &Path) -> String {
    let target = if path.is_absolute() {
        lexical_components(path)
    } else {
        lexical_components(&path_root.join(path))
    };
    let root = lexical_components(path_root);

    let mut key = String::with_capacity(prefix.len() + path.as_os_str().len());
    key.push_str(prefix);

    // Different drive prefixes (Windows) have no relative form.
    if root.first() != target.first() {
        key.push_str(&target.join("/"));
        return key;
    }

    let common = root
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let segments: Vec<&str> = std::iter::repeat("..")
        .take(root.len() - common)
        .chain(target[common..].iter().map(String::as_str))
        .collect();

    key.push_str(&segments.join("/"));
    key
}

/// Split a path into normalized components.
///
/// The first element is always the root marker (the drive prefix on Windows,
/// `/` elsewhere) for absolute paths.
fn lexical_components(path: &Path) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut anchored = 0;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().nfc().collect());
                anchored = parts.len();
            }
            Component::RootDir => {
                if anchored == 0 {
                    parts.push("/".to_string());
                }
                anchored = parts.len();
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.len() > anchored && parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else if anchored == 0 {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(name) => {
                parts.push(name.to_string_lossy().nfc().collect());
            }
        }
    }

    parts
}
