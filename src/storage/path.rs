//! Path helpers for the on-disk layout
//!
//! Every operation that needs to find an existing record or collection goes
//! through [`resolve_record_path`], so the bare-name and `.json`-suffixed
//! spellings of a key resolve the same way everywhere.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Extension used for record files
pub const RECORD_EXTENSION: &str = "json";

/// Lexically cleans a path without touching the filesystem.
///
/// Drops `.` segments, folds `..` into a preceding normal segment and
/// strips trailing separators. `..` directly under the root stays at the
/// root; leading `..` segments of a relative path are kept. An empty result
/// becomes `.`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }

    out
}

/// Normalizes a collection or resource key to `/`-separated segments.
///
/// `.` segments and redundant separators are dropped, so `users`, `users/`
/// and `./users` all name the same key. Keys that could leave the store
/// root (absolute paths, drive prefixes, `..`) are rejected with the reason.
/// The result may be empty.
pub fn normalize_key(key: &str) -> Result<String, &'static str> {
    let mut segments = Vec::new();

    for component in Path::new(key).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => return Err("must not contain '..'"),
            Component::RootDir | Component::Prefix(_) => return Err("must be a relative path"),
        }
    }

    Ok(segments.join("/"))
}

/// Appends `.json` to the full path (never replaces an existing extension)
pub fn with_json_suffix(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(RECORD_EXTENSION);
    PathBuf::from(raw)
}

/// Path of the record file for `resource` inside a collection directory
pub fn record_path(collection_dir: &Path, resource: &str) -> PathBuf {
    with_json_suffix(&collection_dir.join(resource))
}

/// Sibling temp file a record is staged in before the rename
pub fn temp_path(record: &Path) -> PathBuf {
    let mut raw = record.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}

/// Finds the existing file or directory for `base`.
///
/// Checks `base` as given first, then `base` with `.json` appended.
/// Returns `None` when neither exists.
pub fn resolve_record_path(base: &Path) -> Option<PathBuf> {
    if base.exists() {
        return Some(base.to_path_buf());
    }

    let suffixed = with_json_suffix(base);
    suffixed.exists().then_some(suffixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn normalize_drops_cur_dir_and_folds_parents() {
        assert_eq!(normalize_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("./db/")), PathBuf::from("db"));
        assert_eq!(normalize_path(Path::new("a/b/../../..")), PathBuf::from(".."));
    }

    #[test]
    fn normalize_empty_and_dot() {
        assert_eq!(normalize_path(Path::new("")), PathBuf::from("."));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[cfg(unix)]
    #[test]
    fn normalize_parent_of_root_is_root() {
        assert_eq!(normalize_path(Path::new("/../tmp/db")), PathBuf::from("/tmp/db"));
        assert_eq!(normalize_path(Path::new("/tmp//db/")), PathBuf::from("/tmp/db"));
    }

    #[test]
    fn key_spellings_normalize_together() {
        assert_eq!(normalize_key("users").unwrap(), "users");
        assert_eq!(normalize_key("users/").unwrap(), "users");
        assert_eq!(normalize_key("./users").unwrap(), "users");
        assert_eq!(normalize_key("users//admins/.").unwrap(), "users/admins");
        assert_eq!(normalize_key("john.json").unwrap(), "john.json");
        assert_eq!(normalize_key("./").unwrap(), "");
    }

    #[test]
    fn keys_escaping_the_root_are_rejected() {
        assert!(normalize_key("../secret").is_err());
        assert!(normalize_key("users/../../secret").is_err());
        assert!(normalize_key("/etc/passwd").is_err());
    }

    #[test]
    fn suffix_is_appended_not_replaced() {
        assert_eq!(
            with_json_suffix(Path::new("users/john.smith")),
            PathBuf::from("users/john.smith.json")
        );
        assert_eq!(
            record_path(Path::new("db/users"), "john"),
            PathBuf::from("db/users/john.json")
        );
        assert_eq!(
            temp_path(Path::new("db/users/john.json")),
            PathBuf::from("db/users/john.json.tmp")
        );
    }

    #[test]
    fn resolve_prefers_bare_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("john.json"), "{}").unwrap();

        let bare = dir.path().join("john.json");
        assert_eq!(resolve_record_path(&bare), Some(bare.clone()));
    }

    #[test]
    fn resolve_falls_back_to_suffixed_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("john.json"), "{}").unwrap();

        assert_eq!(
            resolve_record_path(&dir.path().join("john")),
            Some(dir.path().join("john.json"))
        );
    }

    #[test]
    fn resolve_finds_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("users")).unwrap();

        assert_eq!(
            resolve_record_path(&dir.path().join("users")),
            Some(dir.path().join("users"))
        );
    }

    #[test]
    fn resolve_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_record_path(&dir.path().join("nobody")), None);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(segments in prop::collection::vec(
            prop::sample::select(vec!["a", "b", ".", "..", "c"]),
            0..8,
        )) {
            let raw = segments.join("/");
            let once = normalize_path(Path::new(&raw));
            let twice = normalize_path(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
