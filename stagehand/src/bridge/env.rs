//! Child environment: make sure tools see the same toolchain we run under.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Returns `current` with `exe_dir` prepended unless it is already listed.
///
/// `None` means the search path should be left untouched.
#[must_use]
pub fn prepend_search_path(current: Option<OsString>, exe_dir: Option<&Path>) -> Option<OsString> {
    let Some(dir) = exe_dir.filter(|d| !d.as_os_str().is_empty()) else {
        return current;
    };

    let existing: Vec<PathBuf> = current
        .as_ref()
        .filter(|p| !p.is_empty())
        .map(|p| env::split_paths(p).collect())
        .unwrap_or_default();

    if existing.iter().any(|p| p == dir) {
        return current;
    }

    let joined = std::iter::once(dir.to_path_buf()).chain(existing);
    env::join_paths(joined).ok().or(current)
}

/// `PATH` value for spawned tools, derived from this process.
#[must_use]
pub fn child_search_path() -> Option<OsString> {
    let exe = env::current_exe().ok();
    let exe_dir = exe.as_deref().and_then(Path::parent);
    prepend_search_path(env::var_os("PATH"), exe_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepends_missing_dir() {
        let out = prepend_search_path(Some("/usr/bin:/bin".into()), Some(Path::new("/opt/sh/bin")));
        assert_eq!(out, Some(OsString::from("/opt/sh/bin:/usr/bin:/bin")));
    }

    #[test]
    fn test_keeps_existing_dir() {
        let out = prepend_search_path(Some("/usr/bin:/opt/sh/bin".into()), Some(Path::new("/opt/sh/bin")));
        assert_eq!(out, Some(OsString::from("/usr/bin:/opt/sh/bin")));
    }

    #[test]
    fn test_empty_path_becomes_exe_dir() {
        let out = prepend_search_path(Some(OsString::new()), Some(Path::new("/opt/sh/bin")));
        assert_eq!(out, Some(OsString::from("/opt/sh/bin")));

        let out = prepend_search_path(None, Some(Path::new("/opt/sh/bin")));
        assert_eq!(out, Some(OsString::from("/opt/sh/bin")));
    }

    #[test]
    fn test_no_exe_dir_leaves_path() {
        assert_eq!(prepend_search_path(Some("/bin".into()), None), Some(OsString::from("/bin")));
        assert_eq!(prepend_search_path(None, None), None);
    }

    #[test]
    fn test_child_search_path_contains_exe_dir() {
        let exe = env::current_exe().unwrap();
        let dir = exe.parent().unwrap();
        let path = child_search_path().unwrap();
        assert!(env::split_paths(&path).any(|p| p == dir));
    }
}
