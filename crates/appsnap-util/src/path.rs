//! Path utilities.
//!
//! This module provides utilities for working with file paths.

use std::path::{Component, Path, PathBuf};

/// Get the appsnap configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/appsnap` if set
/// - `~/.config/appsnap` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("appsnap"))
}

/// Get the appsnap data directory.
///
/// This follows XDG conventions:
/// - `$XDG_DATA_HOME/appsnap` if set
/// - `~/.local/share/appsnap` otherwise
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("appsnap"))
}

/// Default parent directory for app working directories.
pub fn apps_dir() -> Option<PathBuf> {
    data_dir().map(|p| p.join("apps"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Join a relative path onto a base, preventing path traversal.
///
/// Returns `None` for absolute paths or paths that would escape the base.
pub fn safe_join(base: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return None;
    }

    let mut depth: usize = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => depth = depth.checked_sub(1)?,
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if depth == 0 {
        return None;
    }

    Some(normalize(&base.join(path)))
}

/// Render a relative path with forward slashes, regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a caller supplied relative path into forward-slash form.
///
/// Backslashes are treated as separators and leading `./` is dropped.
pub fn normalize_relative(path: &str) -> String {
    let unified = path.replace('\\', "/");
    to_slash(&normalize(Path::new(&unified)))
}
