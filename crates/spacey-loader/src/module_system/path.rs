// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lexical path helpers with `path.resolve` semantics
//!
//! None of these touch the filesystem.

use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// `..` above the root of an absolute path is dropped; in a relative path
/// it is kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => continue,
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !path.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Resolve `target` against `base` like `path.resolve(base, target)`.
pub fn resolve_against(base: &Path, target: impl AsRef<Path>) -> PathBuf {
    let target = target.as_ref();
    if target.is_absolute() {
        normalize(target)
    } else {
        normalize(&base.join(target))
    }
}

/// The extension of a path without its leading dot, or an empty string.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The parent directory of a path, or `.` when it has none.
pub fn dirname(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("../a/./b")), PathBuf::from("../a/b"));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_resolve_against() {
        assert_eq!(resolve_against(Path::new("/proj"), "./lib/x"), PathBuf::from("/proj/lib/x"));
        assert_eq!(resolve_against(Path::new("/proj/src"), "../lib"), PathBuf::from("/proj/lib"));
        assert_eq!(resolve_against(Path::new("/proj"), "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_extension_and_dirname() {
        assert_eq!(extension(Path::new("/a/b.data")), "data");
        assert_eq!(extension(Path::new("/a/b")), "");
        assert_eq!(dirname(Path::new("/a/b.js")), PathBuf::from("/a"));
        assert_eq!(dirname(Path::new("b.js")), PathBuf::from("."));
    }
}
