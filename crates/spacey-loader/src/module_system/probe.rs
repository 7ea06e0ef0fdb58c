// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Filesystem resolution probe
//!
//! Turns a candidate path into the concrete file to load:
//!
//! 1. relative specifiers are resolved against the base directory
//!    (a `file://` base is treated as its parent directory)
//! 2. an existing regular file is returned as-is
//! 3. an existing directory is probed for `index.<ext>`
//! 4. a missing path is probed for `<path>.<ext>`
//! 5. otherwise the resolved path comes back unchanged
//!
//! The probe never fails; callers decide what a missing file means.

use crate::module_system::path::{dirname, resolve_against};
use crate::module_system::specifier::file_url_to_path;
use std::path::{Path, PathBuf};

/// Directory the probe resolves relative specifiers against.
pub fn base_directory(base: &str) -> PathBuf {
    if base.starts_with("file://") {
        match file_url_to_path(base) {
            Ok(path) => dirname(&path),
            Err(_) => PathBuf::from(base),
        }
    } else {
        PathBuf::from(base)
    }
}

/// Find the concrete file for `specifier` relative to `base`.
pub fn find(base: &str, specifier: &str, extensions: &[String]) -> PathBuf {
    let path = resolve_against(&base_directory(base), specifier);

    if path.is_file() {
        return path;
    }

    if path.is_dir() {
        if let Some(index) = probe_index(&path, extensions) {
            return index;
        }
    } else if let Some(found) = probe_extensions(&path, extensions) {
        return found;
    }

    path
}

/// First `index.<ext>` inside `dir`, in extension order.
fn probe_index(dir: &Path, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("index.{}", ext)))
        .find(|candidate| candidate.is_file())
}

/// First `<path>.<ext>` that exists, in extension order.
fn probe_extensions(path: &Path, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| {
            let mut candidate = path.as_os_str().to_os_string();
            candidate.push(".");
            candidate.push(ext);
            PathBuf::from(candidate)
        })
        .find(|candidate| candidate.exists())
}
