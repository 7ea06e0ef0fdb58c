// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host runtime terminal handler
//!
//! [`NativeHost`] reproduces the host's own resolution for everything the
//! engine passes through: built-in modules, `file://` URLs, relative paths
//! and bare package names looked up in `node_modules` directories.

use super::builtins;
use super::hooks::{LoadOutput, NextLoad, NextResolve};
use super::path::{dirname, resolve_against};
use super::probe::base_directory;
use super::specifier::{
    LoadContext, ModuleFormat, ResolveContext, Resolution, file_url_to_path, path_to_file_url,
    strip_query,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The final stage of every hook chain
pub trait HostRuntime: NextResolve + NextLoad {
    /// Whether `specifier` names a built-in module
    fn is_builtin(&self, specifier: &str) -> bool;
}

/// Minimal package.json structure for resolution
#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    main: Option<String>,
    #[serde(rename = "type")]
    module_type: Option<String>,
}

fn read_package_json(dir: &Path) -> Option<PackageJson> {
    let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}

/// Host resolution and loading backed by the local filesystem
#[derive(Debug, Clone)]
pub struct NativeHost {
    cwd: PathBuf,
    extensions: Vec<String>,
}

impl NativeHost {
    /// Create a host rooted at `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            extensions: ["js", "mjs", "cjs", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Parse a package specifier into name and optional subpath
    fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
        if let Some(scoped) = specifier.strip_prefix('@') {
            // @scope/name or @scope/name/subpath
            if let Some(slash) = scoped.find('/') {
                let after_scope = &scoped[slash + 1..];
                if let Some(sub) = after_scope.find('/') {
                    let name_end = slash + 2 + sub;
                    return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
                }
            }
            (specifier, None)
        } else {
            match specifier.split_once('/') {
                Some((name, sub)) => (name, Some(sub)),
                None => (specifier, None),
            }
        }
    }

    fn with_extensions(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        self.extensions.iter().find_map(|ext| {
            let mut candidate = path.as_os_str().to_os_string();
            candidate.push(".");
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            candidate.is_file().then_some(candidate)
        })
    }

    /// package.json `main`, then `index.<ext>`
    fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(main) = read_package_json(dir).and_then(|pkg| pkg.main) {
            let main_path = resolve_against(dir, &main);
            if let Some(found) = self.with_extensions(&main_path) {
                return Some(found);
            }
            if main_path.is_dir() {
                if let Some(found) = self.index_of(&main_path) {
                    return Some(found);
                }
            }
        }
        self.index_of(dir)
    }

    fn index_of(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("index.{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    /// Find a bare package by walking `node_modules` directories upward
    pub fn resolve_package(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        let (name, subpath) = Self::parse_package_specifier(specifier);

        let mut current = Some(from_dir);
        while let Some(dir) = current {
            let package = dir.join("node_modules").join(name);
            if package.exists() {
                let found = match subpath {
                    Some(sub) => {
                        let full = package.join(sub);
                        self.with_extensions(&full)
                            .or_else(|| full.is_dir().then(|| self.resolve_directory(&full)).flatten())
                    }
                    None => self.resolve_directory(&package),
                };
                if found.is_some() {
                    return found;
                }
            }
            current = dir.parent();
        }
        None
    }

    /// Module format of a file on disk
    ///
    /// `.js` follows the `type` field of the nearest package.json.
    pub fn format_of(&self, path: &Path) -> ModuleFormat {
        if let Some(format) = ModuleFormat::from_path(path) {
            return format;
        }

        let mut current = path.parent();
        while let Some(dir) = current {
            if let Some(pkg) = read_package_json(dir) {
                return ModuleFormat::from_package_type(pkg.module_type.as_deref());
            }
            current = dir.parent();
        }
        ModuleFormat::CommonJs
    }

    fn file_resolution(&self, path: PathBuf) -> Result<Resolution> {
        Ok(Resolution {
            url: path_to_file_url(&path)?,
            builtin: false,
            file: path.is_file(),
            format: Some(self.format_of(&path)),
        })
    }
}

impl Default for NativeHost {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

#[async_trait]
impl NextResolve for NativeHost {
    async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
        let bare = strip_query(specifier);

        if builtins::is_builtin(bare) {
            let name = bare.strip_prefix("node:").unwrap_or(bare);
            return Ok(Resolution {
                url: format!("node:{}", name),
                builtin: true,
                file: false,
                format: Some(ModuleFormat::Builtin),
            });
        }

        if specifier.starts_with("file://") {
            let path = file_url_to_path(bare)?;
            return Ok(Resolution {
                url: specifier.to_string(),
                builtin: false,
                file: path.is_file(),
                format: Some(self.format_of(&path)),
            });
        }

        let parent = parent_directory(context.parent_url.as_deref(), &self.cwd);

        let path = Path::new(bare);
        if path.is_absolute() || bare.starts_with("./") || bare.starts_with("../") {
            let target = resolve_against(&parent, path);
            return match self.with_extensions(&target) {
                Some(found) => self.file_resolution(found),
                None => Err(EngineError::ModuleNotFound(specifier.to_string())),
            };
        }

        match self.resolve_package(bare, &parent) {
            Some(found) => self.file_resolution(found),
            None => Err(EngineError::ModuleNotFound(specifier.to_string())),
        }
    }
}

#[async_trait]
impl NextLoad for NativeHost {
    async fn load(&self, url: &str, _context: LoadContext) -> Result<LoadOutput> {
        if url.starts_with("node:") || builtins::is_builtin(url) {
            return Ok(LoadOutput {
                format: ModuleFormat::Builtin,
                short_circuit: true,
                ..Default::default()
            });
        }

        let path = file_url_to_path(strip_query(url))?;
        let source = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ModuleNotFound(path.display().to_string())
            } else {
                EngineError::Fs(e)
            }
        })?;

        Ok(LoadOutput {
            format: self.format_of(&path),
            short_circuit: true,
            source: Some(source),
            resources: Vec::new(),
            files: vec![path],
        })
    }
}

impl HostRuntime for NativeHost {
    fn is_builtin(&self, specifier: &str) -> bool {
        builtins::is_builtin(specifier)
    }
}

/// Directory of the module a `parent_url` names
fn parent_directory(parent_url: Option<&str>, cwd: &Path) -> PathBuf {
    match parent_url {
        Some(parent) if parent.starts_with("file://") => base_directory(parent),
        Some(parent) => {
            let path = PathBuf::from(parent);
            if path.is_file() { dirname(&path) } else { path }
        }
        None => cwd.to_path_buf(),
    }
}
