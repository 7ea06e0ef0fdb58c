// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundler plugin protocol
//!
//! The hook shapes a bundler exposes to plugins: `on_resolve` for every
//! import the bundler meets, `on_load` for every module it needs contents
//! for. A plugin returning `None` leaves the default behavior in place.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Namespace for ordinary files on disk
pub const FILE_NAMESPACE: &str = "file";

/// Arguments of a resolve hook call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnResolveArgs {
    /// Specifier as written in the importing module
    pub path: String,
    /// Path of the importing module, empty for entry points
    pub importer: String,
    /// Namespace of the importing module
    pub namespace: String,
    /// Directory relative imports are resolved from
    pub resolve_dir: PathBuf,
    /// Import attributes attached to the import
    pub with: BTreeMap<String, String>,
}

/// What a resolve hook decided
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnResolveResult {
    /// Resolved path
    pub path: Option<String>,
    /// Pseudo-namespace; `file` when absent
    pub namespace: Option<String>,
    /// Leave the import unresolved in the output
    pub external: bool,
}

impl OnResolveResult {
    /// A path in the file namespace
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// A path tagged into a pseudo-namespace
    pub fn namespaced(path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            namespace: Some(namespace.into()),
            external: false,
        }
    }

    /// An external import
    pub fn external(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            namespace: None,
            external: true,
        }
    }
}

/// Arguments of a load hook call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnLoadArgs {
    /// Resolved path
    pub path: String,
    /// Namespace assigned at resolve time
    pub namespace: String,
    /// Import attributes attached to the import
    pub with: BTreeMap<String, String>,
}

/// What a load hook produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnLoadResult {
    /// Module contents; `None` lets the bundler read the file itself
    pub contents: Option<String>,
    /// Directory imports inside these contents resolve from
    pub resolve_dir: Option<PathBuf>,
}

impl OnLoadResult {
    /// JavaScript contents
    pub fn js(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
            ..Default::default()
        }
    }
}

/// A bundler plugin
#[async_trait]
pub trait BundlerPlugin: Send + Sync {
    /// Plugin name, used in diagnostics
    fn name(&self) -> &str;

    /// Resolve an import
    async fn on_resolve(&self, args: OnResolveArgs) -> Result<Option<OnResolveResult>>;

    /// Produce contents for a resolved module
    async fn on_load(&self, args: OnLoadArgs) -> Result<Option<OnLoadResult>>;
}

/// Target platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// The host runtime itself; built-ins stay external
    Node,
    /// A browser
    Browser,
    /// Anything else
    #[default]
    Neutral,
}

/// Output module format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Portable ES module
    #[default]
    Esm,
    /// Self-executing bundle, optionally assigned to a global
    Iife,
}

/// Options for a single build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Entry specifiers
    pub entry_points: Vec<String>,
    /// Directory entry points and defaults resolve from
    pub working_dir: PathBuf,
    /// Output directory
    pub outdir: PathBuf,
    /// Output format
    pub format: OutputFormat,
    /// Global variable receiving the entry's exports (IIFE only)
    pub global_name: Option<String>,
    /// Target platform
    pub platform: Platform,
    /// Identifier-path substitutions applied to every module
    pub define: BTreeMap<String, String>,
}

/// A diagnostic produced during a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Human readable text
    pub text: String,
    /// Module the diagnostic belongs to
    pub location: Option<String>,
}

impl Message {
    /// Create a message tied to `location`
    pub fn at(text: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: Some(location.into()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.text),
            None => f.write_str(&self.text),
        }
    }
}

/// A produced output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Where the file would be written
    pub path: PathBuf,
    /// Contents
    pub text: String,
}

/// Result of a build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Produced files, entry output first
    pub output_files: Vec<OutputFile>,
    /// Errors collected across the module graph
    pub errors: Vec<Message>,
    /// Warnings collected across the module graph
    pub warnings: Vec<Message>,
}

/// A bundler that drives plugin hooks
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Run one in-memory build
    async fn build(&self, options: &BuildOptions, plugin: &dyn BundlerPlugin) -> BuildOutput;
}
