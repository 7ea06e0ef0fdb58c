// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader plugin contract
//!
//! A loader turns the raw text of one file into executable module source
//! plus a resource manifest. Ordinary failures are reported through
//! [`LoadResult::errors`]; returning `Err` is treated as a fatal fault of
//! that one load.
//!
//! ## Stock loaders
//! - [`JsonLoader`] - structured data as a default export
//! - [`FileLoader`] - any file as a string default export plus a resource
//! - [`BundleLoader`] - the `bundler` import kind, backed by the bundler bridge

mod bundle;
mod file;
mod json;

pub use bundle::BundleLoader;
pub use file::FileLoader;
pub use json::JsonLoader;

use crate::bundler::{BundleOutput, BundleRequest};
use crate::error::Result;
use crate::module_system::{Engine, LoadContext, LoadOutput, ResolveContext, Resolution};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A pluggable source transform
#[async_trait]
pub trait Loader: Send + Sync {
    /// Name used in error and warning messages
    fn name(&self) -> &str;

    /// Transform `source`
    async fn load(
        &self,
        source: &str,
        properties: &LoaderProperties,
        cx: &LoaderContext<'_>,
    ) -> Result<LoadResult>;
}

/// Properties handed to a loader alongside the raw source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderProperties {
    /// Absolute path of the file being loaded
    pub path: PathBuf,
    /// File extension without the leading dot
    pub extension: String,
    /// Requested import kind
    pub kind: String,
    /// Remaining import attributes from the call site
    pub attributes: BTreeMap<String, String>,
    /// Set when the bundler bridge issued the load
    pub bundler: bool,
    /// Set on the diagnostic re-invocation after an empty result
    pub debug: bool,
}

/// Where a resource's contents live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceSource {
    /// A file on disk
    Path(PathBuf),
    /// Inline contents
    Code(String),
    /// A reference to a delegated compiler
    Compiler(String),
}

/// An entry of the resource manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable identifier, usually a content hash
    pub hash: String,
    /// Contents location
    pub source: ResourceSource,
}

impl Resource {
    /// A resource backed by a file on disk
    pub fn path(hash: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            hash: hash.into(),
            source: ResourceSource::Path(path.into()),
        }
    }

    /// A resource carrying inline contents
    pub fn code(hash: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            source: ResourceSource::Code(code.into()),
        }
    }
}

/// Content hash used as a resource identifier
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..8])
}

/// What a loader hands back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadResult {
    /// Transformed module source
    pub code: Option<String>,
    /// Resource manifest entries
    pub resources: Vec<Resource>,
    /// Additional files that contributed to `code`
    pub files: Vec<PathBuf>,
    /// Fatal error messages
    pub errors: Vec<String>,
    /// Non-fatal warnings
    pub warnings: Vec<String>,
}

impl LoadResult {
    /// A successful result with the given code
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    /// A failed result with a single error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Default::default()
        }
    }
}

/// Receiver of non-fatal loader warnings
pub trait DiagnosticSink: Send + Sync {
    /// Report one warning from `loader`
    fn warning(&self, loader: &str, message: &str);
}

/// Sink that forwards warnings to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warning(&self, loader: &str, message: &str) {
        tracing::warn!("{} Loader Warning: {}", loader, message);
    }
}

#[derive(Default)]
struct Collected {
    files: Vec<PathBuf>,
    resources: Vec<Resource>,
}

/// Engine access for a running loader
///
/// Nested loads issued through this context have their files and resources
/// folded into the outer load's result.
pub struct LoaderContext<'a> {
    engine: &'a Engine,
    collected: Mutex<Collected>,
}

impl<'a> LoaderContext<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            collected: Mutex::new(Collected::default()),
        }
    }

    /// The engine running this loader
    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// Resolve `specifier` as if imported from `parent`
    pub async fn resolve(&self, specifier: &str, parent: &Path) -> Result<Resolution> {
        let context = ResolveContext::new(parent.to_string_lossy());
        self.engine.resolve_specifier(specifier, context).await
    }

    /// Load another module through the engine
    pub async fn load(&self, url: &str, context: LoadContext) -> Result<LoadOutput> {
        let output = self.engine.load_url(url, context).await?;
        let mut collected = self.collected.lock();
        collected.files.extend(output.files.iter().cloned());
        collected.resources.extend(output.resources.iter().cloned());
        Ok(output)
    }

    /// Bundle an entry through the bundler bridge
    pub async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput> {
        self.engine.bundle(request).await
    }

    /// Notify the host process of a named event, if a channel is attached
    pub fn emit(&self, event: &str, args: Vec<serde_json::Value>) {
        self.engine.emit(event, args);
    }

    pub(crate) fn into_collected(self) -> (Vec<PathBuf>, Vec<Resource>) {
        let collected = self.collected.into_inner();
        (collected.files, collected.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
        assert_eq!(content_hash(b"hello").len(), 16);
    }

    #[test]
    fn test_resource_manifest_shape() {
        let resource = Resource::path("abc.png", "/proj/a.png");
        let json = serde_json::to_value(&resource.source).unwrap();
        assert_eq!(json, serde_json::json!({ "path": "/proj/a.png" }));
    }
}
