// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Specifiers, per-call contexts and resolution records

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::{Url, form_urlencoded};

/// Wildcard import kind and extension
pub const WILDCARD: &str = "*";

/// Import kind used while the bundler bridge drives resolution
pub const BUNDLER_KIND: &str = "bundler";

/// A module specifier split from its query suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    /// Specifier without the query suffix
    pub bare: String,
    /// Query parameters in declaration order
    pub query: Vec<(String, String)>,
}

impl Specifier {
    /// Split `raw` at the first `?` and parse the remainder as query pairs
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('?') {
            Some((bare, query)) => Self {
                bare: bare.to_string(),
                query: form_urlencoded::parse(query.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
            },
            None => Self {
                bare: raw.to_string(),
                query: Vec::new(),
            },
        }
    }

    /// Serialize the query parameters, empty when there are none
    pub fn query_string(&self) -> String {
        if self.query.is_empty() {
            return String::new();
        }
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish()
    }

    /// Re-attach this specifier's query to `base`
    pub fn with_query(&self, base: &str) -> String {
        let params = self.query_string();
        if params.is_empty() {
            base.to_string()
        } else {
            format!("{}?{}", base, params)
        }
    }
}

/// Strip any query suffix from a specifier or URL
pub fn strip_query(raw: &str) -> &str {
    raw.split_once('?').map(|(bare, _)| bare).unwrap_or(raw)
}

/// Convert a `file://` URL or plain path string into a path
pub fn file_url_to_path(url: &str) -> Result<PathBuf> {
    if url.starts_with("file://") {
        Url::parse(url)
            .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))?
            .to_file_path()
            .map_err(|_| EngineError::InvalidUrl(url.to_string()))
    } else {
        Ok(PathBuf::from(url))
    }
}

/// Convert an absolute path into a `file://` URL string
pub fn path_to_file_url(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| EngineError::InvalidUrl(path.display().to_string()))
}

/// Per-call record for a single resolve request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveContext {
    /// URL (or directory path) of the importing module
    pub parent_url: Option<String>,
    /// Resolution conditions; the first one carries the import kind
    pub conditions: Vec<String>,
    /// Set when the specifier names a built-in module
    pub builtin: bool,
    /// Set during bundler resolution when the result is an on-disk path
    pub file: bool,
}

impl ResolveContext {
    /// Create a context for an import made from `parent_url`
    pub fn new(parent_url: impl Into<String>) -> Self {
        Self {
            parent_url: Some(parent_url.into()),
            ..Default::default()
        }
    }

    /// Set the import kind
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.conditions.insert(0, kind.into());
        self
    }

    /// The requested import kind, wildcard by default
    pub fn kind(&self) -> &str {
        self.conditions.first().map(String::as_str).unwrap_or(WILDCARD)
    }

    /// Whether resolution is being driven by the bundler bridge
    pub fn is_bundling(&self) -> bool {
        self.kind() == BUNDLER_KIND
    }
}

/// Per-call record for a single load request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadContext {
    /// Import attributes from the call site; `type` carries the import kind
    pub import_attributes: BTreeMap<String, String>,
    /// Set when the bundler bridge issued the load
    pub bundler: bool,
}

impl LoadContext {
    /// Create a context with the given import kind
    pub fn with_kind(kind: impl Into<String>) -> Self {
        let mut import_attributes = BTreeMap::new();
        import_attributes.insert("type".to_string(), kind.into());
        Self {
            import_attributes,
            bundler: false,
        }
    }

    /// The requested import kind, wildcard by default
    pub fn kind(&self) -> &str {
        self.import_attributes
            .get("type")
            .map(String::as_str)
            .unwrap_or(WILDCARD)
    }
}

/// Module format reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// ECMAScript module
    Module,
    /// CommonJS module
    CommonJs,
    /// JSON document
    Json,
    /// Host built-in module
    Builtin,
}

impl ModuleFormat {
    /// Detect the format from a file extension, `None` when ambiguous
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mjs") => Some(Self::Module),
            Some("cjs") => Some(Self::CommonJs),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }

    /// Detect the format from a package.json `type` field
    pub fn from_package_type(type_field: Option<&str>) -> Self {
        match type_field {
            Some("module") => Self::Module,
            _ => Self::CommonJs,
        }
    }
}

/// Outcome of a resolve chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Final URL, path or built-in name
    pub url: String,
    /// Whether the result is a built-in module
    pub builtin: bool,
    /// Whether the result is an on-disk file
    pub file: bool,
    /// Format hint, when the resolving stage knows it
    pub format: Option<ModuleFormat>,
}

impl Resolution {
    /// Mirror the flags accumulated on `context` into a resolution for `url`
    pub fn from_context(url: impl Into<String>, context: &ResolveContext) -> Self {
        Self {
            url: url.into(),
            builtin: context.builtin,
            file: context.file,
            format: context.builtin.then_some(ModuleFormat::Builtin),
        }
    }
}
