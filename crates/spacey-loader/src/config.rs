// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Engine configuration
//!
//! This is what the host process pushes across the channel at startup:
//! the loader table, alias rules, resolver extension order and bundler
//! defaults.

use crate::bundler::{OnResolveResult, Platform};
use crate::error::Result;
use crate::module_system::{AliasRule, WILDCARD};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One loader registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSpec {
    /// Module the loader is activated from
    pub module: String,

    /// Import kind
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Extensions handled; a single string is accepted
    #[serde(deserialize_with = "one_or_many")]
    pub extensions: Vec<String>,

    /// Append the extensions to the resolver probe order
    #[serde(default)]
    pub resolve: bool,
}

impl LoaderSpec {
    /// A kind-agnostic registration
    pub fn new(module: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            module: module.into(),
            kind: default_kind(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            resolve: false,
        }
    }

    /// Register under `kind` instead of the wildcard
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

fn default_kind() -> String {
    WILDCARD.to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(ext) => vec![ext],
        OneOrMany::Many(exts) => exts,
    })
}

/// Bundler defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundlerOptions {
    /// Output directory
    pub outdir: Option<PathBuf>,

    /// Target platform
    pub platform: Platform,

    /// Global variable for self-executing bundles
    pub global_name: Option<String>,

    /// Identifier substitutions
    pub define: BTreeMap<String, String>,

    /// Static resolve overrides, checked before the engine
    pub paths: BTreeMap<String, OnResolveResult>,

    /// Inline the process environment: `process` becomes `undefined` and
    /// every `process.env.KEY` becomes its value. Explicit `define` entries
    /// take precedence.
    pub inline_env: bool,
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Working root; the process directory when absent
    pub cwd: Option<PathBuf>,

    /// Loader registrations, applied in order
    pub loaders: Vec<LoaderSpec>,

    /// Alias rules in priority order
    pub aliases: Vec<AliasRule>,

    /// Base resolver extension order; the native order when empty
    pub extensions: Vec<String>,

    /// Bundler defaults
    pub bundler: BundlerOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            loaders: vec![LoaderSpec::new("spacey:json", &["json"])],
            aliases: Vec::new(),
            extensions: Vec::new(),
            bundler: BundlerOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize for the channel
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.loaders[0].module, "spacey:json");
        assert_eq!(config.bundler.platform, Platform::Neutral);
    }

    #[test]
    fn test_extensions_one_or_many() {
        let config = EngineConfig::from_json_str(
            r#"{
                "loaders": [
                    { "module": "./txt.js", "extensions": "txt" },
                    { "module": "./ts.js", "kind": "*", "extensions": ["ts", "tsx"], "resolve": true }
                ],
                "aliases": [{ "pattern": "@/*", "replacement": "./src/*" }],
                "bundler": { "platform": "node", "globalName": "App" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.loaders[0].extensions, vec!["txt"]);
        assert_eq!(config.loaders[0].kind, "*");
        assert_eq!(config.loaders[1].extensions, vec!["ts", "tsx"]);
        assert!(config.loaders[1].resolve);
        assert_eq!(config.aliases[0].pattern, "@/*");
        assert_eq!(config.bundler.platform, Platform::Node);
        assert_eq!(config.bundler.global_name.as_deref(), Some("App"));
    }

    #[test]
    fn test_json_value_round_trip() {
        let config = EngineConfig {
            cwd: Some(PathBuf::from("/proj")),
            ..Default::default()
        };
        let value = config.to_json_value().unwrap();
        assert_eq!(value["cwd"], "/proj");
        let back: EngineConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
