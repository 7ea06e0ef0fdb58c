// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundler bridge
//!
//! Drives a [`Bundler`] with a plugin whose hooks delegate to the engine.
//! Resolution runs with the `bundler` import kind; every load is flagged as
//! bundler-originated, and the files and resources each load reports are
//! collected next to the produced artifact.
//!
//! Pseudo-namespaces:
//! - `exports` serves the synthetic re-export entry
//! - `ignore` produces an empty module
//! - `global` and `window` produce a shim for a host global

use super::plugin::{
    BuildOptions, Bundler, BundlerPlugin, FILE_NAMESPACE, Message, OnLoadArgs, OnLoadResult,
    OnResolveArgs, OnResolveResult, OutputFormat, Platform,
};
use crate::channel::BUNDLE_EVENT;
use crate::error::Result;
use crate::loaders::ResourceSource;
use crate::module_system::path::{dirname, resolve_against};
use crate::module_system::{
    BUNDLER_KIND, Engine, HostRuntime, LoadContext, LoadOutput, ModuleHooks, NextLoad,
    NextResolve, ResolveContext, Resolution, file_url_to_path, path_to_file_url, strip_query,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Virtual path of the synthetic re-export entry
pub const EXPORTS_ENTRY: &str = "@exports";

/// Namespace of the synthetic re-export entry
pub const EXPORTS_NAMESPACE: &str = "exports";

/// Namespace for imports replaced with an empty module
pub const IGNORE_NAMESPACE: &str = "ignore";

/// A request to bundle one entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundleRequest {
    /// Entry file
    pub entry: String,
    /// Re-export only these names from the entry
    pub exports: Option<Vec<String>>,
    /// Output directory; the configured one when absent
    pub outdir: Option<PathBuf>,
    /// Global variable name; switches the output to a self-executing bundle
    pub global_name: Option<String>,
    /// Target platform; the configured one when absent
    pub platform: Option<Platform>,
    /// Static resolve overrides, merged over the configured ones
    pub paths: BTreeMap<String, OnResolveResult>,
    /// Identifier substitutions, merged over the configured ones
    pub define: BTreeMap<String, String>,
}

impl BundleRequest {
    /// Bundle `entry` with the configured defaults
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            ..Default::default()
        }
    }
}

/// Result of a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleOutput {
    /// Artifact text; empty when nothing was produced
    pub code: String,
    /// Every file that contributed, deduplicated in first-seen order
    pub files: Vec<PathBuf>,
    /// Resource manifest keyed by resource hash
    pub resources: BTreeMap<String, ResourceSource>,
    /// Build errors
    pub errors: Vec<Message>,
    /// Build warnings
    pub warnings: Vec<Message>,
}

#[derive(Default)]
struct Collected {
    files: Vec<PathBuf>,
    resources: BTreeMap<String, ResourceSource>,
    warnings: Vec<Message>,
}

/// Synthetic entry re-exporting a curated set of names
struct ExportsEntry {
    file: PathBuf,
    names: Vec<String>,
}

/// Resolve continuation used while bundling
///
/// Captures the flags the engine set and gives bare package names one
/// chance at the host's own lookup.
struct Capture<'a> {
    host: &'a dyn HostRuntime,
}

#[async_trait]
impl NextResolve for Capture<'_> {
    async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
        if context.builtin || context.file {
            return Ok(Resolution::from_context(specifier, &context));
        }

        let host_context = ResolveContext {
            conditions: Vec::new(),
            ..context.clone()
        };
        match self.host.resolve(specifier, host_context).await {
            Ok(found) if found.file && !found.builtin => {
                let path = file_url_to_path(strip_query(&found.url))?;
                Ok(Resolution {
                    url: path.to_string_lossy().into_owned(),
                    builtin: false,
                    file: true,
                    format: found.format,
                })
            }
            _ => Ok(Resolution::from_context(specifier, &context)),
        }
    }
}

/// Load continuation that hands native files back to the bundler
struct Passthrough;

#[async_trait]
impl NextLoad for Passthrough {
    async fn load(&self, _url: &str, _context: LoadContext) -> Result<LoadOutput> {
        Ok(LoadOutput::default())
    }
}

struct BridgePlugin<'a> {
    engine: &'a Engine,
    platform: Platform,
    paths: BTreeMap<String, OnResolveResult>,
    exports: Option<ExportsEntry>,
    collected: Mutex<Collected>,
}

impl BridgePlugin<'_> {
    fn importer_label(&self, args: &OnResolveArgs) -> String {
        if args.importer.is_empty() {
            args.resolve_dir.display().to_string()
        } else {
            args.importer.clone()
        }
    }

    fn ignore(&self, args: &OnResolveArgs, path: String) -> OnResolveResult {
        self.collected.lock().warnings.push(Message::at(
            format!("\"{}\" cannot be bundled and was replaced with an empty module", args.path),
            self.importer_label(args),
        ));
        OnResolveResult::namespaced(path, IGNORE_NAMESPACE)
    }
}

#[async_trait]
impl BundlerPlugin for BridgePlugin<'_> {
    fn name(&self) -> &str {
        "spacey"
    }

    async fn on_resolve(&self, args: OnResolveArgs) -> Result<Option<OnResolveResult>> {
        if args.path == EXPORTS_ENTRY && self.exports.is_some() {
            return Ok(Some(OnResolveResult::namespaced(EXPORTS_ENTRY, EXPORTS_NAMESPACE)));
        }
        if let Some(overridden) = self.paths.get(&args.path) {
            return Ok(Some(overridden.clone()));
        }

        let parent = if args.namespace == FILE_NAMESPACE && !args.importer.is_empty() {
            let importer = resolve_against(&args.resolve_dir, &args.importer);
            path_to_file_url(&importer)?
        } else {
            args.resolve_dir.to_string_lossy().into_owned()
        };

        let context = ResolveContext::new(parent).with_kind(BUNDLER_KIND);
        let next = Capture {
            host: self.engine.host(),
        };
        let resolution = ModuleHooks::resolve(self.engine, &args.path, context, &next).await?;

        if !resolution.builtin && resolution.file && Path::new(&resolution.url).is_file() {
            return Ok(Some(OnResolveResult::file(resolution.url)));
        }
        if resolution.builtin && self.platform == Platform::Node {
            return Ok(Some(OnResolveResult {
                external: true,
                ..Default::default()
            }));
        }
        Ok(Some(self.ignore(&args, resolution.url)))
    }

    async fn on_load(&self, args: OnLoadArgs) -> Result<Option<OnLoadResult>> {
        match args.namespace.as_str() {
            IGNORE_NAMESPACE => return Ok(Some(OnLoadResult::js(""))),
            "global" => {
                return Ok(Some(OnLoadResult::js(format!(
                    "module.exports = globalThis.{};",
                    args.path
                ))));
            }
            "window" => {
                return Ok(Some(OnLoadResult::js(format!(
                    "module.exports = window.{};",
                    args.path
                ))));
            }
            EXPORTS_NAMESPACE => {
                if let Some(entry) = &self.exports {
                    let basename = entry
                        .file
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    return Ok(Some(OnLoadResult {
                        resolve_dir: Some(dirname(&entry.file)),
                        ..OnLoadResult::js(format!(
                            "export {{ {} }} from \"./{}\";",
                            entry.names.join(", "),
                            basename
                        ))
                    }));
                }
            }
            _ => {}
        }

        if args.namespace != FILE_NAMESPACE {
            return Ok(None);
        }

        let url = path_to_file_url(Path::new(&args.path))?;
        let context = LoadContext {
            import_attributes: args.with,
            bundler: true,
        };
        let output = ModuleHooks::load(self.engine, &url, context, &Passthrough).await?;

        {
            let mut collected = self.collected.lock();
            collected.files.extend(output.files);
            for resource in output.resources {
                collected.resources.insert(resource.hash, resource.source);
            }
        }

        Ok(Some(match output.source {
            Some(source) => OnLoadResult::js(source),
            None => OnLoadResult::default(),
        }))
    }
}

/// `define` entries replacing `process` and each `process.env.KEY`
fn env_defines(vars: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    let mut define: BTreeMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .map(|(key, value)| {
            (
                format!("process.env.{}", key),
                serde_json::Value::String(value).to_string(),
            )
        })
        .collect();
    define.insert("process".to_string(), "undefined".to_string());
    define
}

/// Bundles entries for an [`Engine`]
pub struct BundlerBridge<'a> {
    engine: &'a Engine,
}

impl<'a> BundlerBridge<'a> {
    /// Create a bridge over `engine`
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Produce one artifact for `request`
    pub async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput> {
        let defaults = self.engine.bundler_options();
        let cwd = self.engine.cwd();
        let entry_file = resolve_against(cwd, &request.entry);

        let global_name = request.global_name.or_else(|| defaults.global_name.clone());
        let platform = request.platform.unwrap_or(defaults.platform);

        let mut paths = defaults.paths.clone();
        paths.extend(request.paths);
        let mut define = if defaults.inline_env {
            env_defines(std::env::vars())
        } else {
            BTreeMap::new()
        };
        define.extend(defaults.define.clone());
        define.extend(request.define);

        let exports = request.exports.map(|names| ExportsEntry {
            file: entry_file.clone(),
            names,
        });
        let entry_point = if exports.is_some() {
            EXPORTS_ENTRY.to_string()
        } else {
            entry_file.to_string_lossy().into_owned()
        };

        let options = BuildOptions {
            entry_points: vec![entry_point],
            working_dir: cwd.to_path_buf(),
            outdir: request
                .outdir
                .or_else(|| defaults.outdir.clone())
                .map(|dir| resolve_against(cwd, dir))
                .unwrap_or_else(|| cwd.join("dist")),
            format: if global_name.is_some() {
                OutputFormat::Iife
            } else {
                OutputFormat::Esm
            },
            global_name,
            platform,
            define,
        };

        let plugin = BridgePlugin {
            engine: self.engine,
            platform,
            paths,
            exports,
            collected: Mutex::new(Collected::default()),
        };

        debug!("Bundling {} for {:?}", request.entry, platform);
        let build = self.engine.bundler().build(&options, &plugin).await;
        let collected = plugin.collected.into_inner();

        let mut seen = HashSet::new();
        let files: Vec<PathBuf> = collected
            .files
            .into_iter()
            .filter(|file| seen.insert(file.clone()))
            .collect();

        let mut warnings = build.warnings;
        warnings.extend(collected.warnings);

        let output = BundleOutput {
            code: build
                .output_files
                .into_iter()
                .next()
                .map(|file| file.text)
                .unwrap_or_default(),
            files,
            resources: collected.resources,
            errors: build.errors,
            warnings,
        };

        info!(
            "Bundled {} ({} files, {} errors)",
            request.entry,
            output.files.len(),
            output.errors.len()
        );
        self.engine.emit(
            BUNDLE_EVENT,
            vec![
                serde_json::Value::String(request.entry),
                serde_json::to_value(&output.files)?,
            ],
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::fs;
    use tempfile::tempdir;

    fn engine(cwd: &Path) -> Engine {
        Engine::builder().config(EngineConfig::default()).cwd(cwd).build().unwrap()
    }

    #[tokio::test]
    async fn test_bundles_relative_graph() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "import { n } from './dep';\nexport const m = n + 1;\n").unwrap();
        fs::write(dir.path().join("dep.js"), "export const n = 1;\n").unwrap();

        let output = engine(dir.path())
            .bundle(BundleRequest::new("main.js"))
            .await
            .unwrap();

        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert!(output.code.contains("export const {"));
        assert!(output.code.contains("dep.js"));
    }

    #[test]
    fn test_env_defines() {
        let define = env_defines([
            ("NODE_ENV".to_string(), "production".to_string()),
            ("ProgramFiles(x86)".to_string(), "C:\\x".to_string()),
        ]);
        assert_eq!(define.len(), 2);
        assert_eq!(define["process"], "undefined");
        assert_eq!(define["process.env.NODE_ENV"], "\"production\"");
    }

    #[tokio::test]
    async fn test_inline_env_replaces_process() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "export const p = typeof process;
").unwrap();
        let mut config = EngineConfig::default();
        config.bundler.inline_env = true;
        config
            .bundler
            .define
            .insert("process.env.MODE".to_string(), "\"test\"".to_string());
        let engine = Engine::builder().config(config).cwd(dir.path()).build().unwrap();

        fs::write(dir.path().join("mode.js"), "export const m = process.env.MODE;
").unwrap();
        let output = engine.bundle(BundleRequest::new("main.js")).await.unwrap();
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert!(output.code.contains("typeof undefined"));

        let output = engine.bundle(BundleRequest::new("mode.js")).await.unwrap();
        assert!(output.code.contains("\"test\""));
        assert!(!output.code.contains("process.env.MODE"));
    }

    #[tokio::test]
    async fn test_json_loads_through_engine() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "import data from './data.json';\nexport default data;\n").unwrap();
        fs::write(dir.path().join("data.json"), r#"{ "ok": true }"#).unwrap();

        let output = engine(dir.path())
            .bundle(BundleRequest::new("main.js"))
            .await
            .unwrap();

        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert!(output.code.contains(r#"{"ok":true}"#));
        assert!(output.files.contains(&dir.path().join("data.json")));
    }

    #[tokio::test]
    async fn test_exports_entry_reexports_named_bindings() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lib.js"), "export const a = 1;\nexport const b = 2;\nexport const c = 3;\n").unwrap();

        let request = BundleRequest {
            exports: Some(vec!["a".to_string(), "b".to_string()]),
            ..BundleRequest::new("lib.js")
        };
        let output = engine(dir.path()).bundle(request).await.unwrap();

        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert!(output.code.contains("exports:@exports"));
        assert!(output.code.contains("lib.js"));
    }

    #[tokio::test]
    async fn test_unbundleable_import_becomes_empty_module() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "import 'missing-package';\nexport const x = 1;\n").unwrap();

        let output = engine(dir.path())
            .bundle(BundleRequest::new("main.js"))
            .await
            .unwrap();

        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].text.contains("missing-package"));
    }

    #[tokio::test]
    async fn test_window_shim_through_paths() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "import React from 'react';\nexport default React;\n").unwrap();

        let mut request = BundleRequest::new("main.js");
        request
            .paths
            .insert("react".to_string(), OnResolveResult::namespaced("React", "window"));
        let output = engine(dir.path()).bundle(request).await.unwrap();

        assert!(output.code.contains("module.exports = window.React;"));
    }
}
