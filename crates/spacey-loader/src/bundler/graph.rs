// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Stock module-graph bundler
//!
//! Walks the import graph breadth-first from each entry point, asking the
//! plugin to resolve and load every module, then links the collected
//! modules into a single artifact. Module ids are assigned in discovery
//! order, so identical inputs always produce identical output.

use super::link::{DepTarget, LinkModule, apply_define, link};
use super::plugin::{
    BuildOptions, BuildOutput, Bundler, BundlerPlugin, FILE_NAMESPACE, Message,
    OnLoadArgs, OnResolveArgs, OutputFile,
};
use super::scan::{DepKey, scan_imports};
use crate::module_system::path::{dirname, resolve_against};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity of a module in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModuleKey {
    namespace: String,
    path: String,
    with: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Node {
    key: ModuleKey,
    label: String,
    source: String,
    deps: HashMap<DepKey, DepTarget>,
}

/// Accumulates one entry's module graph
struct Graph<'a> {
    options: &'a BuildOptions,
    plugin: &'a dyn BundlerPlugin,
    nodes: Vec<Node>,
    index: HashMap<ModuleKey, usize>,
    queue: VecDeque<usize>,
    errors: Vec<Message>,
}

impl<'a> Graph<'a> {
    fn new(options: &'a BuildOptions, plugin: &'a dyn BundlerPlugin) -> Self {
        Self {
            options,
            plugin,
            nodes: Vec::new(),
            index: HashMap::new(),
            queue: VecDeque::new(),
            errors: Vec::new(),
        }
    }

    fn label(&self, key: &ModuleKey) -> String {
        if key.namespace == FILE_NAMESPACE {
            let path = Path::new(&key.path);
            path.strip_prefix(&self.options.working_dir)
                .unwrap_or(path)
                .display()
                .to_string()
        } else {
            format!("{}:{}", key.namespace, key.path)
        }
    }

    fn intern(&mut self, key: ModuleKey) -> usize {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.nodes.len();
        let label = self.label(&key);
        self.nodes.push(Node {
            label,
            key: key.clone(),
            source: String::new(),
            deps: HashMap::new(),
        });
        self.index.insert(key, id);
        self.queue.push_back(id);
        id
    }

    /// Resolve one import through the plugin, falling back to plain paths
    async fn resolve(&mut self, args: OnResolveArgs, location: &str) -> DepTarget {
        let specifier = args.path.clone();
        let with = args.with.clone();
        let resolve_dir = args.resolve_dir.clone();

        let resolved = match self.plugin.on_resolve(args).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.errors.push(Message::at(e.to_string(), location));
                return DepTarget::Missing;
            }
        };

        match resolved {
            Some(result) if result.external => {
                DepTarget::External(result.path.unwrap_or(specifier))
            }
            Some(result) => match result.path {
                Some(path) => DepTarget::Module(self.intern(ModuleKey {
                    namespace: result
                        .namespace
                        .unwrap_or_else(|| FILE_NAMESPACE.to_string()),
                    path,
                    with,
                })),
                None => self.unresolved(&specifier, location),
            },
            None if specifier.starts_with('.') || specifier.starts_with('/') => {
                let path = resolve_against(&resolve_dir, Path::new(&specifier));
                DepTarget::Module(self.intern(ModuleKey {
                    namespace: FILE_NAMESPACE.to_string(),
                    path: path.to_string_lossy().into_owned(),
                    with,
                }))
            }
            None => self.unresolved(&specifier, location),
        }
    }

    fn unresolved(&mut self, specifier: &str, location: &str) -> DepTarget {
        self.errors.push(Message::at(
            format!("Could not resolve \"{}\"", specifier),
            location,
        ));
        DepTarget::Missing
    }

    /// Produce JavaScript for a module, or record why it could not be loaded
    async fn load(&mut self, id: usize) -> Option<(String, PathBuf)> {
        let key = self.nodes[id].key.clone();
        let label = self.nodes[id].label.clone();

        let loaded = match self
            .plugin
            .on_load(OnLoadArgs {
                path: key.path.clone(),
                namespace: key.namespace.clone(),
                with: key.with.clone(),
            })
            .await
        {
            Ok(loaded) => loaded.unwrap_or_default(),
            Err(e) => {
                self.errors.push(Message::at(e.to_string(), label));
                return None;
            }
        };

        let is_file = key.namespace == FILE_NAMESPACE;
        let resolve_dir = loaded.resolve_dir.clone().unwrap_or_else(|| {
            if is_file {
                dirname(Path::new(&key.path))
            } else {
                self.options.working_dir.clone()
            }
        });

        let contents = match loaded.contents {
            Some(contents) => contents,
            None if is_file => match tokio::fs::read_to_string(&key.path).await {
                Ok(contents) => contents,
                Err(e) => {
                    self.errors.push(Message::at(format!("Could not read file: {}", e), label));
                    return None;
                }
            },
            None => {
                self.errors.push(Message::at("No contents produced", label));
                return None;
            }
        };

        Some((apply_define(&contents, &self.options.define), resolve_dir))
    }

    async fn run(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            let Some((source, resolve_dir)) = self.load(id).await else {
                continue;
            };
            debug!("Bundling {}", self.nodes[id].label);

            let key = self.nodes[id].key.clone();
            let label = self.nodes[id].label.clone();
            let mut deps = HashMap::new();

            for record in scan_imports(&source) {
                let args = OnResolveArgs {
                    path: record.specifier.clone(),
                    importer: key.path.clone(),
                    namespace: key.namespace.clone(),
                    resolve_dir: resolve_dir.clone(),
                    with: record.attributes.clone(),
                };
                let target = self.resolve(args, &label).await;
                deps.insert(record.key(), target);
            }

            let node = &mut self.nodes[id];
            node.source = source;
            node.deps = deps;
        }
    }
}

fn output_name(entry: &str, options: &BuildOptions) -> PathBuf {
    let stem = Path::new(entry)
        .file_stem()
        .map(|stem| stem.to_string_lossy().trim_start_matches('@').to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "bundle".to_string());
    options.outdir.join(format!("{}.js", stem))
}

/// Breadth-first bundler over the plugin hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphBundler;

impl GraphBundler {
    /// Create a bundler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Bundler for GraphBundler {
    async fn build(&self, options: &BuildOptions, plugin: &dyn BundlerPlugin) -> BuildOutput {
        let mut output = BuildOutput::default();

        for entry in &options.entry_points {
            let mut graph = Graph::new(options, plugin);
            let args = OnResolveArgs {
                path: entry.clone(),
                importer: String::new(),
                namespace: FILE_NAMESPACE.to_string(),
                resolve_dir: options.working_dir.clone(),
                with: BTreeMap::new(),
            };

            match graph.resolve(args, entry).await {
                DepTarget::Module(_) => graph.run().await,
                DepTarget::External(_) => graph.errors.push(Message::at(
                    "Entry point cannot be marked as external",
                    entry.clone(),
                )),
                DepTarget::Missing => {}
            }

            let modules: Vec<LinkModule> = graph
                .nodes
                .into_iter()
                .map(|node| LinkModule {
                    label: node.label,
                    source: node.source,
                    deps: node.deps,
                })
                .collect();

            output.errors.extend(graph.errors);
            output.output_files.push(OutputFile {
                path: output_name(entry, options),
                text: link(&modules, options.format, options.global_name.as_deref()),
            });
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::plugin::{OnLoadResult, OnResolveResult, OutputFormat};
    use crate::error::Result;

    /// Serves modules from memory under a `mem` namespace
    struct MemoryPlugin {
        files: BTreeMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl BundlerPlugin for MemoryPlugin {
        fn name(&self) -> &str {
            "memory"
        }

        async fn on_resolve(&self, args: OnResolveArgs) -> Result<Option<OnResolveResult>> {
            if args.path == "fs" {
                return Ok(Some(OnResolveResult::external("fs")));
            }
            Ok(Some(OnResolveResult::namespaced(args.path, "mem")))
        }

        async fn on_load(&self, args: OnLoadArgs) -> Result<Option<OnLoadResult>> {
            Ok(self
                .files
                .get(args.path.as_str())
                .map(|contents| OnLoadResult::js(*contents)))
        }
    }

    fn options() -> BuildOptions {
        BuildOptions {
            entry_points: vec!["main".to_string()],
            outdir: PathBuf::from("/out"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_build_links_graph_in_discovery_order() {
        let plugin = MemoryPlugin {
            files: BTreeMap::from([
                ("main", "import { a } from 'a';\nimport { b } from 'b';\nexport const sum = a + b;\n"),
                ("a", "import { b } from 'b';\nexport const a = b + 1;\n"),
                ("b", "export const b = 1;\n"),
            ]),
        };

        let output = GraphBundler.build(&options(), &plugin).await;
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert_eq!(output.output_files.len(), 1);
        assert_eq!(output.output_files[0].path, PathBuf::from("/out/main.js"));

        let code = &output.output_files[0].text;
        assert!(code.contains("// mem:main\n__define(0,"));
        assert!(code.contains("// mem:a\n__define(1,"));
        assert!(code.contains("// mem:b\n__define(2,"));
        assert_eq!(code.matches("__define(").count(), 4);
    }

    #[tokio::test]
    async fn test_build_keeps_externals() {
        let plugin = MemoryPlugin {
            files: BTreeMap::from([("main", "import fs from 'fs';\nexport default fs;\n")]),
        };

        let output = GraphBundler.build(&options(), &plugin).await;
        let code = &output.output_files[0].text;
        assert!(code.starts_with("import * as __ext0 from \"fs\";"));
        assert!(code.contains("export default __entry.default;"));
    }

    #[tokio::test]
    async fn test_build_reports_missing_module() {
        let plugin = MemoryPlugin {
            files: BTreeMap::from([("main", "import './gone';\n")]),
        };

        let output = GraphBundler.build(&options(), &plugin).await;
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].location.as_deref(), Some("mem:./gone"));
    }

    #[tokio::test]
    async fn test_build_iife_with_global_name() {
        let plugin = MemoryPlugin {
            files: BTreeMap::from([("main", "export const x = 1;\n")]),
        };
        let options = BuildOptions {
            format: OutputFormat::Iife,
            global_name: Some("Lib".to_string()),
            ..options()
        };

        let output = GraphBundler.build(&options, &plugin).await;
        assert!(output.output_files[0].text.starts_with("var Lib = (function () {"));
    }
}
