// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolution & load engine
//!
//! The engine is one stage of a hook chain. `resolve` rewrites specifiers
//! (aliases, filesystem probing, query handling) and always hands the
//! result to the next stage. `load` dispatches to a registered loader and
//! short-circuits the chain with the transformed source, or passes native
//! sources through untouched.

use super::alias::PathAliases;
use super::hooks::{Cursor, LoadOutput, ModuleHooks, NextLoad, NextResolve};
use super::host::{HostRuntime, NativeHost};
use super::path;
use super::probe;
use super::specifier::{
    LoadContext, ModuleFormat, ResolveContext, Resolution, Specifier, file_url_to_path,
    path_to_file_url, strip_query,
};
use crate::bundler::{BundleOutput, BundleRequest, Bundler, BundlerBridge, GraphBundler};
use crate::channel::{Channel, INITIALIZE_EVENT};
use crate::config::{BundlerOptions, EngineConfig};
use crate::error::{EngineError, Result};
use crate::loaders::{DiagnosticSink, Loader, LoaderContext, LoaderProperties, TracingSink};
use crate::registry::{Activator, Dispatch, LoaderCatalog, LoaderHandle, LoaderRegistry};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{Instrument, debug, debug_span, warn};

/// Specifiers the engine treats as filesystem paths
static PATH_SHAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w:|\.?\.?/|file://)").expect("path shape pattern"));

/// The resolution & load engine
pub struct Engine {
    cwd: PathBuf,
    aliases: PathAliases,
    registry: LoaderRegistry,
    host: Arc<dyn HostRuntime>,
    sink: Arc<dyn DiagnosticSink>,
    bundler: Arc<dyn Bundler>,
    bundler_options: BundlerOptions,
    channel: Option<Channel>,
}

impl Engine {
    /// Start building an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Wait for the host's `initialize` event and build from its configuration
    pub async fn from_channel(channel: Channel) -> Result<Self> {
        let args = channel.once(INITIALIZE_EVENT).await?;
        let value = args
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::channel("initialize event carried no configuration"))?;
        let config: EngineConfig = serde_json::from_value(value)?;

        debug!("Engine configured over channel with {} loaders", config.loaders.len());
        Self::builder().config(config).channel(channel).build()
    }

    /// Working root
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Alias table
    pub fn aliases(&self) -> &PathAliases {
        &self.aliases
    }

    /// Loader registry
    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    /// Terminal handler
    pub fn host(&self) -> &dyn HostRuntime {
        self.host.as_ref()
    }

    /// External bundler driven by the bridge
    pub fn bundler(&self) -> &dyn Bundler {
        self.bundler.as_ref()
    }

    /// Bundler defaults
    pub fn bundler_options(&self) -> &BundlerOptions {
        &self.bundler_options
    }

    /// Attached channel, if any
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Resolve with the host runtime as the next stage
    pub async fn resolve_specifier(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
        let next = Cursor::terminal(self.host.as_ref());
        ModuleHooks::resolve(self, specifier, context, &next).await
    }

    /// Load with the host runtime as the next stage
    pub async fn load_url(&self, url: &str, context: LoadContext) -> Result<LoadOutput> {
        let next = Cursor::terminal(self.host.as_ref());
        ModuleHooks::load(self, url, context, &next).await
    }

    /// Bundle through the bundler bridge
    pub async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput> {
        BundlerBridge::new(self).bundle(request).await
    }

    /// Send an event to the host process when a channel is attached
    pub fn emit(&self, event: &str, args: Vec<serde_json::Value>) {
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.send(event, args) {
                warn!("Failed to emit '{}': {}", event, e);
            }
        }
    }

    /// Run `loader` over `source`, folding nested loads into the result
    async fn run_loader(
        &self,
        loader: &Arc<dyn Loader>,
        source: &str,
        mut properties: LoaderProperties,
    ) -> Result<LoadOutput> {
        let cx = LoaderContext::new(self);
        let result = loader.load(source, &properties, &cx).await?;

        if result.code.is_none() && result.errors.is_empty() {
            properties.debug = true;
            let span = debug_span!("loader_debug", loader = loader.name(), path = %properties.path.display());
            let probe = LoaderContext::new(self);
            match loader.load(source, &properties, &probe).instrument(span).await {
                Ok(diagnostic) => {
                    for message in diagnostic.errors.iter().chain(&diagnostic.warnings) {
                        debug!("{} loader: {}", loader.name(), message);
                    }
                }
                Err(e) => debug!("{} loader failed in debug mode: {}", loader.name(), e),
            }
        }

        for warning in &result.warnings {
            self.sink.warning(loader.name(), warning);
        }
        if !result.errors.is_empty() {
            return Err(EngineError::loader(loader.name(), &result.errors));
        }

        let (nested_files, nested_resources) = cx.into_collected();
        let mut files = vec![properties.path];
        files.extend(result.files);
        files.extend(nested_files);
        let mut resources = result.resources;
        resources.extend(nested_resources);

        Ok(LoadOutput {
            format: ModuleFormat::Module,
            short_circuit: true,
            source: result.code,
            resources,
            files,
        })
    }
}

#[async_trait]
impl ModuleHooks for Engine {
    async fn resolve(
        &self,
        specifier: &str,
        mut context: ResolveContext,
        next: &dyn NextResolve,
    ) -> Result<Resolution> {
        let spec = Specifier::parse(specifier);

        if self.host.is_builtin(&spec.bare) {
            context.builtin = true;
            return next.resolve(&spec.bare, context).await;
        }

        let aliased = self.aliases.resolve(&spec.bare, &self.cwd);
        if !PATH_SHAPED.is_match(&aliased) {
            return next.resolve(&spec.bare, context).await;
        }

        let candidate = if aliased.starts_with("file://") {
            match file_url_to_path(&aliased) {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(_) => return next.resolve(&spec.bare, context).await,
            }
        } else {
            aliased
        };

        let base = context
            .parent_url
            .clone()
            .unwrap_or_else(|| self.cwd.to_string_lossy().into_owned());
        let probed = probe::find(&base, &candidate, &self.registry.resolve_extensions());

        if context.is_bundling() {
            context.file = probed.is_absolute();
            return next.resolve(&probed.to_string_lossy(), context).await;
        }

        match path_to_file_url(&probed) {
            Ok(url) => next.resolve(&spec.with_query(&url), context).await,
            Err(_) => next.resolve(specifier, context).await,
        }
    }

    async fn load(&self, url: &str, context: LoadContext, next: &dyn NextLoad) -> Result<LoadOutput> {
        let bare = strip_query(url);
        if bare.starts_with("node:") || self.host.is_builtin(bare) {
            return next.load(url, context).await;
        }

        let file = file_url_to_path(bare)?;
        let extension = path::extension(&file);
        let kind = context.kind().to_string();

        let loader = match self.registry.lookup(&extension, &kind).await? {
            Dispatch::Native => return next.load(url, context).await,
            Dispatch::Loader(loader) => loader,
        };

        let raw = tokio::fs::read(&file).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ModuleNotFound(file.display().to_string())
            } else {
                EngineError::Fs(e)
            }
        })?;
        let source = String::from_utf8_lossy(&raw).into_owned();

        let mut attributes = context.import_attributes;
        attributes.remove("type");
        debug!("Loading {} with the {} loader", file.display(), loader.name());

        let properties = LoaderProperties {
            path: file,
            extension,
            kind,
            attributes,
            bundler: context.bundler,
            debug: false,
        };
        self.run_loader(&loader, &source, properties).await
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("cwd", &self.cwd)
            .field("aliases", &self.aliases)
            .field("registry", &self.registry)
            .field("bundler_options", &self.bundler_options)
            .field("channel", &self.channel)
            .finish()
    }
}

/// Composes an [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    activator: Option<Arc<dyn Activator>>,
    host: Option<Arc<dyn HostRuntime>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    bundler: Option<Arc<dyn Bundler>>,
    channel: Option<Channel>,
    inline: Vec<(String, Vec<String>, Arc<dyn Loader>, bool)>,
}

impl EngineBuilder {
    /// Use `config` for loaders, aliases, extensions and bundler defaults
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the working root
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(cwd.into());
        self
    }

    /// Activate module-path loaders through `activator`
    pub fn activator(mut self, activator: Arc<dyn Activator>) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Terminal handler; a [`NativeHost`] by default
    pub fn host(mut self, host: Arc<dyn HostRuntime>) -> Self {
        self.host = Some(host);
        self
    }

    /// Receiver of loader warnings; [`TracingSink`] by default
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// External bundler; [`GraphBundler`] by default
    pub fn bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    /// Attach a cross-process channel
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Register an already constructed loader
    pub fn loader<I, S>(mut self, kind: &str, extensions: I, loader: Arc<dyn Loader>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions = extensions.into_iter().map(Into::into).collect();
        self.inline.push((kind.to_string(), extensions, loader, false));
        self
    }

    /// Build the engine, registering every configured loader
    pub fn build(self) -> Result<Engine> {
        let cwd = match self.config.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };

        let activator = self
            .activator
            .unwrap_or_else(|| Arc::new(LoaderCatalog::with_defaults()));
        let registry = LoaderRegistry::new(activator);
        if !self.config.extensions.is_empty() {
            registry.set_resolve_extensions(self.config.extensions);
        }
        for spec in self.config.loaders {
            registry.register(
                &spec.kind,
                spec.extensions,
                LoaderHandle::Module(spec.module),
                spec.resolve,
            )?;
        }
        for (kind, extensions, loader, resolve) in self.inline {
            registry.register(&kind, extensions, LoaderHandle::Loader(loader), resolve)?;
        }

        let host = self
            .host
            .unwrap_or_else(|| Arc::new(NativeHost::new(cwd.clone())));

        Ok(Engine {
            aliases: PathAliases::new(self.config.aliases),
            registry,
            host,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            bundler: self.bundler.unwrap_or_else(|| Arc::new(GraphBundler::new())),
            bundler_options: self.config.bundler,
            channel: self.channel,
            cwd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderSpec;
    use crate::loaders::LoadResult;
    use crate::module_system::{AliasRule, BUNDLER_KIND};
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;

    /// Records every call that reaches the end of the chain
    #[derive(Default)]
    struct Terminal {
        seen: Mutex<Vec<(String, ResolveContext)>>,
    }

    #[async_trait]
    impl NextResolve for Terminal {
        async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
            self.seen.lock().push((specifier.to_string(), context.clone()));
            Ok(Resolution::from_context(specifier, &context))
        }
    }

    #[async_trait]
    impl NextLoad for Terminal {
        async fn load(&self, url: &str, _context: LoadContext) -> Result<LoadOutput> {
            Ok(LoadOutput {
                source: Some(format!("native:{}", url)),
                ..Default::default()
            })
        }
    }

    struct Upper;

    #[async_trait]
    impl Loader for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn load(
            &self,
            source: &str,
            _properties: &LoaderProperties,
            _cx: &LoaderContext<'_>,
        ) -> Result<LoadResult> {
            Ok(LoadResult::code(source.to_uppercase()))
        }
    }

    fn engine(cwd: &Path) -> Engine {
        Engine::builder()
            .config(EngineConfig {
                aliases: vec![AliasRule::new("@/*", "./src/*")],
                ..Default::default()
            })
            .cwd(cwd)
            .loader("*", ["up"], Arc::new(Upper))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_bare_package_passes_through_without_query() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let terminal = Terminal::default();

        let resolution = engine
            .resolve("lodash/get?x=1", ResolveContext::default(), &terminal)
            .await
            .unwrap();
        assert_eq!(resolution.url, "lodash/get");
        assert_eq!(terminal.seen.lock()[0].0, "lodash/get");
    }

    #[tokio::test]
    async fn test_resolve_builtin_marks_context() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let terminal = Terminal::default();

        let resolution = engine
            .resolve("node:fs?raw", ResolveContext::default(), &terminal)
            .await
            .unwrap();
        assert!(resolution.builtin);
        assert_eq!(resolution.url, "node:fs");
    }

    #[tokio::test]
    async fn test_resolve_alias_probes_and_keeps_query() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        fs::write(dir.path().join("src/lib/x.mjs"), "").unwrap();
        let engine = engine(dir.path());
        let terminal = Terminal::default();

        let resolution = engine
            .resolve("@/lib/x?mode=a", ResolveContext::default(), &terminal)
            .await
            .unwrap();

        let expected = path_to_file_url(&dir.path().join("src/lib/x.mjs")).unwrap();
        assert_eq!(resolution.url, format!("{}?mode=a", expected));
    }

    #[tokio::test]
    async fn test_resolve_relative_to_parent_url() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/util")).unwrap();
        fs::write(dir.path().join("pkg/util/index.cjs"), "").unwrap();
        let engine = engine(dir.path());
        let terminal = Terminal::default();

        let parent = path_to_file_url(&dir.path().join("pkg/main.js")).unwrap();
        let resolution = engine
            .resolve("./util", ResolveContext::new(parent), &terminal)
            .await
            .unwrap();
        assert_eq!(
            resolution.url,
            path_to_file_url(&dir.path().join("pkg/util/index.cjs")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_bundling_drops_query_and_flags_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.up"), "x").unwrap();
        let engine = engine(dir.path());
        let terminal = Terminal::default();

        let context = ResolveContext::new(dir.path().to_string_lossy()).with_kind(BUNDLER_KIND);
        let resolution = engine.resolve("./a.up?raw", context, &terminal).await.unwrap();

        assert!(resolution.file);
        assert_eq!(PathBuf::from(&resolution.url), dir.path().join("a.up"));
    }

    #[tokio::test]
    async fn test_load_native_passes_through() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "export {}").unwrap();
        let engine = engine(dir.path());

        let url = path_to_file_url(&dir.path().join("a.js")).unwrap();
        let output = engine
            .load(&url, LoadContext::default(), &Terminal::default())
            .await
            .unwrap();
        assert_eq!(output.source, Some(format!("native:{}", url)));
    }

    #[tokio::test]
    async fn test_load_dispatches_to_loader() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.up"), "shout").unwrap();
        let engine = engine(dir.path());

        let url = path_to_file_url(&dir.path().join("a.up")).unwrap();
        let output = engine
            .load(&format!("{}?v=1", url), LoadContext::default(), &Terminal::default())
            .await
            .unwrap();

        assert_eq!(output.format, ModuleFormat::Module);
        assert!(output.short_circuit);
        assert_eq!(output.source.as_deref(), Some("SHOUT"));
        assert_eq!(output.files, vec![dir.path().join("a.up")]);
    }

    /// Produces nothing and records the debug flag of every call
    #[derive(Default)]
    struct Silent {
        calls: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl Loader for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn load(
            &self,
            _source: &str,
            properties: &LoaderProperties,
            _cx: &LoaderContext<'_>,
        ) -> Result<LoadResult> {
            self.calls.lock().push(properties.debug);
            Ok(LoadResult::default())
        }
    }

    #[tokio::test]
    async fn test_empty_result_reruns_loader_in_debug_mode() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.nil"), "").unwrap();
        let silent = Arc::new(Silent::default());
        let engine = Engine::builder()
            .cwd(dir.path())
            .loader("*", ["nil"], silent.clone())
            .build()
            .unwrap();

        let url = path_to_file_url(&dir.path().join("a.nil")).unwrap();
        let output = engine.load_url(&url, LoadContext::default()).await.unwrap();

        assert_eq!(*silent.calls.lock(), vec![false, true]);
        assert_eq!(output.source, None);
        assert_eq!(output.files, vec![dir.path().join("a.nil")]);
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_raised() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.zzz"), "x").unwrap();
        let engine = engine(dir.path());

        let url = path_to_file_url(&dir.path().join("a.zzz")).unwrap();
        let err = engine
            .load_url(&url, LoadContext::with_kind("custom"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedKind(kind) if kind == "custom"));
    }

    #[test]
    fn test_invalid_registration_fails_build() {
        let err = Engine::builder()
            .config(EngineConfig {
                loaders: vec![LoaderSpec {
                    resolve: true,
                    ..LoaderSpec::new("spacey:json", &["json"]).with_kind("json")
                }],
                ..Default::default()
            })
            .cwd("/proj")
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRegistration(_)));
    }
}
