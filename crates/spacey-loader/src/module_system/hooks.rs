// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolve/load hook chain
//!
//! Every stage receives the request plus a continuation for the rest of
//! the chain. The last stage is always the host runtime.

use super::host::HostRuntime;
use super::specifier::{LoadContext, ModuleFormat, ResolveContext, Resolution};
use crate::error::Result;
use crate::loaders::Resource;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// What a load chain hands back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutput {
    /// Format marker
    pub format: ModuleFormat,
    /// Set when the host must not interpret the raw file itself
    pub short_circuit: bool,
    /// Module source, `None` when the host reads the file
    pub source: Option<String>,
    /// Resource manifest
    pub resources: Vec<Resource>,
    /// Every file that contributed to `source`, originating file first
    pub files: Vec<PathBuf>,
}

impl Default for LoadOutput {
    fn default() -> Self {
        Self {
            format: ModuleFormat::Module,
            short_circuit: false,
            source: None,
            resources: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// Continuation of a resolve chain
#[async_trait]
pub trait NextResolve: Send + Sync {
    /// Resolve with the remaining stages
    async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution>;
}

/// Continuation of a load chain
#[async_trait]
pub trait NextLoad: Send + Sync {
    /// Load with the remaining stages
    async fn load(&self, url: &str, context: LoadContext) -> Result<LoadOutput>;
}

/// A stage of the hook chain
///
/// Both hooks default to passing the request through untouched.
#[async_trait]
pub trait ModuleHooks: Send + Sync {
    /// Resolve `specifier`, delegating to `next` for anything not handled
    async fn resolve(
        &self,
        specifier: &str,
        context: ResolveContext,
        next: &dyn NextResolve,
    ) -> Result<Resolution> {
        next.resolve(specifier, context).await
    }

    /// Load `url`, delegating to `next` for anything not handled
    async fn load(&self, url: &str, context: LoadContext, next: &dyn NextLoad) -> Result<LoadOutput> {
        next.load(url, context).await
    }
}

/// Position inside a chain: the stages still to run, then the host
pub struct Cursor<'a> {
    stages: &'a [Arc<dyn ModuleHooks>],
    host: &'a dyn HostRuntime,
}

impl<'a> Cursor<'a> {
    /// Start at the first of `stages`
    pub fn new(stages: &'a [Arc<dyn ModuleHooks>], host: &'a dyn HostRuntime) -> Self {
        Self { stages, host }
    }

    /// A cursor that goes straight to the host
    pub fn terminal(host: &'a dyn HostRuntime) -> Self {
        Self { stages: &[], host }
    }
}

#[async_trait]
impl NextResolve for Cursor<'_> {
    async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Cursor::new(rest, self.host);
                stage.resolve(specifier, context, &next).await
            }
            None => self.host.resolve(specifier, context).await,
        }
    }
}

#[async_trait]
impl NextLoad for Cursor<'_> {
    async fn load(&self, url: &str, context: LoadContext) -> Result<LoadOutput> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Cursor::new(rest, self.host);
                stage.load(url, context, &next).await
            }
            None => self.host.load(url, context).await,
        }
    }
}

/// Ordered pipeline of hook stages ending in the host runtime
#[derive(Clone)]
pub struct HookChain {
    stages: Vec<Arc<dyn ModuleHooks>>,
    host: Arc<dyn HostRuntime>,
}

impl HookChain {
    /// Create a chain with no stages
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self {
            stages: Vec::new(),
            host,
        }
    }

    /// Append a stage; earlier stages run first
    pub fn with_stage(mut self, stage: Arc<dyn ModuleHooks>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Run a resolve request through the chain
    pub async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
        Cursor::new(&self.stages, self.host.as_ref())
            .resolve(specifier, context)
            .await
    }

    /// Run a load request through the chain
    pub async fn load(&self, url: &str, context: LoadContext) -> Result<LoadOutput> {
        Cursor::new(&self.stages, self.host.as_ref())
            .load(url, context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NextResolve for Recorder {
        async fn resolve(&self, specifier: &str, context: ResolveContext) -> Result<Resolution> {
            self.seen.lock().push(specifier.to_string());
            Ok(Resolution::from_context(specifier, &context))
        }
    }

    #[async_trait]
    impl NextLoad for Recorder {
        async fn load(&self, url: &str, _context: LoadContext) -> Result<LoadOutput> {
            self.seen.lock().push(url.to_string());
            Ok(LoadOutput::default())
        }
    }

    impl HostRuntime for Recorder {
        fn is_builtin(&self, _specifier: &str) -> bool {
            false
        }
    }

    struct Suffix(&'static str);

    #[async_trait]
    impl ModuleHooks for Suffix {
        async fn resolve(
            &self,
            specifier: &str,
            context: ResolveContext,
            next: &dyn NextResolve,
        ) -> Result<Resolution> {
            next.resolve(&format!("{}{}", specifier, self.0), context).await
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order_then_host() {
        let host = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let chain = HookChain::new(host.clone())
            .with_stage(Arc::new(Suffix("-a")))
            .with_stage(Arc::new(Suffix("-b")));

        let resolution = chain.resolve("x", ResolveContext::default()).await.unwrap();
        assert_eq!(resolution.url, "x-a-b");

        chain.load("file:///x.js", LoadContext::default()).await.unwrap();
        assert_eq!(*host.seen.lock(), vec!["x-a-b", "file:///x.js"]);
    }
}
