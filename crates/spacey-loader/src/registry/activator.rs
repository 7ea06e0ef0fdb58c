// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader activation

use crate::error::{EngineError, Result};
use crate::loaders::{BundleLoader, FileLoader, JsonLoader, Loader};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Turns a registered module path into a callable loader
#[async_trait]
pub trait Activator: Send + Sync {
    /// Activate the loader registered under `module`
    async fn activate(&self, module: &str) -> Result<Arc<dyn Loader>>;
}

/// Constructor stored in a [`LoaderCatalog`]
pub type LoaderFactory = Arc<dyn Fn() -> Arc<dyn Loader> + Send + Sync>;

/// Activator backed by a table of named loader constructors
///
/// Ships with `spacey:json`, `spacey:file` and `spacey:bundle`.
#[derive(Clone)]
pub struct LoaderCatalog {
    factories: HashMap<String, LoaderFactory>,
}

impl LoaderCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A catalog holding the stock loaders
    pub fn with_defaults() -> Self {
        Self::new()
            .with("spacey:json", || Arc::new(JsonLoader))
            .with("spacey:file", || Arc::new(FileLoader))
            .with("spacey:bundle", || Arc::new(BundleLoader))
    }

    /// Add a constructor under `module`
    pub fn with<F>(mut self, module: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Loader> + Send + Sync + 'static,
    {
        self.factories.insert(module.into(), Arc::new(factory));
        self
    }

    /// Whether `module` can be activated
    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }
}

impl Default for LoaderCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for LoaderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self.factories.keys().collect();
        modules.sort();
        f.debug_struct("LoaderCatalog").field("modules", &modules).finish()
    }
}

#[async_trait]
impl Activator for LoaderCatalog {
    async fn activate(&self, module: &str) -> Result<Arc<dyn Loader>> {
        debug!("Activating loader module {}", module);
        self.factories
            .get(module)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::activation(module, "no loader is registered under this name"))
    }
}
