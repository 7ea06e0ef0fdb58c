// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader registry
//!
//! Loaders are stored under an (import kind, extension) key. A lookup walks
//! an explicit candidate list:
//!
//! 1. `(kind, ext)`
//! 2. `(*, ext)`
//! 3. `(kind, *)`
//! 4. `(*, *)`
//!
//! Entries registered by module path are activated on first successful
//! lookup and memoised, so every later lookup for the same key returns the
//! same loader instance.

mod activator;

pub use activator::{Activator, LoaderCatalog, LoaderFactory};

use crate::error::{EngineError, Result};
use crate::loaders::Loader;
use crate::module_system::WILDCARD;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Extensions the host runtime executes unmodified
pub const NATIVE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// What a registration points at
#[derive(Clone)]
pub enum LoaderHandle {
    /// A module path, activated on first use
    Module(String),
    /// An already constructed loader
    Loader(Arc<dyn Loader>),
}

impl fmt::Debug for LoaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(module) => f.debug_tuple("Module").field(module).finish(),
            Self::Loader(loader) => f.debug_tuple("Loader").field(&loader.name()).finish(),
        }
    }
}

/// Outcome of a lookup
#[derive(Clone)]
pub enum Dispatch {
    /// Let the host runtime handle the file natively
    Native,
    /// Run this loader
    Loader(Arc<dyn Loader>),
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("Native"),
            Self::Loader(loader) => f.debug_tuple("Loader").field(&loader.name()).finish(),
        }
    }
}

/// A registry slot
enum Entry {
    Native,
    Registered {
        module: Option<String>,
        loader: OnceCell<Arc<dyn Loader>>,
    },
}

impl Entry {
    fn from_handle(handle: LoaderHandle) -> Self {
        match handle {
            LoaderHandle::Module(module) => Self::Registered {
                module: Some(module),
                loader: OnceCell::new(),
            },
            LoaderHandle::Loader(loader) => Self::Registered {
                module: None,
                loader: OnceCell::new_with(Some(loader)),
            },
        }
    }
}

/// Two-level (kind, extension) loader table
pub struct LoaderRegistry {
    entries: DashMap<(String, String), Arc<Entry>>,
    extensions: RwLock<Vec<String>>,
    activator: Arc<dyn Activator>,
}

impl LoaderRegistry {
    /// Create a registry that activates module handles through `activator`
    pub fn new(activator: Arc<dyn Activator>) -> Self {
        let entries = DashMap::new();
        for ext in NATIVE_EXTENSIONS {
            entries.insert((WILDCARD.to_string(), ext.to_string()), Arc::new(Entry::Native));
        }

        Self {
            entries,
            extensions: RwLock::new(NATIVE_EXTENSIONS.iter().map(|e| e.to_string()).collect()),
            activator,
        }
    }

    /// Store `handle` under `kind` for every extension in `extensions`
    ///
    /// With `resolve` set, the extensions are also appended to the probe
    /// order; only kind-agnostic registrations may do that.
    pub fn register<I, S>(&self, kind: &str, extensions: I, handle: LoaderHandle, resolve: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions: Vec<String> = extensions.into_iter().map(Into::into).collect();
        if extensions.is_empty() {
            return Err(EngineError::InvalidRegistration(format!(
                "no extensions given for kind '{}'",
                kind
            )));
        }
        if resolve && kind != WILDCARD {
            return Err(EngineError::InvalidRegistration(format!(
                "only kind '{}' loaders can extend resolution, got '{}'",
                WILDCARD, kind
            )));
        }

        let entry = Arc::new(Entry::from_handle(handle));
        for ext in &extensions {
            let ext = ext.trim_start_matches('.').to_string();
            if resolve && ext != WILDCARD {
                let mut order = self.extensions.write();
                if !order.contains(&ext) {
                    order.push(ext.clone());
                }
            }
            self.entries.insert((kind.to_string(), ext), entry.clone());
        }
        Ok(())
    }

    /// Replace the probe order; later `resolve` registrations append to it
    pub fn set_resolve_extensions<I, S>(&self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order: Vec<String> = Vec::new();
        for ext in extensions {
            let ext = ext.into().trim_start_matches('.').to_string();
            if !order.contains(&ext) {
                order.push(ext);
            }
        }
        *self.extensions.write() = order;
    }

    /// Extension order used by the filesystem probe
    pub fn resolve_extensions(&self) -> Vec<String> {
        self.extensions.read().clone()
    }

    /// The ordered keys a lookup tries
    pub fn candidates(kind: &str, extension: &str) -> Vec<(String, String)> {
        if extension == WILDCARD {
            return vec![(kind.to_string(), WILDCARD.to_string())];
        }

        let mut keys: Vec<(String, String)> = Vec::with_capacity(4);
        for (k, e) in [
            (kind, extension),
            (WILDCARD, extension),
            (kind, WILDCARD),
            (WILDCARD, WILDCARD),
        ] {
            let key = (k.to_string(), e.to_string());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Find the loader for `extension` under `kind`
    pub async fn lookup(&self, extension: &str, kind: &str) -> Result<Dispatch> {
        let found = Self::candidates(kind, extension)
            .into_iter()
            .find_map(|key| self.entries.get(&key).map(|entry| entry.value().clone()));

        match found.as_deref() {
            None => Err(EngineError::UnsupportedKind(kind.to_string())),
            Some(Entry::Native) => Ok(Dispatch::Native),
            Some(Entry::Registered { module, loader }) => {
                let loader = loader
                    .get_or_try_init(|| async {
                        match module {
                            Some(module) => self.activator.activate(module).await,
                            None => Err(EngineError::activation(
                                "<inline>",
                                "loader handle was never set",
                            )),
                        }
                    })
                    .await?;
                Ok(Dispatch::Loader(loader.clone()))
            }
        }
    }

    /// Number of registered (kind, extension) keys, native ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("entries", &self.entries.len())
            .field("extensions", &*self.extensions.read())
            .finish()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new(Arc::new(LoaderCatalog::with_defaults()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::{JsonLoader, LoadResult, LoaderContext, LoaderProperties};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named(&'static str);

    #[async_trait]
    impl Loader for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn load(
            &self,
            _source: &str,
            _properties: &LoaderProperties,
            _cx: &LoaderContext<'_>,
        ) -> Result<LoadResult> {
            Ok(LoadResult::default())
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Activator for Counting {
        async fn activate(&self, module: &str) -> Result<Arc<dyn Loader>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Arc::new(Named(if module == "a" { "a" } else { "other" })))
        }
    }

    fn loader_name(dispatch: &Dispatch) -> &str {
        match dispatch {
            Dispatch::Loader(loader) => loader.name(),
            Dispatch::Native => "native",
        }
    }

    #[test]
    fn test_candidates_order() {
        let key = |k: &str, e: &str| (k.to_string(), e.to_string());
        assert_eq!(
            LoaderRegistry::candidates("custom", "foo"),
            vec![key("custom", "foo"), key("*", "foo"), key("custom", "*"), key("*", "*")]
        );
        assert_eq!(
            LoaderRegistry::candidates("*", "foo"),
            vec![key("*", "foo"), key("*", "*")]
        );
        assert_eq!(LoaderRegistry::candidates("custom", "*"), vec![key("custom", "*")]);
    }

    #[tokio::test]
    async fn test_native_extensions_dispatch_natively() {
        let registry = LoaderRegistry::default();
        assert!(matches!(registry.lookup("js", "*").await.unwrap(), Dispatch::Native));
        assert!(matches!(registry.lookup("mjs", "*").await.unwrap(), Dispatch::Native));
    }

    #[tokio::test]
    async fn test_unsupported_kind_names_requested_kind() {
        let registry = LoaderRegistry::default();
        let err = registry.lookup("foo", "custom").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Import attribute \"type\" with value \"custom\" is not supported"
        );
        assert!(matches!(
            registry.lookup("*", "custom").await,
            Err(EngineError::UnsupportedKind(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_reaches_wildcard_pair() {
        let registry = LoaderRegistry::default();
        registry
            .register("*", ["*"], LoaderHandle::Loader(Arc::new(Named("fallback"))), false)
            .unwrap();
        registry
            .register("custom", ["*"], LoaderHandle::Loader(Arc::new(Named("custom"))), false)
            .unwrap();

        let dispatch = registry.lookup("foo", "custom").await.unwrap();
        assert_eq!(loader_name(&dispatch), "custom");
        let dispatch = registry.lookup("foo", "other").await.unwrap();
        assert_eq!(loader_name(&dispatch), "fallback");
        // (*, js) is found before (custom, *)
        let dispatch = registry.lookup("js", "custom").await.unwrap();
        assert_eq!(loader_name(&dispatch), "native");
    }

    #[tokio::test]
    async fn test_activation_happens_once() {
        let activator = Arc::new(Counting(AtomicUsize::new(0)));
        let registry = LoaderRegistry::new(activator.clone());
        registry
            .register("*", ["a", "b"], LoaderHandle::Module("a".to_string()), false)
            .unwrap();

        let (first, second) = tokio::join!(registry.lookup("a", "*"), registry.lookup("b", "*"));
        let (Dispatch::Loader(first), Dispatch::Loader(second)) = (first.unwrap(), second.unwrap())
        else {
            panic!("expected loaders");
        };

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(activator.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolve_flag_extends_probe_order() {
        let registry = LoaderRegistry::default();
        registry
            .register("*", [".ts", "tsx"], LoaderHandle::Loader(Arc::new(JsonLoader)), true)
            .unwrap();
        assert_eq!(registry.resolve_extensions(), vec!["js", "mjs", "cjs", "ts", "tsx"]);

        let err = registry
            .register("custom", ["x"], LoaderHandle::Loader(Arc::new(JsonLoader)), true)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRegistration(_)));
    }

    #[test]
    fn test_base_order_can_be_replaced() {
        let registry = LoaderRegistry::default();
        registry.set_resolve_extensions([".mjs", "js", "mjs"]);
        registry
            .register("*", ["vue"], LoaderHandle::Loader(Arc::new(JsonLoader)), true)
            .unwrap();
        assert_eq!(registry.resolve_extensions(), vec!["mjs", "js", "vue"]);
    }
}
