// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-loader
//!
//! Pluggable module resolution and loading for the Spacey runtime.
//!
//! This crate sits between the host runtime's module loader and the files
//! on disk, including:
//!
//! - Specifier resolution compatible with the host (extension probing,
//!   directory indexes, built-in modules) plus path aliases
//! - A (kind, extension) registry of transform loaders with lazy activation
//! - A bridge that drives a bundler through the same resolve/load logic
//! - A newline-delimited JSON channel that keeps a loader process in sync
//!   with the host process
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_loader::{Engine, EngineConfig, LoadContext, ResolveContext};
//!
//! #[tokio::main]
//! async fn main() -> spacey_loader::Result<()> {
//!     let engine = Engine::builder().config(EngineConfig::default()).build()?;
//!
//!     let resolved = engine
//!         .resolve_specifier("./data.json", ResolveContext::default())
//!         .await?;
//!     let loaded = engine.load_url(&resolved.url, LoadContext::default()).await?;
//!     println!("{}", loaded.source.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Bundling
//!
//! ```rust,ignore
//! use spacey_loader::{BundleRequest, Engine};
//!
//! let output = engine.bundle(BundleRequest::new("src/app.js")).await?;
//! for error in &output.errors {
//!     eprintln!("{}", error);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundler;
pub mod channel;
pub mod config;
pub mod error;
pub mod loaders;
pub mod module_system;
pub mod registry;

// Re-exports
pub use bundler::{BundleOutput, BundleRequest, BundlerBridge, GraphBundler, Platform};
pub use channel::{Channel, SharedState};
pub use config::{BundlerOptions, EngineConfig, LoaderSpec};
pub use error::{EngineError, Result};
pub use loaders::{LoadResult, Loader, LoaderContext, LoaderProperties};
pub use module_system::{
    Engine, EngineBuilder, LoadContext, LoadOutput, ModuleHooks, ResolveContext, Resolution,
};
pub use registry::{LoaderCatalog, LoaderHandle, LoaderRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
