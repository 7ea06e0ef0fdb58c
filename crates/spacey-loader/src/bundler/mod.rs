// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundling
//!
//! This module provides:
//! - The plugin protocol a bundler drives ([`BundlerPlugin`], [`Bundler`])
//! - [`GraphBundler`], which walks an import graph and links one artifact
//! - [`BundlerBridge`], which plugs the engine into any [`Bundler`]

mod bridge;
mod graph;
mod link;
mod plugin;
mod scan;

pub use bridge::{
    BundleOutput, BundleRequest, BundlerBridge, EXPORTS_ENTRY, EXPORTS_NAMESPACE, IGNORE_NAMESPACE,
};
pub use graph::GraphBundler;
pub use plugin::{
    BuildOptions, BuildOutput, Bundler, BundlerPlugin, FILE_NAMESPACE, Message,
    OnLoadArgs, OnLoadResult, OnResolveArgs, OnResolveResult, OutputFile, OutputFormat, Platform,
};
pub use scan::{ImportRecord, scan_imports};
