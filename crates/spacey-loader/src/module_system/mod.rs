// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module resolution and loading
//!
//! This module provides:
//! - Specifier parsing with query suffixes
//! - Path alias rewriting
//! - Filesystem probing over a configurable extension order
//! - The resolve/load hook chain and its host runtime terminal
//! - The [`Engine`] stage that dispatches files to loaders

mod alias;
mod builtins;
mod engine;
mod hooks;
mod host;
pub mod path;
pub mod probe;
mod specifier;

pub use alias::{AliasRule, PathAliases, ROOT_ALIAS};
pub use builtins::is_builtin;
pub use engine::{Engine, EngineBuilder};
pub use hooks::{Cursor, HookChain, LoadOutput, ModuleHooks, NextLoad, NextResolve};
pub use host::{HostRuntime, NativeHost};
pub use specifier::{
    BUNDLER_KIND, LoadContext, ModuleFormat, ResolveContext, Resolution, Specifier, WILDCARD,
    file_url_to_path, path_to_file_url, strip_query,
};
