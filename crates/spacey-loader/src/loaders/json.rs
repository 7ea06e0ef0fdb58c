// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JSON loader

use super::{LoadResult, Loader, LoaderContext, LoaderProperties};
use crate::error::Result;
use async_trait::async_trait;

/// Exposes a JSON document as the module's default export
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLoader;

#[async_trait]
impl Loader for JsonLoader {
    fn name(&self) -> &str {
        "json"
    }

    async fn load(
        &self,
        source: &str,
        properties: &LoaderProperties,
        _cx: &LoaderContext<'_>,
    ) -> Result<LoadResult> {
        match serde_json::from_str::<serde_json::Value>(source) {
            Ok(value) => Ok(LoadResult::code(format!("export default ({});", value))),
            Err(e) => Ok(LoadResult::error(format!(
                "{}(0,0): json error: {}.",
                properties.path.display(),
                e
            ))),
        }
    }
}
