// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Raw file loader

use super::{LoadResult, Loader, LoaderContext, LoaderProperties, Resource, content_hash};
use crate::error::Result;
use async_trait::async_trait;

/// Exports a file's text as a string and records it as a resource
///
/// The resource id is the content hash plus the original extension, so the
/// same asset imported from two places lands once in the manifest.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

#[async_trait]
impl Loader for FileLoader {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(
        &self,
        source: &str,
        properties: &LoaderProperties,
        _cx: &LoaderContext<'_>,
    ) -> Result<LoadResult> {
        let mut hash = content_hash(source.as_bytes());
        if !properties.extension.is_empty() {
            hash.push('.');
            hash.push_str(&properties.extension);
        }

        Ok(LoadResult {
            code: Some(format!(
                "export default {};",
                serde_json::Value::String(source.to_string())
            )),
            resources: vec![Resource::path(hash, properties.path.clone())],
            ..Default::default()
        })
    }
}
