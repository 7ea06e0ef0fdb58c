// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundle loader

use super::{LoadResult, Loader, LoaderContext, LoaderProperties, Resource};
use crate::bundler::{BundleRequest, Platform};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Bundles the imported file and exports the artifact
///
/// ```js
/// import { code, files, resources } from "./app.js" with { type: "bundler" };
/// ```
///
/// Recognised attributes: `exports` (comma separated names), `globalName`,
/// `platform` and `outdir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundleLoader;

impl BundleLoader {
    fn request(properties: &LoaderProperties) -> Result<BundleRequest> {
        let attributes = &properties.attributes;
        let mut request = BundleRequest::new(properties.path.to_string_lossy());

        request.exports = attributes.get("exports").map(|names| {
            names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect()
        });
        request.global_name = attributes.get("globalName").cloned();
        request.outdir = attributes.get("outdir").map(PathBuf::from);
        request.platform = attributes
            .get("platform")
            .map(|platform| serde_json::from_value::<Platform>(Value::String(platform.clone())))
            .transpose()?;

        Ok(request)
    }
}

#[async_trait]
impl Loader for BundleLoader {
    fn name(&self) -> &str {
        "bundle"
    }

    async fn load(
        &self,
        _source: &str,
        properties: &LoaderProperties,
        cx: &LoaderContext<'_>,
    ) -> Result<LoadResult> {
        let request = match Self::request(properties) {
            Ok(request) => request,
            Err(e) => return Ok(LoadResult::error(e.to_string())),
        };

        let output = match cx.bundle(request).await {
            Ok(output) => output,
            Err(e) => return Ok(LoadResult::error(e.to_string())),
        };

        if !output.errors.is_empty() {
            return Ok(LoadResult {
                errors: output.errors.iter().map(ToString::to_string).collect(),
                warnings: output.warnings.iter().map(ToString::to_string).collect(),
                ..Default::default()
            });
        }

        let code = format!(
            "export const code = {};\nexport const files = {};\nexport const resources = {};\n",
            Value::String(output.code),
            serde_json::to_string(&output.files)?,
            serde_json::to_string(&output.resources)?,
        );

        Ok(LoadResult {
            code: Some(code),
            resources: output
                .resources
                .into_iter()
                .map(|(hash, source)| Resource { hash, source })
                .collect(),
            files: output.files,
            errors: Vec::new(),
            warnings: output.warnings.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn properties(attributes: &[(&str, &str)]) -> LoaderProperties {
        LoaderProperties {
            path: PathBuf::from("/proj/app.js"),
            extension: "js".to_string(),
            kind: "bundler".to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            bundler: false,
            debug: false,
        }
    }

    #[test]
    fn test_request_from_attributes() {
        let request = BundleLoader::request(&properties(&[
            ("exports", "a, b,"),
            ("globalName", "App"),
            ("platform", "node"),
        ]))
        .unwrap();

        assert_eq!(request.entry, "/proj/app.js");
        assert_eq!(request.exports, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(request.global_name.as_deref(), Some("App"));
        assert_eq!(request.platform, Some(Platform::Node));
        assert_eq!(request.outdir, None);
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        assert!(BundleLoader::request(&properties(&[("platform", "deno")])).is_err());
    }
}
