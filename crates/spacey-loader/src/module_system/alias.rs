// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Path alias rewriting (`compilerOptions.paths`-style rules)
//!
//! Rules are tried in declaration order and the first match wins. A
//! pattern without a trailing `*` matches only the exact specifier; a
//! pattern ending in `*` matches any specifier sharing its prefix, provided
//! the replacement also ends in `*`.

use crate::module_system::path::{normalize, resolve_against};
use serde::{Deserialize, Serialize};
use std::path::Path;

const WILDCARD_MARKER: char = '*';

/// Root-relative marker that always maps onto the working directory
pub const ROOT_ALIAS: &str = "~/*";

/// A single alias rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    /// Pattern to match, optionally ending in `*`
    pub pattern: String,
    /// Replacement, optionally ending in `*`
    pub replacement: String,
}

impl AliasRule {
    /// Create a new rule
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Apply this rule to `specifier`, returning the rewritten path on a match
    fn apply(&self, specifier: &str, base_dir: &Path) -> Option<String> {
        match self.pattern.strip_suffix(WILDCARD_MARKER) {
            Some(prefix) => {
                let replacement = self.replacement.strip_suffix(WILDCARD_MARKER)?;
                let rest = specifier.strip_prefix(prefix)?;
                // The remainder is appended to the resolved prefix as text
                let mut target = resolve_against(base_dir, replacement)
                    .to_string_lossy()
                    .to_string();
                if (replacement.is_empty() || replacement.ends_with('/')) && !target.ends_with('/') {
                    target.push('/');
                }
                target.push_str(rest);
                Some(normalize(Path::new(&target)).to_string_lossy().to_string())
            }
            None if self.pattern == specifier => Some(
                resolve_against(base_dir, &self.replacement)
                    .to_string_lossy()
                    .to_string(),
            ),
            None => None,
        }
    }
}

/// Ordered alias table
#[derive(Debug, Clone)]
pub struct PathAliases {
    rules: Vec<AliasRule>,
}

impl PathAliases {
    /// Create an alias table from user rules; the root alias is appended last
    pub fn new(rules: impl IntoIterator<Item = AliasRule>) -> Self {
        let mut rules: Vec<AliasRule> = rules.into_iter().collect();
        rules.push(AliasRule::new(ROOT_ALIAS, "./*"));
        Self { rules }
    }

    /// Rewrite `specifier` with the first matching rule, resolving the
    /// replacement against `base_dir`. Unmatched specifiers come back as-is.
    pub fn resolve(&self, specifier: &str, base_dir: &Path) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(specifier, base_dir))
            .unwrap_or_else(|| specifier.to_string())
    }

    /// The rules in priority order
    pub fn rules(&self) -> &[AliasRule] {
        &self.rules
    }
}

impl Default for PathAliases {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
