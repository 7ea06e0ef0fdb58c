// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Import scanning
//!
//! Pattern based, the same way the ESM loader reads declarations: it does
//! not understand comments or string contents, which is acceptable for the
//! module shapes loaders emit.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// `import <clause> from "x" [with { ... }]`
pub(crate) static STATIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)import\s+([\w$*{}\s,]+?)\s*from\s*['"]([^'"]+)['"](\s*(?:with|assert)\s*\{[^}]*\})?[ \t]*;?"#,
    )
    .expect("static import pattern")
});

/// `import "x" [with { ... }]`
pub(crate) static SIDE_EFFECT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)import\s*['"]([^'"]+)['"](\s*(?:with|assert)\s*\{[^}]*\})?[ \t]*;?"#,
    )
    .expect("side-effect import pattern")
});

/// `export * from "x"`, `export * as ns from "x"`, `export { a } from "x"`
pub(crate) static EXPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)export\s*(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"]+)['"](\s*(?:with|assert)\s*\{[^}]*\})?[ \t]*;?"#,
    )
    .expect("export-from pattern")
});

/// `require("x")`
pub(crate) static REQUIRE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("require pattern")
});

/// `import("x")`
pub(crate) static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("dynamic import pattern")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]?([\w$-]+)['"]?\s*:\s*['"]([^'"]*)['"]"#).expect("attribute pattern")
});

/// A dependency found in module source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// Specifier as written
    pub specifier: String,
    /// Import attributes (`with { type: "json" }`)
    pub attributes: BTreeMap<String, String>,
}

impl ImportRecord {
    /// Key identifying this dependency within one module
    pub fn key(&self) -> DepKey {
        DepKey::new(&self.specifier, &self.attributes)
    }
}

/// Specifier plus serialized attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepKey {
    /// Specifier as written
    pub specifier: String,
    /// `k=v` pairs joined with `,`
    pub attributes: String,
}

impl DepKey {
    /// Build a key from a specifier and its attributes
    pub fn new(specifier: &str, attributes: &BTreeMap<String, String>) -> Self {
        Self {
            specifier: specifier.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Parse a `with { ... }` clause into attribute pairs
pub(crate) fn parse_attributes(clause: Option<&str>) -> BTreeMap<String, String> {
    clause
        .map(|clause| {
            ATTRIBUTE
                .captures_iter(clause)
                .map(|cap| (cap[1].to_string(), cap[2].to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Collect every dependency of `source`, in source order, without duplicates
pub fn scan_imports(source: &str) -> Vec<ImportRecord> {
    let mut found: Vec<(usize, ImportRecord)> = Vec::new();

    for cap in STATIC_IMPORT.captures_iter(source) {
        found.push((
            cap.get(0).map(|m| m.start()).unwrap_or_default(),
            ImportRecord {
                specifier: cap[3].to_string(),
                attributes: parse_attributes(cap.get(4).map(|m| m.as_str())),
            },
        ));
    }

    for cap in SIDE_EFFECT_IMPORT.captures_iter(source) {
        found.push((
            cap.get(0).map(|m| m.start()).unwrap_or_default(),
            ImportRecord {
                specifier: cap[2].to_string(),
                attributes: parse_attributes(cap.get(3).map(|m| m.as_str())),
            },
        ));
    }

    for cap in EXPORT_FROM.captures_iter(source) {
        found.push((
            cap.get(0).map(|m| m.start()).unwrap_or_default(),
            ImportRecord {
                specifier: cap[3].to_string(),
                attributes: parse_attributes(cap.get(4).map(|m| m.as_str())),
            },
        ));
    }

    for regex in [&*REQUIRE_CALL, &*DYNAMIC_IMPORT] {
        for cap in regex.captures_iter(source) {
            found.push((
                cap.get(0).map(|m| m.start()).unwrap_or_default(),
                ImportRecord {
                    specifier: cap[1].to_string(),
                    attributes: BTreeMap::new(),
                },
            ));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, record)| record)
        .filter(|record| seen.insert(record.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specifiers(source: &str) -> Vec<String> {
        scan_imports(source).into_iter().map(|r| r.specifier).collect()
    }

    #[test]
    fn test_scan_imports() {
        let source = r#"
            import foo from 'foo';
            import { bar, baz as qux } from "bar";
            import * as all from 'all';
            import 'side-effect';
            const lazy = import("./lazy.js");
            const cjs = require('./cjs');
        "#;

        assert_eq!(
            specifiers(source),
            vec!["foo", "bar", "all", "side-effect", "./lazy.js", "./cjs"]
        );
    }

    #[test]
    fn test_scan_multiline_import() {
        let source = "import {\n  a,\n  b,\n} from './ab.js';\n";
        assert_eq!(specifiers(source), vec!["./ab.js"]);
    }

    #[test]
    fn test_scan_reexports() {
        let source = r#"
            export * from './a';
            export * as ns from './b';
            export { x, y as z } from './c';
            export const local = 1;
        "#;

        let records = scan_imports(source);
        let specifiers: Vec<_> = records.iter().map(|r| r.specifier.as_str()).collect();
        assert_eq!(specifiers, ["./a", "./b", "./c"]);
    }

    #[test]
    fn test_scan_attributes() {
        let source = r#"import data from "./a.data" with { type: "custom" };"#;
        let records = scan_imports(source);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attributes.get("type").map(String::as_str), Some("custom"));
        assert_eq!(records[0].key().attributes, "type=custom");
    }

    #[test]
    fn test_scan_deduplicates() {
        let source = "import a from './x';\nimport { b } from './x';\n";
        assert_eq!(specifiers(source), vec!["./x"]);
    }
}
