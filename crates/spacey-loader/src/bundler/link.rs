// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module linking
//!
//! Rewrites every module of a bundle graph into a factory registered with a
//! tiny module registry, then appends the entry glue for the requested
//! output format:
//! - `import` declarations become `__require` calls plus bindings
//! - `export` declarations become getters on the module's `exports`
//! - externals stay real imports (ESM) or `require` calls (IIFE)

use super::plugin::OutputFormat;
use super::scan::{
    DYNAMIC_IMPORT, DepKey, EXPORT_FROM, REQUIRE_CALL, SIDE_EFFECT_IMPORT, STATIC_IMPORT,
    parse_attributes,
};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static EXPORT_DEFAULT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+))",
    )
    .expect("export default declaration pattern")
});

static EXPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+").expect("export default pattern")
});

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)export\s+((?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+))",
    )
    .expect("export declaration pattern")
});

static EXPORT_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+(const|let|var)\s+([\w$]+)").expect("export var pattern")
});

static EXPORT_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s*\{([^}]*)\}[ \t]*;?").expect("export list pattern")
});

const PRELUDE: &str = r#"var __defs = {};
var __cache = {};
function __define(id, factory) {
  __defs[id] = factory;
}
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var module = (__cache[id] = { exports: {} });
  __defs[id](module.exports, module);
  return module.exports;
}
function __export(target, getters) {
  if (!target.__esModule) Object.defineProperty(target, "__esModule", { value: true });
  Object.keys(getters).forEach(function (name) {
    Object.defineProperty(target, name, { get: getters[name], enumerable: true, configurable: true });
  });
}
function __reexport(target, source) {
  Object.keys(source).forEach(function (name) {
    if (name === "default" || Object.prototype.hasOwnProperty.call(target, name)) return;
    Object.defineProperty(target, name, { get: function () { return source[name]; }, enumerable: true, configurable: true });
  });
}
function __default(mod) {
  return mod && (mod.__esModule || mod[Symbol.toStringTag] === "Module") ? mod.default : mod;
}
"#;

/// Where a dependency of a module ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DepTarget {
    /// Bundled module id
    Module(usize),
    /// Left as a runtime import
    External(String),
    /// Could not be resolved; an error has been recorded
    Missing,
}

/// A module ready for linking; its id is its position in the graph
#[derive(Debug, Clone)]
pub(crate) struct LinkModule {
    /// Header comment label
    pub label: String,
    /// JavaScript source after `define` substitution
    pub source: String,
    /// Resolved dependencies keyed as scanned
    pub deps: HashMap<DepKey, DepTarget>,
}

/// `import` clause bindings
#[derive(Debug, Clone, PartialEq, Eq)]
enum ImportSpecifier {
    /// `import foo from`
    Default(String),
    /// `import { foo as bar } from`
    Named(String, String),
    /// `import * as foo from`
    Namespace(String),
}

fn parse_named(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once(" as ") {
            Some((imported, local)) => (imported.trim().to_string(), local.trim().to_string()),
            None => (part.to_string(), part.to_string()),
        })
        .collect()
}

fn parse_clause(clause: &str) -> Vec<ImportSpecifier> {
    let mut specs = Vec::new();
    let mut rest = clause.trim();

    if !rest.starts_with('{') && !rest.starts_with('*') {
        let (default, tail) = rest.split_once(',').unwrap_or((rest, ""));
        specs.push(ImportSpecifier::Default(default.trim().to_string()));
        rest = tail.trim();
    }

    if let Some(ns) = rest.strip_prefix('*') {
        let name = ns.trim().trim_start_matches("as").trim();
        specs.push(ImportSpecifier::Namespace(name.to_string()));
    } else if let Some(named) = rest.strip_prefix('{') {
        let named = named.trim_end().trim_end_matches('}');
        specs.extend(
            parse_named(named)
                .into_iter()
                .map(|(imported, local)| ImportSpecifier::Named(imported, local)),
        );
    }

    specs
}

fn bindings(specs: &[ImportSpecifier], temp: &str) -> String {
    let mut out = Vec::new();
    let mut named = Vec::new();

    for spec in specs {
        match spec {
            ImportSpecifier::Default(local) => {
                out.push(format!("const {} = __default({});", local, temp));
            }
            ImportSpecifier::Namespace(local) => out.push(format!("const {} = {};", local, temp)),
            ImportSpecifier::Named(imported, local) if imported == local => named.push(local.clone()),
            ImportSpecifier::Named(imported, local) => named.push(format!("{}: {}", imported, local)),
        }
    }

    if !named.is_empty() {
        out.push(format!("const {{ {} }} = {};", named.join(", "), temp));
    }
    out.join(" ")
}

/// Externals hoisted to the top of an ESM bundle, numbered by first use
#[derive(Debug, Default)]
struct Externals {
    order: Vec<String>,
    index: HashMap<String, usize>,
}

impl Externals {
    fn binding(&mut self, specifier: &str) -> String {
        let id = match self.index.get(specifier) {
            Some(id) => *id,
            None => {
                self.order.push(specifier.to_string());
                self.index.insert(specifier.to_string(), self.order.len() - 1);
                self.order.len() - 1
            }
        };
        format!("__ext{}", id)
    }
}

/// Result of rewriting a single module
#[derive(Debug, Default)]
struct Rewritten {
    code: String,
    exports: Vec<String>,
    stars: Vec<usize>,
    esm: bool,
}

struct Rewriter<'a> {
    deps: &'a HashMap<DepKey, DepTarget>,
    externals: &'a mut Externals,
    format: OutputFormat,
    temps: usize,
    getters: Vec<(String, String)>,
    exports: Vec<String>,
    stars: Vec<usize>,
    esm: bool,
}

impl<'a> Rewriter<'a> {
    fn target(&self, specifier: &str, attributes: Option<&str>) -> DepTarget {
        let key = DepKey::new(specifier, &parse_attributes(attributes));
        self.deps.get(&key).cloned().unwrap_or(DepTarget::Missing)
    }

    /// Value of an imported module namespace
    fn namespace(&mut self, target: &DepTarget) -> String {
        match target {
            DepTarget::Module(id) => format!("__require({})", id),
            DepTarget::External(spec) => match self.format {
                OutputFormat::Esm => self.externals.binding(spec),
                OutputFormat::Iife => format!("require({})", quote(spec)),
            },
            DepTarget::Missing => "({})".to_string(),
        }
    }

    /// Value a `require` call evaluates to
    fn required(&mut self, target: &DepTarget) -> String {
        match (target, self.format) {
            (DepTarget::External(spec), OutputFormat::Esm) => {
                format!("__default({})", self.externals.binding(spec))
            }
            _ => self.namespace(target),
        }
    }

    fn dynamic(&mut self, target: &DepTarget) -> String {
        match (target, self.format) {
            (DepTarget::External(spec), OutputFormat::Esm) => format!("import({})", quote(spec)),
            (DepTarget::Missing, _) => "Promise.resolve({})".to_string(),
            _ => format!("Promise.resolve().then(() => {})", self.namespace(target)),
        }
    }

    fn temp(&mut self) -> String {
        let name = format!("__m{}", self.temps);
        self.temps += 1;
        name
    }

    fn export(&mut self, name: &str, getter: impl Into<String>) {
        self.getters.push((name.to_string(), getter.into()));
        self.exports.push(name.to_string());
    }

    fn rewrite(mut self, source: &str) -> Rewritten {
        let code = REQUIRE_CALL
            .replace_all(source, |cap: &Captures| {
                let target = self.target(&cap[1], None);
                self.required(&target)
            })
            .into_owned();

        let code = DYNAMIC_IMPORT
            .replace_all(&code, |cap: &Captures| {
                let target = self.target(&cap[1], None);
                self.dynamic(&target)
            })
            .into_owned();

        let code = STATIC_IMPORT
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                let target = self.target(&cap[3], cap.get(4).map(|m| m.as_str()));
                let value = self.namespace(&target);
                let temp = self.temp();
                format!(
                    "{}const {} = {}; {}",
                    &cap[1],
                    temp,
                    value,
                    bindings(&parse_clause(&cap[2]), &temp)
                )
            })
            .into_owned();

        let code = SIDE_EFFECT_IMPORT
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                let target = self.target(&cap[2], cap.get(3).map(|m| m.as_str()));
                format!("{}{};", &cap[1], self.namespace(&target))
            })
            .into_owned();

        let code = EXPORT_FROM
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                let target = self.target(&cap[3], cap.get(4).map(|m| m.as_str()));
                let value = self.namespace(&target);
                let clause = cap[2].trim();

                if clause == "*" {
                    if let DepTarget::Module(id) = target {
                        self.stars.push(id);
                    }
                    return format!("{}__reexport(exports, {});", &cap[1], value);
                }

                let temp = self.temp();
                if let Some(ns) = clause.strip_prefix('*') {
                    let name = ns.trim().trim_start_matches("as").trim().to_string();
                    self.export(&name, temp.clone());
                } else {
                    let list = clause.trim_start_matches('{').trim_end_matches('}');
                    for (imported, exported) in parse_named(list) {
                        self.export(&exported, format!("{}.{}", temp, imported));
                    }
                }
                format!("{}const {} = {};", &cap[1], temp, value)
            })
            .into_owned();

        let code = EXPORT_DEFAULT_DECL
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                let name = cap.get(3).or_else(|| cap.get(4)).map(|m| m.as_str()).unwrap_or_default();
                self.export("default", name);
                format!("{}{}", &cap[1], &cap[2])
            })
            .into_owned();

        let code = EXPORT_DEFAULT
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                self.exports.push("default".to_string());
                format!("{}exports.default = ", &cap[1])
            })
            .into_owned();

        let code = EXPORT_DECL
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                let name = cap.get(3).or_else(|| cap.get(4)).map(|m| m.as_str()).unwrap_or_default();
                self.export(name, name);
                format!("{}{}", &cap[1], &cap[2])
            })
            .into_owned();

        let code = EXPORT_VAR
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                self.export(&cap[3], &cap[3]);
                format!("{}{} {}", &cap[1], &cap[2], &cap[3])
            })
            .into_owned();

        let code = EXPORT_LIST
            .replace_all(&code, |cap: &Captures| {
                self.esm = true;
                for (local, exported) in parse_named(&cap[2]) {
                    self.export(&exported, local);
                }
                cap[1].to_string()
            })
            .into_owned();

        let code = if self.esm {
            let getters = self
                .getters
                .iter()
                .map(|(name, value)| format!("{}: () => {}", name, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("__export(exports, {{ {} }});\n{}", getters, code)
        } else {
            code
        };

        Rewritten {
            code,
            exports: self.exports,
            stars: self.stars,
            esm: self.esm,
        }
    }
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn indent(code: &str, prefix: &str) -> String {
    code.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Named exports of `id`, following `export *` chains
fn export_names(id: usize, rewritten: &[Rewritten], seen: &mut HashSet<usize>) -> Vec<String> {
    if !seen.insert(id) {
        return Vec::new();
    }
    let mut names: Vec<String> = rewritten[id]
        .exports
        .iter()
        .filter(|name| name.as_str() != "default")
        .cloned()
        .collect();
    for star in &rewritten[id].stars {
        for name in export_names(*star, rewritten, seen) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Link `modules` into one artifact; module 0 is the entry
pub(crate) fn link(modules: &[LinkModule], format: OutputFormat, global_name: Option<&str>) -> String {
    if modules.is_empty() {
        return String::new();
    }

    let mut externals = Externals::default();
    let rewritten: Vec<Rewritten> = modules
        .iter()
        .map(|module| {
            Rewriter {
                deps: &module.deps,
                externals: &mut externals,
                format,
                temps: 0,
                getters: Vec::new(),
                exports: Vec::new(),
                stars: Vec::new(),
                esm: false,
            }
            .rewrite(&module.source)
        })
        .collect();

    let mut body = String::from(PRELUDE);
    for (id, (module, linked)) in modules.iter().zip(&rewritten).enumerate() {
        body.push_str(&format!("// {}\n", module.label));
        body.push_str(&format!("__define({}, function (exports, module) {{\n", id));
        body.push_str(&indent(&linked.code, "  "));
        body.push_str("\n});\n");
    }

    match format {
        OutputFormat::Esm => {
            let mut out = String::new();
            for (id, spec) in externals.order.iter().enumerate() {
                out.push_str(&format!("import * as __ext{} from {};\n", id, quote(spec)));
            }
            out.push_str(&body);
            out.push_str("var __entry = __require(0);\n");

            let entry = &rewritten[0];
            if entry.esm {
                if entry.exports.iter().any(|name| name == "default") {
                    out.push_str("export default __entry.default;\n");
                }
                let names = export_names(0, &rewritten, &mut HashSet::new());
                if !names.is_empty() {
                    out.push_str(&format!("export const {{ {} }} = __entry;\n", names.join(", ")));
                }
            } else {
                out.push_str("export default __entry;\n");
            }
            out
        }
        OutputFormat::Iife => {
            let inner = indent(&body, "  ");
            match global_name {
                Some(name) => format!(
                    "var {} = (function () {{\n{}\n  return __require(0);\n}})();\n",
                    name, inner
                ),
                None => format!("(function () {{\n{}\n  __require(0);\n}})();\n", inner),
            }
        }
    }
}

/// Replace identifier paths named in `define` with their values
///
/// Substitution is a single pass, so inserted values are never rewritten
/// again. The longest key wins where keys overlap (`process.env.X` before
/// `process`).
pub(crate) fn apply_define(source: &str, define: &BTreeMap<String, String>) -> String {
    if define.is_empty() {
        return source.to_string();
    }

    let mut keys: Vec<&String> = define.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = keys
        .iter()
        .map(|key| regex::escape(key))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&format!(r"(^|[^\w$.])({})\b", alternation)) {
        Ok(regex) => regex
            .replace_all(source, |cap: &Captures| {
                let value = define.get(&cap[2]).map(String::as_str).unwrap_or(&cap[2]);
                format!("{}{}", &cap[1], value)
            })
            .into_owned(),
        Err(_) => source.to_string(),
    }
}
