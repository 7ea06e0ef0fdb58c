// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host built-in module table

/// Built-in module names (without the `node:` scheme)
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Built-in subpath modules
pub const BUILTIN_SUBPATHS: &[&str] = &[
    "assert/strict",
    "dns/promises",
    "fs/promises",
    "path/posix",
    "path/win32",
    "readline/promises",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "timers/promises",
    "util/types",
];

/// Modules that only exist under the `node:` scheme
const SCHEME_ONLY: &[&str] = &["sea", "sqlite", "test", "test/reporters"];

/// Check whether `specifier` names a host built-in module
pub fn is_builtin(specifier: &str) -> bool {
    match specifier.strip_prefix("node:") {
        Some(name) => {
            SCHEME_ONLY.contains(&name)
                || BUILTIN_MODULES.contains(&name)
                || BUILTIN_SUBPATHS.contains(&name)
        }
        None => BUILTIN_MODULES.contains(&specifier) || BUILTIN_SUBPATHS.contains(&specifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("path"));
        assert!(is_builtin("node:fs"));
        assert!(is_builtin("fs/promises"));
        assert!(is_builtin("node:test"));
        assert!(!is_builtin("test"));
        assert!(!is_builtin("lodash"));
        assert!(!is_builtin("./fs"));
    }
}
