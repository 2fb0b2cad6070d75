//! Module resolution for sandboxed bundles.
//!
//! Bundles leave a fixed set of imports unresolved (see
//! [`bundler_externals`]); at run time the sandbox's `require` asks
//! [`resolve`] what each name maps to. The mapping is total: every string
//! resolves to something, unknown names included.

/// Component library plus its automatic JSX runtime helpers.
pub const UI_LIBRARY_MODULES: &[&str] = &["react", "react/jsx-runtime", "react/jsx-dev-runtime"];

/// Host integration API surface, served by the shim.
pub const HOST_API_MODULES: &[&str] = &["@nova/api", "@raycast/api"];

/// Prefix under which host builtins may also be imported.
pub const BUILTIN_PREFIX: &str = "node:";

/// Host builtin modules replaced by inert stubs.
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
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "stream/promises",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// What a module name resolves to inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The shared component library singleton.
    UiLibrary,
    /// The host API shim.
    HostApi,
    /// An inert stub for a host builtin (canonical, unprefixed name).
    Builtin(&'static str),
    /// Anything else; served as an empty object.
    Unknown,
}

impl Resolution {
    /// Compact tag understood by the JavaScript loader.
    pub fn tag(&self) -> String {
        match self {
            Resolution::UiLibrary => "ui".to_string(),
            Resolution::HostApi => "api".to_string(),
            Resolution::Builtin(name) => format!("builtin:{}", name),
            Resolution::Unknown => "unknown".to_string(),
        }
    }
}

/// Resolve a module specifier. Never fails.
pub fn resolve(specifier: &str) -> Resolution {
    if UI_LIBRARY_MODULES.contains(&specifier) {
        return Resolution::UiLibrary;
    }
    if HOST_API_MODULES.contains(&specifier) {
        return Resolution::HostApi;
    }

    let bare = specifier.strip_prefix(BUILTIN_PREFIX).unwrap_or(specifier);
    if let Some(name) = BUILTIN_MODULES.iter().find(|name| **name == bare) {
        return Resolution::Builtin(name);
    }

    Resolution::Unknown
}

/// Module names the bundler must leave external.
///
/// Builtins are listed under both bare and prefixed spellings.
pub fn bundler_externals() -> Vec<String> {
    let mut externals: Vec<String> = UI_LIBRARY_MODULES
        .iter()
        .chain(HOST_API_MODULES.iter())
        .map(|s| s.to_string())
        .collect();

    for name in BUILTIN_MODULES {
        externals.push(name.to_string());
        externals.push(format!("{}{}", BUILTIN_PREFIX, name));
    }

    externals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_precedence() {
        assert_eq!(resolve("react"), Resolution::UiLibrary);
        assert_eq!(resolve("react/jsx-runtime"), Resolution::UiLibrary);
        assert_eq!(resolve("@nova/api"), Resolution::HostApi);
        assert_eq!(resolve("@raycast/api"), Resolution::HostApi);
        assert_eq!(resolve("fs"), Resolution::Builtin("fs"));
        assert_eq!(resolve("node:fs"), Resolution::Builtin("fs"));
        assert_eq!(resolve("node:fs/promises"), Resolution::Builtin("fs/promises"));
        assert_eq!(resolve("left-pad"), Resolution::Unknown);
    }

    #[test]
    fn test_resolution_is_total() {
        let odd = [
            "",
            "node:",
            "node:node:fs",
            "../relative",
            "./local.js",
            "\0",
            "react/",
            "REACT",
            "fs/promises/extra",
            "💥",
            "@nova",
            "@nova/api/sub",
        ];
        for name in odd {
            assert_eq!(resolve(name), Resolution::Unknown, "{:?}", name);
        }
    }

    #[test]
    fn test_tags() {
        assert_eq!(resolve("react").tag(), "ui");
        assert_eq!(resolve("@nova/api").tag(), "api");
        assert_eq!(resolve("node:path").tag(), "builtin:path");
        assert_eq!(resolve("lodash").tag(), "unknown");
    }

    #[test]
    fn test_externals_cover_both_spellings() {
        let externals = bundler_externals();
        assert!(externals.contains(&"react".to_string()));
        assert!(externals.contains(&"react/jsx-runtime".to_string()));
        assert!(externals.contains(&"@nova/api".to_string()));
        for name in BUILTIN_MODULES {
            assert!(externals.contains(&name.to_string()));
            assert!(externals.contains(&format!("node:{}", name)));
        }
    }
}
