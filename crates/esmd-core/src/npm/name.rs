//! Package names, version shapes, and `name@version/sub` splitting.

/// Maximum length of an npm package name.
pub const MAX_NAME_LEN: usize = 214;

/// Registry dist-tags accepted in place of a version.
pub const DIST_TAGS: &[&str] = &[
    "latest",
    "next",
    "beta",
    "alpha",
    "canary",
    "rc",
    "experimental",
];

/// Node.js builtin modules, importable with or without the `node:` prefix.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "assert/strict",
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
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "stream/promises",
    "stream/web",
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
    "wasi",
    "worker_threads",
    "zlib",
];

/// A request path split into package name, version, and remaining subpath.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackagePathParts {
    pub name: String,
    /// Empty when the path carries no `@version`.
    pub version: String,
    /// Everything after the package segment(s), without a leading slash.
    pub sub_path: String,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+' | '$' | '!')
}

fn is_name_part(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// Validate an npm package name, scoped or not.
#[must_use]
pub fn validate_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if let Some(scoped) = name.strip_prefix('@') {
        let Some((scope, rest)) = scoped.split_once('/') else {
            return false;
        };
        return is_name_part(scope) && is_name_part(rest);
    }
    is_name_part(name)
}

/// `major.minor.patch` with numeric parts and an optional `-pre`/`+build` suffix.
#[must_use]
pub fn is_exact_version(version: &str) -> bool {
    let mut parts = version.splitn(3, '.');
    let (Some(major), Some(minor), Some(patch)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !numeric(major) || !numeric(minor) || patch.is_empty() {
        return false;
    }

    let bytes = patch.as_bytes();
    let mut suffix = false;
    for (i, &b) in bytes.iter().enumerate() {
        if suffix {
            if !(b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'+')) {
                return false;
            }
        } else if b == b'-' || b == b'+' {
            if i == 0 || i == bytes.len() - 1 {
                return false;
            }
            suffix = true;
        } else if !b.is_ascii_digit() {
            return false;
        }
    }
    true
}

/// A git commit hash or abbreviation: 7 to 40 hex digits.
#[must_use]
pub fn is_commitish(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[must_use]
pub fn is_dist_tag(s: &str) -> bool {
    DIST_TAGS.contains(&s)
}

/// Strip a leading `=` or `v` and map empty or `*` to `latest`.
#[must_use]
pub fn normalize_version(version: &str) -> String {
    let version = version.trim();
    let version = if let Some(rest) = version.strip_prefix('=') {
        rest
    } else if let Some(rest) = version.strip_prefix('v').filter(|rest| is_exact_version(rest)) {
        rest
    } else {
        version
    };
    if version.is_empty() || version == "*" {
        "latest".to_string()
    } else {
        version.to_string()
    }
}

/// `@types` package that carries declarations for `name`.
///
/// `@scope/pkg` maps to `@types/scope__pkg`.
#[must_use]
pub fn to_types_package_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(scoped) => format!("@types/{}", scoped.replacen('/', "__", 1)),
        None => format!("@types/{name}"),
    }
}

/// Whether a bare specifier names a Node.js builtin.
#[must_use]
pub fn is_node_builtin(specifier: &str) -> bool {
    let name = specifier.strip_prefix("node:").unwrap_or(specifier);
    NODE_BUILTINS.contains(&name)
}

/// Package name of a bare specifier such as `@scope/pkg/sub` or `pkg@1/sub`.
#[must_use]
pub fn package_name_of(specifier: &str) -> String {
    split_package_path(specifier).name
}

/// Split `[/]name[@version][/sub/path]`, handling `@scope/name`.
#[must_use]
pub fn split_package_path(pathname: &str) -> PackagePathParts {
    let trimmed = pathname.trim_start_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();

    let (name_and_version, rest) = if segments[0].starts_with('@') && segments.len() > 1 {
        (format!("{}/{}", segments[0], segments[1]), &segments[2..])
    } else {
        (segments[0].to_string(), &segments[1..])
    };

    let (name, version) = match name_and_version.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('@') {
            Some((name, version)) => (format!("@{name}"), version.trim().to_string()),
            None => (name_and_version.clone(), String::new()),
        },
        None => match name_and_version.split_once('@') {
            Some((name, version)) => (name.to_string(), version.trim().to_string()),
            None => (name_and_version.clone(), String::new()),
        },
    };

    PackagePathParts {
        name,
        version,
        sub_path: rest.join("/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_package_name() {
        assert!(validate_package_name("react"));
        assert!(validate_package_name("lodash.merge"));
        assert!(validate_package_name("@babel/core"));
        assert!(validate_package_name("$jquery!"));
        assert!(!validate_package_name(""));
        assert!(!validate_package_name("@scope"));
        assert!(!validate_package_name("@/name"));
        assert!(!validate_package_name("has space"));
        assert!(!validate_package_name("a/b"));
        assert!(!validate_package_name(&"a".repeat(215)));
        assert!(validate_package_name(&"a".repeat(214)));
    }

    #[test]
    fn test_is_exact_version() {
        assert!(is_exact_version("1.2.3"));
        assert!(is_exact_version("0.0.0-beta.1"));
        assert!(is_exact_version("1.2.3+build.5"));
        assert!(is_exact_version("19.0.0-rc-3edc000d-20240926"));
        assert!(!is_exact_version("1.2"));
        assert!(!is_exact_version("^1.2.3"));
        assert!(!is_exact_version("1.2.x"));
        assert!(!is_exact_version("1.2.3-"));
        assert!(!is_exact_version("1.2.-3"));
        assert!(!is_exact_version("latest"));
    }

    #[test]
    fn test_is_commitish() {
        assert!(is_commitish("a832a55"));
        assert!(is_commitish("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commitish("a832a5"));
        assert!(!is_commitish("main"));
        assert!(!is_commitish("0123456789abcdef0123456789abcdef012345678"));
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("=1.2.3"), "1.2.3");
        assert_eq!(normalize_version("v1.2.3"), "1.2.3");
        assert_eq!(normalize_version("v1"), "v1");
        assert_eq!(normalize_version(""), "latest");
        assert_eq!(normalize_version("*"), "latest");
        assert_eq!(normalize_version("^18"), "^18");
    }

    #[test]
    fn test_dist_tags() {
        assert!(is_dist_tag("next"));
        assert!(is_dist_tag("canary"));
        assert!(!is_dist_tag("stable"));
    }

    #[test]
    fn test_to_types_package_name() {
        assert_eq!(to_types_package_name("react"), "@types/react");
        assert_eq!(to_types_package_name("@babel/core"), "@types/babel__core");
    }

    #[test]
    fn test_is_node_builtin() {
        assert!(is_node_builtin("fs"));
        assert!(is_node_builtin("node:fs/promises"));
        assert!(!is_node_builtin("react"));
        assert!(!is_node_builtin("node:nope"));
    }

    #[test]
    fn test_split_package_path() {
        let parts = split_package_path("/react@18.2.0/jsx-runtime");
        assert_eq!(parts.name, "react");
        assert_eq!(parts.version, "18.2.0");
        assert_eq!(parts.sub_path, "jsx-runtime");

        let parts = split_package_path("@babel/core@^7/lib/index.js");
        assert_eq!(parts.name, "@babel/core");
        assert_eq!(parts.version, "^7");
        assert_eq!(parts.sub_path, "lib/index.js");

        let parts = split_package_path("preact");
        assert_eq!(parts.name, "preact");
        assert_eq!(parts.version, "");
        assert_eq!(parts.sub_path, "");

        let parts = split_package_path("@scope");
        assert_eq!(parts.name, "@scope");
    }

    #[test]
    fn test_package_name_of() {
        assert_eq!(package_name_of("@mui/material/Button"), "@mui/material");
        assert_eq!(package_name_of("lodash/merge"), "lodash");
    }
}
