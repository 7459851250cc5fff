//! Dependency version sources.
//!
//! A `dependencies` value may point somewhere other than the npm registry:
//!
//! - `npm:react@19.0.0` (alias to another npm package)
//! - `jsr:@luca/flag@0.0.1` (mirrored as `@jsr/luca__flag`)
//! - `github:owner/repo#semver:1.2.3`, `git+https://github.com/owner/repo.git#ref`
//! - `owner/repo#ref` (GitHub shorthand)
//! - `https://pkg.pr.new/name@abc1234`
//!
//! `file:` dependencies are rejected.

use super::name::{split_package_path, validate_package_name};
use crate::error::{Error, Result};
use url::Url;

/// Where a dependency actually comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageSource {
    pub name: String,
    pub version: String,
    /// `name` is a GitHub `owner/repo`.
    pub github: bool,
    /// Published through pkg.pr.new; `version` is a commit.
    pub pkg_pr_new: bool,
}

fn git_fragment_version(fragment: &str) -> String {
    fragment
        .strip_prefix("semver:")
        .unwrap_or(fragment)
        .to_string()
}

fn split_fragment(s: &str) -> (&str, &str) {
    s.rsplit_once('#').unwrap_or((s, ""))
}

/// Parse a dependency version string.
///
/// Returns `Ok(None)` when the value is a plain npm range or tag.
pub fn parse_dependency_source(value: &str) -> Result<Option<PackageSource>> {
    if value.starts_with("file:") {
        return Err(Error::invalid_spec(format!(
            "unsupported file dependency '{value}'"
        )));
    }

    if let Some(rest) = value.strip_prefix("npm:") {
        let parts = split_package_path(rest);
        if !validate_package_name(&parts.name) {
            return Err(Error::invalid_spec(format!("invalid npm dependency '{value}'")));
        }
        return Ok(Some(PackageSource {
            name: parts.name,
            version: parts.version,
            ..Default::default()
        }));
    }

    if let Some(rest) = value.strip_prefix("jsr:") {
        let parts = split_package_path(rest);
        let Some((scope, name)) = parts
            .name
            .strip_prefix('@')
            .and_then(|scoped| scoped.split_once('/'))
        else {
            return Err(Error::invalid_spec(format!("invalid jsr dependency '{value}'")));
        };
        return Ok(Some(PackageSource {
            name: format!("@jsr/{scope}__{name}"),
            version: parts.version,
            ..Default::default()
        }));
    }

    if let Some(rest) = value.strip_prefix("github:") {
        let (repo, fragment) = split_fragment(rest);
        return Ok(Some(PackageSource {
            name: repo.to_string(),
            version: git_fragment_version(fragment),
            github: true,
            ..Default::default()
        }));
    }

    for scheme in ["git+ssh://", "git+https://", "git://"] {
        if let Some(rest) = value.strip_prefix(scheme) {
            return parse_git_url(value, rest).map(Some);
        }
    }

    if value.starts_with("https://") || value.starts_with("http://") {
        return parse_pkg_pr_new(value).map(Some);
    }

    if !value.starts_with('@') && value.contains('/') {
        let (repo, fragment) = split_fragment(value);
        return Ok(Some(PackageSource {
            name: repo.to_string(),
            version: git_fragment_version(fragment),
            github: true,
            ..Default::default()
        }));
    }

    Ok(None)
}

/// `user@github.com:owner/repo.git#ref` or `github.com/owner/repo.git#ref`.
fn parse_git_url(value: &str, rest: &str) -> Result<PackageSource> {
    let unsupported = || Error::invalid_spec(format!("unsupported git dependency '{value}'"));

    let (location, fragment) = split_fragment(rest);
    let (authority, path) = location.split_once('/').unwrap_or((location, ""));
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let (host, scp_owner) = match host_port.split_once(':') {
        Some((host, port)) => (host, port),
        None => (host_port, ""),
    };
    if host != "github.com" {
        return Err(unsupported());
    }

    let path = path.trim_end_matches(".git");
    let repo = match (scp_owner, path) {
        (owner, path) if !owner.is_empty() && owner.bytes().all(|b| b.is_ascii_digit()) => {
            path.to_string()
        }
        ("", path) => path.to_string(),
        (owner, path) => format!("{owner}/{path}"),
    };
    if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
        return Err(unsupported());
    }

    Ok(PackageSource {
        name: repo,
        version: git_fragment_version(fragment),
        github: true,
        ..Default::default()
    })
}

fn parse_pkg_pr_new(value: &str) -> Result<PackageSource> {
    let unsupported = || Error::invalid_spec(format!("unsupported http dependency '{value}'"));

    let url = Url::parse(value).map_err(|_| unsupported())?;
    if url.host_str() != Some("pkg.pr.new") {
        return Err(unsupported());
    }
    let path = url.path().trim_start_matches('/');
    let (name, rest) = path.rsplit_once('@').ok_or_else(unsupported)?;
    let version = rest.split('/').next().unwrap_or_default();
    let valid_version = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+'));
    if name.is_empty() || !valid_version {
        return Err(unsupported());
    }

    Ok(PackageSource {
        name: name.to_string(),
        version: version.to_string(),
        pkg_pr_new: true,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_range_is_none() {
        assert_eq!(parse_dependency_source("^18.2.0").unwrap(), None);
        assert_eq!(parse_dependency_source("latest").unwrap(), None);
        assert_eq!(parse_dependency_source("").unwrap(), None);
    }

    #[test]
    fn test_npm_alias() {
        let src = parse_dependency_source("npm:react@19.0.0").unwrap().unwrap();
        assert_eq!(src.name, "react");
        assert_eq!(src.version, "19.0.0");
        assert!(!src.github);

        let src = parse_dependency_source("npm:@preact/compat@^17").unwrap().unwrap();
        assert_eq!(src.name, "@preact/compat");
        assert_eq!(src.version, "^17");

        assert!(parse_dependency_source("npm:bad name").is_err());
    }

    #[test]
    fn test_jsr() {
        let src = parse_dependency_source("jsr:@luca/flag@0.0.1").unwrap().unwrap();
        assert_eq!(src.name, "@jsr/luca__flag");
        assert_eq!(src.version, "0.0.1");
        assert!(parse_dependency_source("jsr:flag@1").is_err());
    }

    #[test]
    fn test_github_forms() {
        let src = parse_dependency_source("github:facebook/react#semver:19.0.0")
            .unwrap()
            .unwrap();
        assert!(src.github);
        assert_eq!(src.name, "facebook/react");
        assert_eq!(src.version, "19.0.0");

        let src = parse_dependency_source("git+https://github.com/ije/es-module-lexer.git#main")
            .unwrap()
            .unwrap();
        assert_eq!(src.name, "ije/es-module-lexer");
        assert_eq!(src.version, "main");

        let src = parse_dependency_source("git+ssh://git@github.com:owner/repo.git#v1.0.0")
            .unwrap()
            .unwrap();
        assert_eq!(src.name, "owner/repo");
        assert_eq!(src.version, "v1.0.0");

        let src = parse_dependency_source("owner/repo#abc1234").unwrap().unwrap();
        assert!(src.github);
        assert_eq!(src.name, "owner/repo");
        assert_eq!(src.version, "abc1234");

        assert!(parse_dependency_source("git+https://gitlab.com/owner/repo.git").is_err());
    }

    #[test]
    fn test_pkg_pr_new() {
        let src = parse_dependency_source("https://pkg.pr.new/tinybench@a832a55")
            .unwrap()
            .unwrap();
        assert!(src.pkg_pr_new);
        assert_eq!(src.name, "tinybench");
        assert_eq!(src.version, "a832a55");

        assert!(parse_dependency_source("https://example.com/tinybench@a832a55").is_err());
        assert!(parse_dependency_source("https://pkg.pr.new/tinybench").is_err());
    }

    #[test]
    fn test_file_rejected() {
        let err = parse_dependency_source("file:../local").unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
    }
}
