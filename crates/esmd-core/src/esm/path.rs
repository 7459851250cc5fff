//! Request paths and canonical build paths.
//!
//! A request path names a package and optionally a version, a subpath, or a
//! fully built artifact:
//!
//! ```text
//! /react@18.2.0/jsx-runtime
//! /gh/owner/repo@v1.0.0/lib/index.js
//! /pr/tinybench@a832a55
//! /jsr/@luca/flag@0.0.1
//! /react@18.2.0/X-ZHByZWFjdA/es2022/jsx-runtime.mjs
//! ```
//!
//! [`parse_esm_path`] splits a path without touching the network;
//! [`PathResolver`] additionally pins the version and decodes the build
//! segment.

use super::args::BuildArgs;
use super::target::Target;
use crate::error::{Error, Result};
use crate::npm::{
    is_commitish, is_exact_version, resolve_github_ref, split_package_path,
    validate_package_name, GitRefLister, PackageMetadataProvider, PackageSource,
};
use esmd_util::hash::blake3_bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Module extensions stripped from a subpath to form its module name.
pub const ES_EXTS: &[&str] = &[".mjs", ".js", ".jsx", ".mts", ".ts", ".tsx", ".cjs"];

/// Build segments longer than this are hashed in save paths.
const MAX_ARGS_SEGMENT_LEN: usize = 42;

/// A package reference: who, which version, and which module inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EsmPath {
    /// `pkg_name` is a GitHub `owner/repo`.
    pub gh: bool,
    /// Published through pkg.pr.new.
    pub pr: bool,
    pub pkg_name: String,
    pub pkg_version: String,
    /// Subpath as requested, extension included.
    pub sub_path: String,
    /// `sub_path` without its module extension; empty for the package root.
    pub sub_module_name: String,
}

/// Drop one trailing module extension. Declaration files keep theirs.
#[must_use]
pub fn strip_module_ext(path: &str) -> &str {
    if path.ends_with(".d.ts") || path.ends_with(".d.mts") || path.ends_with(".d.cts") {
        return path;
    }
    ES_EXTS
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path)
}

impl EsmPath {
    pub fn new(pkg_name: impl Into<String>, pkg_version: impl Into<String>) -> Self {
        Self {
            pkg_name: pkg_name.into(),
            pkg_version: pkg_version.into(),
            ..Default::default()
        }
    }

    /// Same package, different module.
    #[must_use]
    pub fn with_sub_path(mut self, sub_path: &str) -> Self {
        let sub_path = sub_path.trim_start_matches("./").trim_matches('/');
        self.sub_path = sub_path.to_string();
        self.sub_module_name = strip_module_ext(sub_path).to_string();
        self
    }

    /// `[gh/|pr/]name[@version]`
    #[must_use]
    pub fn name(&self) -> String {
        let mut name = self.pkg_name.clone();
        if !self.pkg_version.is_empty() && self.pkg_version != "*" && self.pkg_version != "latest"
        {
            name.push('@');
            name.push_str(&self.pkg_version);
        }
        if self.gh {
            format!("gh/{name}")
        } else if self.pr {
            format!("pr/{name}")
        } else {
            name
        }
    }

    /// `name()` plus `/submodule` when there is one.
    #[must_use]
    pub fn specifier(&self) -> String {
        if self.sub_module_name.is_empty() {
            self.name()
        } else {
            format!("{}/{}", self.name(), self.sub_module_name)
        }
    }

    /// Last segment of the package name without a `.js` suffix.
    #[must_use]
    pub fn base_name(&self) -> &str {
        let base = self.pkg_name.rsplit('/').next().unwrap_or(&self.pkg_name);
        base.strip_suffix(".js").unwrap_or(base)
    }

    #[must_use]
    pub fn package_source(&self) -> PackageSource {
        PackageSource {
            name: self.pkg_name.clone(),
            version: self.pkg_version.clone(),
            github: self.gh,
            pkg_pr_new: self.pr,
        }
    }

    /// Whether the version is pinned (exact semver, or a commit for git sources).
    #[must_use]
    pub fn has_fixed_version(&self) -> bool {
        if self.gh {
            is_commitish(&self.pkg_version)
                || is_exact_version(self.pkg_version.trim_start_matches('v'))
        } else if self.pr {
            is_commitish(&self.pkg_version)
        } else {
            is_exact_version(&self.pkg_version)
        }
    }

    fn prefix(&self) -> &'static str {
        if self.gh {
            "gh/"
        } else if self.pr {
            "pr/"
        } else {
            ""
        }
    }

    /// Canonical URL path of a built module:
    /// `/{gh/|pr/}{name}@{version}/{X-args/}{target}/{module}.mjs`.
    ///
    /// The root module is named after the package; a submodule that shares
    /// that name is written `__{name}` to keep the two apart.
    #[must_use]
    pub fn build_path(&self, args: &BuildArgs, target: Target, dev: bool) -> String {
        let mut module = if self.sub_module_name.is_empty() {
            self.base_name().to_string()
        } else if self.sub_module_name == self.base_name() {
            format!("__{}", self.sub_module_name)
        } else {
            self.sub_module_name.clone()
        };
        if dev {
            module.push_str(".development");
        }
        let args = args
            .path_segment(&self.pkg_name, false)
            .map(|s| format!("{s}/"))
            .unwrap_or_default();
        format!(
            "/{}{}@{}/{args}{target}/{module}.mjs",
            self.prefix(),
            self.pkg_name,
            self.pkg_version
        )
    }

    /// Canonical URL path of a declaration file: `/{name}@{version}/{X-args/}{dts}`.
    #[must_use]
    pub fn types_path(&self, args: &BuildArgs, dts: &str) -> String {
        let args = args
            .path_segment(&self.pkg_name, true)
            .map(|s| format!("{s}/"))
            .unwrap_or_default();
        format!(
            "/{}{}@{}/{args}{}",
            self.prefix(),
            self.pkg_name,
            self.pkg_version,
            dts.trim_start_matches("./")
        )
    }
}

/// Storage key for a canonical path: `X-` segments longer than 42 bytes
/// are replaced by `X-<blake3 hex>`.
#[must_use]
pub fn normalize_save_path(pathname: &str) -> String {
    pathname
        .split('/')
        .map(|seg| {
            if seg.starts_with("X-") && seg.len() > MAX_ARGS_SEGMENT_LEN {
                format!("X-{}", blake3_bytes(seg.as_bytes()))
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Result of [`parse_esm_path`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedEsmPath {
    pub esm: EsmPath,
    /// Text after `&` in the version segment (`react@18&dev`).
    pub extra_query: String,
    /// The version in the path was already pinned.
    pub exact_version: bool,
    /// The subpath is a built artifact (`[X-args/]target/module`).
    pub has_target_segment: bool,
}

fn has_target_segment(sub_path: &str) -> bool {
    let segments: Vec<&str> = sub_path.split('/').collect();
    if segments.len() < 2 {
        return false;
    }
    if segments[0].starts_with("X-") && segments.len() > 2 {
        return Target::from_segment(segments[1]).is_some();
    }
    Target::from_segment(segments[0]).is_some()
}

fn jsr_to_npm(rest: &str) -> Result<String> {
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.len() < 2 || !segments[0].starts_with('@') {
        return Err(Error::invalid_spec("invalid jsr path"));
    }
    let mut pathname = format!("/@jsr/{}__{}", &segments[0][1..], segments[1]);
    if segments.len() > 2 {
        pathname.push('/');
        pathname.push_str(&segments[2..].join("/"));
    }
    Ok(pathname)
}

/// Drop a leading server build tag such as `/v135`.
fn strip_version_tag(pathname: &str) -> &str {
    let Some(rest) = pathname.strip_prefix("/v") else {
        return pathname;
    };
    match rest.split_once('/') {
        Some((digits, tail))
            if !digits.is_empty()
                && !tail.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            &pathname[digits.len() + 2..]
        }
        _ => pathname,
    }
}

/// Split a request path into a package reference. No network access.
///
/// The version may still be a range, tag, or branch; see [`PathResolver`].
pub fn parse_esm_path(pathname: &str) -> Result<ParsedEsmPath> {
    let pathname = strip_version_tag(pathname);
    for prefix in ["/pr/", "/pkg.pr.new/"] {
        if let Some(rest) = pathname.strip_prefix(prefix) {
            return parse_pr_path(rest);
        }
    }

    let mut gh = false;
    let pathname = if let Some(rest) = pathname
        .strip_prefix("/gh/")
        .or_else(|| pathname.strip_prefix("/github.com/"))
    {
        if !rest.contains('/') {
            return Err(Error::invalid_spec(format!("invalid path '{pathname}'")));
        }
        gh = true;
        // Parse `owner/repo` like a scoped name
        format!("/@{rest}")
    } else if let Some(rest) = pathname
        .strip_prefix("/jsr/")
        .or_else(|| pathname.strip_prefix("/jsr.io/"))
    {
        jsr_to_npm(rest)?
    } else {
        pathname.to_string()
    };

    let parts = split_package_path(&pathname);
    if !validate_package_name(&parts.name) {
        return Err(Error::invalid_spec(format!(
            "invalid package name '{}'",
            parts.name
        )));
    }
    let pkg_name = if gh {
        parts.name[1..].to_string()
    } else {
        parts.name
    };

    let (version, extra_query) = match parts.version.split_once('&') {
        Some((v, q)) => (v.to_string(), q.to_string()),
        None => (parts.version, String::new()),
    };
    let version = urlencoding::decode(&version)
        .map(|v| v.into_owned())
        .unwrap_or(version);

    let exact_version = if gh {
        is_exact_version(version.trim_start_matches('v')) || is_commitish(&version)
    } else {
        !version.is_empty() && is_exact_version(&version)
    };

    let esm = EsmPath {
        gh,
        pkg_name,
        pkg_version: version,
        ..Default::default()
    }
    .with_sub_path(&parts.sub_path);

    Ok(ParsedEsmPath {
        has_target_segment: has_target_segment(&parts.sub_path),
        esm,
        extra_query,
        exact_version,
    })
}

fn parse_pr_path(rest: &str) -> Result<ParsedEsmPath> {
    let invalid = || Error::invalid_spec(format!("invalid pkg.pr.new path '{rest}'"));
    let (pkg_name, tail) = rest.rsplit_once('@').ok_or_else(invalid)?;
    let (version, sub_path) = tail.split_once('/').unwrap_or((tail, ""));
    let valid_version = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+'));
    if !valid_version || !validate_package_name(pkg_name) {
        return Err(invalid());
    }

    let esm = EsmPath {
        pr: true,
        pkg_name: pkg_name.to_string(),
        pkg_version: version.to_string(),
        ..Default::default()
    }
    .with_sub_path(sub_path);

    Ok(ParsedEsmPath {
        exact_version: is_commitish(version),
        has_target_segment: has_target_segment(sub_path),
        esm,
        extra_query: String::new(),
    })
}

/// A request path resolved to a pinned package and, for artifact paths,
/// the build it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub esm: EsmPath,
    pub args: BuildArgs,
    /// Set for artifact paths (`.../es2022/mod.mjs`).
    pub target: Option<Target>,
    pub dev: bool,
    /// The request already carried the pinned version.
    pub exact_version: bool,
    pub extra_query: String,
}

/// Resolves request paths against registry and git metadata.
pub struct PathResolver {
    metadata: Arc<dyn PackageMetadataProvider>,
    git: Arc<dyn GitRefLister>,
}

impl PathResolver {
    pub fn new(metadata: Arc<dyn PackageMetadataProvider>, git: Arc<dyn GitRefLister>) -> Self {
        Self { metadata, git }
    }

    /// Pin the version of `esm` in place.
    pub fn pin_version(&self, esm: &mut EsmPath) -> Result<()> {
        if esm.has_fixed_version() {
            return Ok(());
        }
        if esm.pr {
            return Err(Error::not_found(format!(
                "pkg.pr.new: '{}' is not a commit",
                esm.pkg_version
            )));
        }
        if esm.gh {
            let refs = self.git.list_refs(&esm.pkg_name)?;
            let sha = resolve_github_ref(&refs, &esm.pkg_version)?;
            debug!(repo = %esm.pkg_name, wanted = %esm.pkg_version, %sha, "resolved github ref");
            esm.pkg_version = sha;
            return Ok(());
        }
        let version = self
            .metadata
            .resolve_version(&esm.pkg_name, &esm.pkg_version)?;
        debug!(pkg = %esm.pkg_name, wanted = %esm.pkg_version, %version, "resolved version");
        esm.pkg_version = version;
        Ok(())
    }

    /// Parse `pathname`, pin its version, and decode an artifact segment.
    pub fn resolve(&self, pathname: &str) -> Result<ResolvedRequest> {
        let parsed = parse_esm_path(pathname)?;
        let mut esm = parsed.esm;
        self.pin_version(&mut esm)?;

        let mut resolved = ResolvedRequest {
            esm,
            args: BuildArgs::default(),
            target: None,
            dev: false,
            exact_version: parsed.exact_version,
            extra_query: parsed.extra_query,
        };
        if parsed.has_target_segment {
            decode_artifact_path(&mut resolved)?;
        }
        Ok(resolved)
    }
}

/// Turn `[X-args/]target/module.mjs` in `sub_path` into args, target, and module.
fn decode_artifact_path(resolved: &mut ResolvedRequest) -> Result<()> {
    let sub_path = resolved.esm.sub_path.clone();
    let mut segments = sub_path.split('/');
    let mut head = segments.next().unwrap_or_default();
    if let Some(token) = head.strip_prefix("X-") {
        resolved.args = BuildArgs::decode(token)?.prune(&resolved.esm.pkg_name);
        head = segments.next().unwrap_or_default();
    }
    resolved.target = Some(head.parse()?);

    let file = segments.collect::<Vec<_>>().join("/");
    let mut module = strip_module_ext(&file);
    if let Some(stem) = module.strip_suffix(".development") {
        resolved.dev = true;
        module = stem;
    }

    let base = resolved.esm.base_name().to_string();
    let sub = if module == base {
        ""
    } else if module.strip_prefix("__") == Some(base.as_str()) {
        base.as_str()
    } else {
        module
    };
    let sub = sub.to_string();
    resolved.esm = std::mem::take(&mut resolved.esm).with_sub_path(&sub);
    Ok(())
}
