//! Import rewriting for a package being built.
//!
//! Every import the bundler meets is classified as bundled, left external,
//! dropped, or rewritten to the canonical URL of another build. The output
//! is part of the built module's bytes, so the same specifier, constraint,
//! and arguments always produce the same URL.

use crate::error::Result;
use crate::esm::{fix_build_args, is_namespace, BuildArgs, DepGraphWalker, EsmPath, Target};
use crate::npm::{
    is_node_builtin, normalize_version, package_name_of, parse_dependency_source,
    resolve_github_ref, split_package_path, GitRefLister, PackageManifest,
    PackageMetadataProvider,
};
use std::fmt;
use tracing::{debug, trace};

/// Node polyfills for the legacy `deno` target.
const DENO_STD_NODE: &str = "https://deno.land/std@0.177.1/node";

/// What happens to one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResolution {
    /// Inlined into the importing module.
    Bundle,
    /// Kept as an import of the given specifier.
    External(String),
    /// Replaced by an import of the given URL path.
    Rewrite(String),
    /// Excluded from the build (`browser` maps it to `false`).
    Ignored,
}

impl ImportResolution {
    /// The specifier written into the output, if any.
    #[must_use]
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::External(s) | Self::Rewrite(s) => Some(s),
            Self::Bundle | Self::Ignored => None,
        }
    }
}

impl fmt::Display for ImportResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundle => f.write_str("bundle"),
            Self::External(s) => write!(f, "external {s}"),
            Self::Rewrite(s) => write!(f, "rewrite {s}"),
            Self::Ignored => f.write_str("ignored"),
        }
    }
}

/// Receives builds worth starting before anyone asks for them.
pub trait PrewarmSink: Send + Sync {
    /// Fire and forget; must not block on the build.
    fn prewarm(&self, esm: EsmPath, args: BuildArgs, target: Target, dev: bool);
}

/// Classifies the imports of one build.
pub struct DependencyResolver<'a> {
    esm: &'a EsmPath,
    manifest: &'a PackageManifest,
    args: &'a BuildArgs,
    target: Target,
    dev: bool,
    metadata: &'a dyn PackageMetadataProvider,
    walker: Option<&'a DepGraphWalker>,
    git: Option<&'a dyn GitRefLister>,
    prewarm: Option<&'a dyn PrewarmSink>,
}

impl<'a> DependencyResolver<'a> {
    /// `esm` must carry a pinned version.
    pub fn new(
        esm: &'a EsmPath,
        manifest: &'a PackageManifest,
        args: &'a BuildArgs,
        target: Target,
        metadata: &'a dyn PackageMetadataProvider,
    ) -> Self {
        Self {
            esm,
            manifest,
            args,
            target,
            dev: false,
            metadata,
            walker: None,
            git: None,
            prewarm: None,
        }
    }

    #[must_use]
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    /// Re-canonicalize dependency args against their dependency graph.
    #[must_use]
    pub fn with_walker(mut self, walker: &'a DepGraphWalker) -> Self {
        self.walker = Some(walker);
        self
    }

    #[must_use]
    pub fn with_git(mut self, git: &'a dyn GitRefLister) -> Self {
        self.git = Some(git);
        self
    }

    #[must_use]
    pub fn with_prewarm(mut self, sink: &'a dyn PrewarmSink) -> Self {
        self.prewarm = Some(sink);
        self
    }

    /// Classify `specifier` as imported by the package being built.
    pub fn resolve(&self, specifier: &str) -> Result<ImportResolution> {
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
        {
            return Ok(ImportResolution::Bundle);
        }
        if specifier.contains("://") || specifier.starts_with("data:") {
            return Ok(ImportResolution::External(specifier.to_string()));
        }

        let mut specifier = self.apply_alias(specifier);

        if self.target.is_browser() {
            if let Some(to) = self.manifest.browser.get(&specifier) {
                if to.is_empty() {
                    trace!(%specifier, "excluded by browser field");
                    return Ok(ImportResolution::Ignored);
                }
                if to.starts_with('.') {
                    return Ok(ImportResolution::Bundle);
                }
                specifier = to.clone();
            }
        }

        let pkg_name = self.esm.pkg_name.as_str();
        if specifier == pkg_name || specifier == self.manifest.name {
            let root = EsmPath {
                sub_path: String::new(),
                sub_module_name: String::new(),
                ..self.esm.clone()
            };
            return Ok(ImportResolution::Rewrite(root.build_path(
                self.args,
                self.target,
                self.dev,
            )));
        }

        if is_node_builtin(&specifier) {
            return Ok(self.resolve_builtin(&specifier));
        }

        let dep_name = package_name_of(&specifier);
        if self.is_external(&dep_name) {
            return Ok(ImportResolution::External(specifier));
        }

        if let Some(sub_path) = specifier.strip_prefix(&format!("{pkg_name}/")) {
            let sub = self.esm.clone().with_sub_path(sub_path);
            return Ok(ImportResolution::Rewrite(sub.build_path(
                self.args,
                self.target,
                self.dev,
            )));
        }

        self.resolve_third_party(&specifier)
    }

    /// Replace an aliased package name, keeping any subpath.
    fn apply_alias(&self, specifier: &str) -> String {
        let parts = split_package_path(specifier);
        match self.args.alias.get(&parts.name) {
            Some(to) if parts.sub_path.is_empty() => to.clone(),
            Some(to) => format!("{to}/{}", parts.sub_path),
            None => specifier.to_string(),
        }
    }

    fn is_external(&self, name: &str) -> bool {
        self.args.external.contains(name)
            || self
                .args
                .external
                .iter()
                .any(|e| is_namespace(e) && name.starts_with(&format!("{e}/")))
    }

    fn resolve_builtin(&self, specifier: &str) -> ImportResolution {
        let name = specifier.strip_prefix("node:").unwrap_or(specifier);
        let prefixed = format!("node:{name}");
        let requested = self.args.external.contains(name) || self.args.external.contains(&prefixed);
        match self.target {
            _ if requested => ImportResolution::External(prefixed),
            Target::Node | Target::DenoNext => ImportResolution::External(prefixed),
            Target::Deno => ImportResolution::Rewrite(format!("{DENO_STD_NODE}/{name}.ts")),
            _ => ImportResolution::Rewrite(format!("/node/{name}.mjs")),
        }
    }

    fn resolve_third_party(&self, specifier: &str) -> Result<ImportResolution> {
        let parts = split_package_path(specifier);
        let constraint = if !parts.version.is_empty() {
            parts.version.clone()
        } else if let Some(pinned) = self.args.deps.get(&parts.name) {
            pinned.clone()
        } else if let Some(declared) = self.manifest.dependency_version(&parts.name) {
            declared.trim().to_string()
        } else {
            "latest".to_string()
        };

        let mut dep = EsmPath::new(&parts.name, &constraint).with_sub_path(&parts.sub_path);
        if let Some(source) = parse_dependency_source(&constraint)? {
            dep.gh = source.github;
            dep.pr = source.pkg_pr_new;
            dep.pkg_name = source.name;
            dep.pkg_version = source.version;
        }
        if !dep.gh && !dep.pr {
            dep.pkg_version = normalize_version(&dep.pkg_version);
        }
        if dep.gh && !dep.has_fixed_version() {
            if let Some(git) = self.git {
                let refs = git.list_refs(&dep.pkg_name)?;
                dep.pkg_version = resolve_github_ref(&refs, &dep.pkg_version)?;
            }
        }

        let args = self.dependency_args(&dep)?;

        if dep.has_fixed_version() {
            let path = dep.build_path(&args, self.target, self.dev);
            if let Some(sink) = self.prewarm {
                debug!(dep = %dep.specifier(), %path, "prewarming dependency build");
                sink.prewarm(dep, args, self.target, self.dev);
            }
            return Ok(ImportResolution::Rewrite(path));
        }

        // Unions and comparator sets collapse to a caret on the best match
        if dep.pkg_version.contains('|') || dep.pkg_version.contains(' ') {
            let best = self.metadata.resolve_version(&dep.pkg_name, &dep.pkg_version)?;
            dep.pkg_version = format!("^{best}");
        }
        Ok(ImportResolution::Rewrite(self.range_url(&dep, &args)))
    }

    /// Args carried into a dependency: aliases, pins, externals, and
    /// conditions, trimmed to what can reach that dependency.
    fn dependency_args(&self, dep: &EsmPath) -> Result<BuildArgs> {
        let args = BuildArgs {
            alias: self.args.alias.clone(),
            deps: self.args.deps.clone(),
            external: self.args.external.clone(),
            conditions: self.args.conditions.clone(),
            ..Default::default()
        };
        match self.walker {
            Some(walker) if !dep.gh && !dep.pr && dep.has_fixed_version() && !args.is_empty() => {
                let manifest = self.metadata.manifest(&dep.pkg_name, &dep.pkg_version)?;
                fix_build_args(&args, dep, &manifest, walker)
            }
            _ => Ok(args.prune(&dep.pkg_name)),
        }
    }

    /// `/{name}@{range}[/sub]?{params}` for dependencies left on a range.
    fn range_url(&self, dep: &EsmPath, args: &BuildArgs) -> String {
        let mut params: Vec<String> = Vec::new();
        if !args.alias.is_empty() {
            let alias: Vec<String> = args.alias.iter().map(|(k, v)| format!("{k}:{v}")).collect();
            params.push(format!("alias={}", alias.join(",")));
        }
        if !args.deps.is_empty() {
            let deps: Vec<String> = args.deps.iter().map(|(k, v)| format!("{k}@{v}")).collect();
            params.push(format!("deps={}", deps.join(",")));
        }
        if !args.external.is_empty() {
            let external: Vec<&str> = args.external.iter().map(String::as_str).collect();
            params.push(format!("external={}", external.join(",")));
        }
        if !args.conditions.is_empty() {
            params.push(format!("conditions={}", args.conditions.join(",")));
        }
        if dep.sub_path.ends_with(".json") {
            params.push("module".to_string());
        } else {
            params.push(format!("target={}", self.target));
        }
        if self.dev {
            params.push("dev".to_string());
        }
        format!("/{}?{}", dep.specifier(), params.join("&"))
    }
}
