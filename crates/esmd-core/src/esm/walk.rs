//! Dependency graph walk and build-args canonicalization.
//!
//! Overrides in [`BuildArgs`] that cannot affect a package (an alias for a
//! module it never imports, a pin for a dependency outside its graph) would
//! otherwise fragment the build cache. [`fix_build_args`] drops them.

use super::args::BuildArgs;
use super::path::EsmPath;
use crate::error::{Error, Result};
use crate::npm::{
    is_node_builtin, package_name_of, parse_dependency_source, PackageManifest,
    PackageMetadataProvider,
};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Breadth-first walk of a package's transitive dependencies.
///
/// Each level is fetched in parallel on a dedicated pool, so the walk never
/// has more than `concurrency` metadata lookups in flight.
pub struct DepGraphWalker {
    metadata: Arc<dyn PackageMetadataProvider>,
    pool: rayon::ThreadPool,
    max_depth: usize,
}

struct Edge {
    /// Name the dependent imports it by.
    name: String,
    /// Registry name and constraint to fetch; `None` for git sources.
    fetch: Option<(String, String)>,
}

fn edges(manifest: &PackageManifest) -> Vec<Edge> {
    manifest
        .dependencies
        .iter()
        .chain(&manifest.peer_dependencies)
        .filter_map(|(name, version)| match parse_dependency_source(version) {
            Ok(None) => Some(Edge {
                name: name.clone(),
                fetch: Some((name.clone(), version.clone())),
            }),
            Ok(Some(source)) if source.github || source.pkg_pr_new => Some(Edge {
                name: name.clone(),
                fetch: None,
            }),
            Ok(Some(source)) => Some(Edge {
                name: name.clone(),
                fetch: Some((source.name, source.version)),
            }),
            Err(e) => {
                debug!(dep = %name, error = %e, "skipping dependency");
                None
            }
        })
        .collect()
}

impl DepGraphWalker {
    pub fn new(
        metadata: Arc<dyn PackageMetadataProvider>,
        concurrency: usize,
        max_depth: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("esmd-deps-{i}"))
            .build()
            .map_err(|e| Error::upstream(format!("failed to start dependency walker: {e}")))?;
        Ok(Self {
            metadata,
            pool,
            max_depth: max_depth.max(1),
        })
    }

    /// Names of every package reachable from `root`, `root` itself excluded.
    ///
    /// Cycles are cut by name; packages missing from the registry are skipped.
    pub fn collect(&self, root: &PackageManifest) -> Result<BTreeSet<String>> {
        let mut visited: HashSet<String> = HashSet::from([root.name.clone()]);
        let mut names = BTreeSet::new();
        let mut frontier = edges(root);

        for depth in 1..=self.max_depth {
            let level: Vec<(String, String)> = frontier
                .drain(..)
                .filter(|edge| visited.insert(edge.name.clone()))
                .filter_map(|edge| {
                    names.insert(edge.name);
                    edge.fetch
                })
                .collect();
            if level.is_empty() {
                break;
            }

            let manifests: Vec<Result<PackageManifest>> = self.pool.install(|| {
                level
                    .par_iter()
                    .map(|(name, constraint)| self.metadata.manifest(name, constraint))
                    .collect()
            });

            for (manifest, (name, _)) in manifests.into_iter().zip(&level) {
                match manifest {
                    Ok(manifest) => frontier.extend(edges(&manifest)),
                    Err(Error::NotFound(msg)) => warn!(dep = %name, %msg, "dependency not found"),
                    Err(e) => return Err(e),
                }
            }

            if depth == self.max_depth && !frontier.is_empty() {
                debug!(root = %root.name, depth, "dependency walk depth limit reached");
            }
        }

        Ok(names)
    }
}

/// Canonical args for building `esm`.
///
/// GitHub and pkg.pr.new packages, and empty args, are only pruned; anything
/// else is fetched and trimmed to the package's dependency graph.
pub fn canonicalize_build_args(
    args: &BuildArgs,
    esm: &EsmPath,
    metadata: &dyn PackageMetadataProvider,
    walker: &DepGraphWalker,
) -> Result<BuildArgs> {
    if esm.gh || esm.pr || args.is_empty() {
        return Ok(args.prune(&esm.pkg_name));
    }
    let manifest = metadata.manifest(&esm.pkg_name, &esm.pkg_version)?;
    fix_build_args(args, esm, &manifest, walker)
}

/// Drop overrides that cannot affect the build of `esm`.
///
/// Aliases, pins, and externals are kept only for packages in the
/// dependency graph. The graph is walked only when the direct dependencies
/// do not already cover every override.
pub fn fix_build_args(
    args: &BuildArgs,
    esm: &EsmPath,
    manifest: &PackageManifest,
    walker: &DepGraphWalker,
) -> Result<BuildArgs> {
    let pkg_name = esm.pkg_name.as_str();
    let args = &args.prune(pkg_name);
    if args.alias.is_empty() && args.deps.is_empty() && args.external.is_empty() {
        return Ok(args.clone());
    }

    let direct: BTreeSet<String> = manifest
        .dependencies
        .keys()
        .chain(manifest.peer_dependencies.keys())
        .cloned()
        .collect();
    let covered = args
        .alias
        .keys()
        .chain(args.deps.keys())
        .chain(args.external.iter().filter(|e| !e.starts_with("node:") && !is_namespace(e)))
        .all(|name| direct.contains(name));

    let mut graph = if covered {
        direct
    } else {
        let mut all = walker.collect(manifest)?;
        all.extend(direct);
        all
    };

    let mut fixed = BuildArgs {
        conditions: args.conditions.clone(),
        exports: args.exports.clone(),
        external_require: args.external_require,
        keep_names: args.keep_names,
        ignore_annotations: args.ignore_annotations,
        sourcemap: args.sourcemap,
        ..Default::default()
    };

    for (from, to) in &args.alias {
        if !graph.contains(from) {
            continue;
        }
        let target = package_name_of(to);
        if target != pkg_name {
            fixed.alias.insert(from.clone(), to.clone());
        }
    }
    // Pins may target what an alias points at
    graph.extend(fixed.alias.values().map(|to| package_name_of(to)));

    let sub_segments: Vec<&str> = esm.sub_module_name.split('/').collect();
    for (name, version) in &args.deps {
        if name == pkg_name {
            continue;
        }
        // A submodule may import a package it does not declare, e.g. `htm/preact`
        if graph.contains(name) || sub_segments.contains(&name.as_str()) {
            fixed.deps.insert(name.clone(), version.clone());
        }
    }

    for name in &args.external {
        let keep = if let Some(builtin) = name.strip_prefix("node:") {
            is_node_builtin(builtin)
        } else if is_namespace(name) {
            graph.iter().any(|dep| dep.starts_with(&format!("{name}/")))
        } else {
            name != pkg_name && graph.contains(name)
        };
        if keep {
            fixed.external.insert(name.clone());
        }
    }

    Ok(fixed.prune(pkg_name))
}

/// `@scope` with no package part: externalizes the whole scope.
#[must_use]
pub fn is_namespace(name: &str) -> bool {
    name.strip_prefix('@').is_some_and(|s| !s.is_empty() && !s.contains('/'))
}
