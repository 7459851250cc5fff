use esmd_core::esm::canonicalize_build_args;
use esmd_core::npm::{GitCli, RegistryClient, RegistryMetadataProvider};
use esmd_core::{Config, DepGraphWalker, PackageMetadataProvider, PathResolver, Target};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveReport {
    pkg_name: String,
    pkg_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    sub_module: String,
    target: Target,
    dev: bool,
    /// The client must be redirected to `path`.
    redirect: bool,
    path: String,
}

/// Registry metadata over a private runtime. Keep the runtime alive for as
/// long as the provider is used.
pub fn registry_provider(
    config: &Config,
) -> Result<(tokio::runtime::Runtime, Arc<dyn PackageMetadataProvider>)> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let client = RegistryClient::new(&config.npm_registry).into_diagnostic()?;
    let metadata: Arc<dyn PackageMetadataProvider> = Arc::new(RegistryMetadataProvider::new(
        client,
        runtime.handle().clone(),
    ));
    Ok((runtime, metadata))
}

/// Resolve `path` against the configured registry.
///
/// Registry lookups block on a private runtime, so this runs on the main
/// thread outside of any async context.
pub fn run(config: &Config, path: &str, user_agent: Option<&str>, json: bool) -> Result<()> {
    let (_runtime, metadata) = registry_provider(config)?;

    let resolver = PathResolver::new(Arc::clone(&metadata), Arc::new(GitCli));
    let resolved = resolver.resolve(path).into_diagnostic()?;
    let target = resolved
        .target
        .or_else(|| user_agent.map(Target::from_user_agent))
        .unwrap_or(Target::DEFAULT);

    let esm = &resolved.esm;
    let walker = DepGraphWalker::new(
        Arc::clone(&metadata),
        config.dep_walk_concurrency,
        config.dep_walk_max_depth,
    )
    .into_diagnostic()?;
    let args = canonicalize_build_args(&resolved.args, esm, metadata.as_ref(), &walker)
        .into_diagnostic()?;

    let build_path = esm.build_path(&args, target, resolved.dev);
    debug!(%path, %build_path, "resolved");

    let report = ResolveReport {
        pkg_name: esm.pkg_name.clone(),
        pkg_version: esm.pkg_version.clone(),
        sub_module: esm.sub_module_name.clone(),
        target,
        dev: resolved.dev,
        redirect: !resolved.exact_version,
        path: build_path,
    };

    if json {
        let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
        println!("{json}");
    } else {
        println!("{}", report.path);
        if report.redirect {
            println!("  (redirect from {path})");
        }
    }
    Ok(())
}
