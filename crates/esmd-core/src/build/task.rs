//! A single build and the environment it runs in.

use super::{BuildMeta, BuildRequest, BundleInput, Bundler, InstalledPackage, PackageInstaller};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::esm::{normalize_save_path, strip_module_ext, DepGraphWalker, EsmPath};
use crate::npm::{ConditionValue, GitRefLister, PackageManifest, PackageMetadataProvider};
use crate::paths::artifact_path;
use crate::queue::QueueJob;
use crate::resolver::{clean_rel, DependencyResolver, EntryResolver, PrewarmSink};
use crate::sync::KeyedMutex;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause before the single retry of a failed build.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Everything a build needs besides its request. Shared by all tasks.
pub struct BuildEnv {
    pub config: Config,
    pub metadata: Arc<dyn PackageMetadataProvider>,
    pub git: Arc<dyn GitRefLister>,
    pub installer: Arc<dyn PackageInstaller>,
    pub bundler: Arc<dyn Bundler>,
    pub walker: DepGraphWalker,
    /// Installs of one `name@version` never overlap.
    pub installs: KeyedMutex,
    pub prewarm: Weak<dyn PrewarmSink>,
}

impl BuildEnv {
    fn install(&self, esm: &EsmPath) -> Result<InstalledPackage> {
        let key = esm.name();
        self.installs.with_lock(&key, || {
            debug!(pkg = %key, "installing");
            self.installer.install(esm)
        })
    }

    fn artifact(&self, save_path: &str) -> PathBuf {
        artifact_path(&self.config.work_dir, save_path)
    }

    fn meta_file(&self, save_path: &str) -> PathBuf {
        let mut path = self.artifact(save_path).into_os_string();
        path.push(".meta");
        PathBuf::from(path)
    }

    /// Metadata of a previous build. An unreadable file is removed.
    pub fn stored_meta(&self, save_path: &str) -> Option<BuildMeta> {
        let path = self.meta_file(save_path);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "removing invalid build meta");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    fn store(&self, save_path: &str, code: Option<&str>, meta: &BuildMeta) -> Result<()> {
        let artifact = self.artifact(save_path);
        if let Some(parent) = artifact.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(code) = code {
            std::fs::write(&artifact, code)?;
        }
        std::fs::write(self.meta_file(save_path), serde_json::to_vec(meta)?)?;
        Ok(())
    }
}

/// Builds one artifact. Runs on a queue worker.
pub struct BuildTask {
    pub env: Arc<BuildEnv>,
    pub request: BuildRequest,
}

impl QueueJob for BuildTask {
    type Output = BuildMeta;

    fn key(&self) -> String {
        self.request.path()
    }

    fn run(self) -> Result<BuildMeta> {
        match self.build() {
            Ok(meta) => Ok(meta),
            Err(e) => {
                warn!(path = %self.request.path(), error = %e, "build failed, retrying");
                std::thread::sleep(RETRY_DELAY);
                self.build()
            }
        }
    }
}

/// Whether `sub_module` names the package's own main module, in which case
/// the root build is what was asked for.
fn is_main_module(manifest: &PackageManifest, sub_module: &str) -> bool {
    if sub_module.is_empty() {
        return false;
    }
    let matches = |path: &str| {
        !path.is_empty()
            && clean_rel(path).is_some_and(|p| strip_module_ext(&p) == sub_module)
    };
    let root_paths = match manifest.root_export() {
        Some(ConditionValue::Path(path)) => vec![path],
        Some(ConditionValue::Conditions(map)) => map
            .values()
            .filter_map(|v| v.as_path().map(str::to_string))
            .collect(),
        None => Vec::new(),
    };
    root_paths.iter().any(|p| matches(p)) || matches(&manifest.module) || matches(&manifest.main)
}

impl BuildTask {
    fn build(&self) -> Result<BuildMeta> {
        let env = &*self.env;
        let request = &self.request;
        let path = request.path();
        let save_path = normalize_save_path(&path);

        if let Some(meta) = env.stored_meta(&save_path) {
            debug!(%path, "previous build found");
            return Ok(meta);
        }

        let package = env.install(&request.esm)?;
        let mut esm = request.esm.clone();
        if is_main_module(&package.manifest, &esm.sub_module_name) {
            debug!(%path, sub = %esm.sub_module_name, "submodule is the main module");
            esm = esm.with_sub_path("");
        }

        let entry = EntryResolver::new(&package.manifest, package.files.as_ref(), request.target)
            .with_conditions(request.dev, &request.args.conditions)
            .resolve(&esm.sub_path);
        if entry.is_empty() {
            return Err(Error::not_found(format!(
                "no entry found for '{}'",
                esm.specifier()
            )));
        }
        debug!(%path, esm = %entry.esm, cjs = %entry.cjs, dts = %entry.dts, "resolved entry");

        let dts = if entry.dts.is_empty() {
            String::new()
        } else {
            esm.types_path(&request.args, &entry.dts)
        };

        if entry.is_types_only() {
            let meta = BuildMeta {
                path,
                types_only: true,
                dts,
                ..Default::default()
            };
            env.store(&save_path, None, &meta)?;
            return Ok(meta);
        }

        let prewarm = env.prewarm.upgrade();
        let mut imports = DependencyResolver::new(
            &esm,
            &package.manifest,
            &request.args,
            request.target,
            env.metadata.as_ref(),
        )
        .with_dev(request.dev)
        .with_walker(&env.walker)
        .with_git(env.git.as_ref());
        if let Some(sink) = prewarm.as_deref() {
            imports = imports.with_prewarm(sink);
        }

        let output = env.bundler.bundle(&BundleInput {
            request,
            package: &package,
            entry: &entry,
            imports: &imports,
        })?;

        let meta = BuildMeta {
            path,
            cjs: !entry.is_module(),
            types_only: false,
            export_default: output.export_default,
            imports: output.imports,
            dts,
        };
        env.store(&save_path, Some(&output.code), &meta)?;
        info!(path = %meta.path, imports = meta.imports.len(), "build stored");
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_main_module() {
        let manifest = PackageManifest::from_json(&json!({
            "name": "lib",
            "main": "./dist/index.js",
            "exports": { ".": { "import": "./esm/lib.mjs", "require": "./dist/index.js" } }
        }))
        .unwrap();
        assert!(is_main_module(&manifest, "dist/index"));
        assert!(is_main_module(&manifest, "esm/lib"));
        assert!(!is_main_module(&manifest, "dist/other"));
        assert!(!is_main_module(&manifest, ""));
    }
}
