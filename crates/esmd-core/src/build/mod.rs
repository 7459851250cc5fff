//! Build orchestration: install, resolve the entry, bundle, store.
//!
//! One [`BuildTask`] produces one artifact, identified by its canonical
//! path. Tasks run on the [`BuildQueue`](crate::queue::BuildQueue), so
//! concurrent requests for the same artifact share a single run. The
//! package installer and the bundler are collaborators behind traits.

mod service;
mod task;

pub use service::BuildService;
pub use task::{BuildEnv, BuildTask};

use crate::error::Result;
use crate::esm::{BuildArgs, EsmPath, Target};
use crate::npm::PackageManifest;
use crate::paths::install_dir;
use crate::resolver::{BuildEntry, DependencyResolver, DirPackageFiles, PackageFiles};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// A fully canonical build: pinned package, pruned args, concrete target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub esm: EsmPath,
    pub args: BuildArgs,
    pub target: Target,
    pub dev: bool,
}

impl BuildRequest {
    /// Canonical artifact path, also the queue key.
    #[must_use]
    pub fn path(&self) -> String {
        self.esm.build_path(&self.args, self.target, self.dev)
    }
}

/// Outcome of a build, stored next to the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildMeta {
    pub path: String,
    /// The entry was CommonJS.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cjs: bool,
    /// Only declarations exist for the entry.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub types_only: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub export_default: bool,
    /// Rewritten imports, in the order the bundler met them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    /// Canonical path of the declaration file.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dts: String,
}

/// A package materialized for building.
pub struct InstalledPackage {
    /// Package root on disk; empty for in-memory packages.
    pub root: PathBuf,
    pub manifest: PackageManifest,
    pub files: Arc<dyn PackageFiles>,
}

impl std::fmt::Debug for InstalledPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledPackage")
            .field("root", &self.root)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

/// Makes a package and its dependencies available on disk.
pub trait PackageInstaller: Send + Sync {
    fn install(&self, esm: &EsmPath) -> Result<InstalledPackage>;
}

/// Serves packages already unpacked into the work dir's store
/// (`npm/{name}@{version}/node_modules/{name}`).
#[derive(Debug, Clone)]
pub struct StoreInstaller {
    work_dir: PathBuf,
}

impl StoreInstaller {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

impl PackageInstaller for StoreInstaller {
    fn install(&self, esm: &EsmPath) -> Result<InstalledPackage> {
        let root = install_dir(&self.work_dir, &esm.pkg_name, &esm.pkg_version);
        let manifest = PackageManifest::read(&root.join("package.json"))?;
        Ok(InstalledPackage {
            files: Arc::new(DirPackageFiles::new(root.clone())),
            root,
            manifest,
        })
    }
}

/// What the bundler is handed for one build.
pub struct BundleInput<'a> {
    pub request: &'a BuildRequest,
    pub package: &'a InstalledPackage,
    pub entry: &'a BuildEntry,
    /// Decides the fate of every import the bundler meets.
    pub imports: &'a DependencyResolver<'a>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOutput {
    pub code: String,
    pub imports: Vec<String>,
    pub export_default: bool,
}

/// Produces the module code for a resolved entry.
pub trait Bundler: Send + Sync {
    fn bundle(&self, input: &BundleInput<'_>) -> Result<BundleOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_path() {
        let mut args = BuildArgs::default();
        args.external.insert("react".into());
        let request = BuildRequest {
            esm: EsmPath::new("react-dom", "18.2.0").with_sub_path("client"),
            args,
            target: Target::Es2022,
            dev: false,
        };
        let token = request.args.encode("react-dom", false);
        assert_eq!(
            request.path(),
            format!("/react-dom@18.2.0/X-{token}/es2022/client.mjs")
        );
    }

    #[test]
    fn test_meta_json_is_compact() {
        let meta = BuildMeta {
            path: "/a@1.0.0/es2022/a.mjs".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, json!({ "path": "/a@1.0.0/es2022/a.mjs" }));

        let meta = BuildMeta {
            cjs: true,
            imports: vec!["/b@1.0.0/es2022/b.mjs".into()],
            ..meta
        };
        let back: BuildMeta = serde_json::from_str(&serde_json::to_string(&meta).unwrap()).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_store_installer() {
        let dir = tempfile::tempdir().unwrap();
        let root = install_dir(dir.path(), "@scope/pkg", "1.0.0");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("package.json"),
            r#"{ "name": "@scope/pkg", "version": "1.0.0", "main": "index.js" }"#,
        )
        .unwrap();
        std::fs::write(root.join("index.js"), "module.exports = 1;").unwrap();

        let installed = StoreInstaller::new(dir.path())
            .install(&EsmPath::new("@scope/pkg", "1.0.0"))
            .unwrap();
        assert_eq!(installed.manifest.name, "@scope/pkg");
        assert!(installed.files.is_file("index.js"));

        let missing = StoreInstaller::new(dir.path()).install(&EsmPath::new("nope", "1.0.0"));
        assert!(missing.unwrap_err().is_not_found());
    }
}
