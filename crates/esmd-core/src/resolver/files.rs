//! File access inside an installed package.
//!
//! Entry resolution only asks three questions of the package tree: does a
//! file exist, what does a nested `package.json` say, and is a file an ES
//! module. [`PackageFiles`] answers them from disk or from memory.

use super::sniff::is_esm_source;
use crate::npm::PackageManifest;
use esmd_util::fs::{exists_file, read_head_lossy, read_to_string_lossy};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bytes read when sniffing a module's format.
const SNIFF_LIMIT: usize = 64 * 1024;

/// Read-only view of one installed package. Paths are relative to the
/// package root, with or without a leading `./`.
pub trait PackageFiles: Send + Sync {
    fn is_file(&self, rel: &str) -> bool;

    /// The `package.json` in `rel_dir`, if present and valid.
    fn read_manifest(&self, rel_dir: &str) -> Option<PackageManifest>;

    /// Whether the file at `rel` is an ES module; `None` when unreadable.
    fn sniff_module(&self, rel: &str) -> Option<bool>;
}

/// Normalize a package-relative path: no leading `./` or `/`, `.` and `..`
/// segments folded. Returns `None` for paths that escape the package.
#[must_use]
pub fn clean_rel(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

/// Package files on disk, rooted at the package directory.
#[derive(Debug, Clone)]
pub struct DirPackageFiles {
    root: PathBuf,
}

impl DirPackageFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, rel: &str) -> Option<PathBuf> {
        let rel = clean_rel(rel)?;
        if rel.is_empty() {
            return None;
        }
        Some(self.root.join(rel))
    }
}

impl PackageFiles for DirPackageFiles {
    fn is_file(&self, rel: &str) -> bool {
        self.path_of(rel).is_some_and(|p| exists_file(&p))
    }

    fn read_manifest(&self, rel_dir: &str) -> Option<PackageManifest> {
        let dir = clean_rel(rel_dir)?;
        let path = self.root.join(dir).join("package.json");
        if !exists_file(&path) {
            return None;
        }
        let text = read_to_string_lossy(&path).ok()?;
        match PackageManifest::parse(&text) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring nested package.json");
                None
            }
        }
    }

    fn sniff_module(&self, rel: &str) -> Option<bool> {
        let path = self.path_of(rel)?;
        let head = read_head_lossy(&path, SNIFF_LIMIT).ok()?;
        Some(is_esm_source(&head))
    }
}

/// In-memory package tree, for tests and for callers that already hold the
/// file list.
#[derive(Debug, Clone, Default)]
pub struct MemoryPackageFiles {
    files: BTreeMap<String, String>,
}

impl MemoryPackageFiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Later additions replace earlier ones.
    #[must_use]
    pub fn with_file(mut self, rel: &str, content: &str) -> Self {
        if let Some(rel) = clean_rel(rel) {
            self.files.insert(rel, content.to_string());
        }
        self
    }

    fn get(&self, rel: &str) -> Option<&str> {
        self.files.get(&clean_rel(rel)?).map(String::as_str)
    }
}

impl PackageFiles for MemoryPackageFiles {
    fn is_file(&self, rel: &str) -> bool {
        self.get(rel).is_some()
    }

    fn read_manifest(&self, rel_dir: &str) -> Option<PackageManifest> {
        let dir = clean_rel(rel_dir)?;
        let path = if dir.is_empty() {
            "package.json".to_string()
        } else {
            format!("{dir}/package.json")
        };
        PackageManifest::parse(self.get(&path)?).ok()
    }

    fn sniff_module(&self, rel: &str) -> Option<bool> {
        self.get(rel).map(is_esm_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_clean_rel() {
        assert_eq!(clean_rel("./dist/index.js").unwrap(), "dist/index.js");
        assert_eq!(clean_rel("/a/./b/../c.js").unwrap(), "a/c.js");
        assert_eq!(clean_rel("./").unwrap(), "");
        assert!(clean_rel("../outside.js").is_none());
    }

    #[test]
    fn test_dir_package_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/sub")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "export const a = 1;\n").unwrap();
        fs::write(dir.path().join("lib/b.js"), "module.exports = 1;\n").unwrap();
        fs::write(
            dir.path().join("lib/sub/package.json"),
            r#"{"main": "./main.js", "types": "./main.d.ts"}"#,
        )
        .unwrap();

        let files = DirPackageFiles::new(dir.path());
        assert!(files.is_file("./lib/a.js"));
        assert!(files.is_file("lib/b.js"));
        assert!(!files.is_file("lib"));
        assert!(!files.is_file("../etc/passwd"));
        assert_eq!(files.sniff_module("lib/a.js"), Some(true));
        assert_eq!(files.sniff_module("lib/b.js"), Some(false));
        assert_eq!(files.sniff_module("lib/missing.js"), None);

        let nested = files.read_manifest("lib/sub").unwrap();
        assert_eq!(nested.main, "./main.js");
        assert_eq!(nested.types, "./main.d.ts");
        assert!(files.read_manifest("lib").is_none());
    }

    #[test]
    fn test_memory_package_files() {
        let files = MemoryPackageFiles::new()
            .with_file("./index.mjs", "export default 1")
            .with_file("sub/package.json", r#"{"module": "./m.js"}"#);
        assert!(files.is_file("index.mjs"));
        assert!(files.is_file("./sub/package.json"));
        assert_eq!(files.read_manifest("./sub").unwrap().module, "./m.js");
        assert!(files.read_manifest("").is_none());
    }
}
