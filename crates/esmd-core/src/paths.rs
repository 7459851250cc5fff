use crate::version::SCHEMA_VERSION;
use std::path::{Path, PathBuf};

/// Default work directory for installs and build output.
///
/// - Linux: `$XDG_CACHE_HOME/esmd/v{N}` or `~/.cache/esmd/v{N}`
/// - macOS: `~/Library/Caches/esmd/v{N}`
/// - Windows: `%LOCALAPPDATA%\esmd\v{N}`
#[must_use]
pub fn default_work_dir() -> PathBuf {
    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".esmd-cache"),
                |p| p.join(".cache").join("esmd"),
            )
        },
        |p| p.join("esmd"),
    );

    base.join(format!("v{SCHEMA_VERSION}"))
}

/// Directory a package version is installed into.
///
/// Scoped names keep their `@scope/name` nesting.
#[must_use]
pub fn install_dir(work_dir: &Path, name: &str, version: &str) -> PathBuf {
    work_dir
        .join("npm")
        .join(format!("{name}@{version}"))
        .join("node_modules")
        .join(name)
}

/// Where a build artifact is written, given its save path.
#[must_use]
pub fn artifact_path(work_dir: &Path, save_path: &str) -> PathBuf {
    work_dir
        .join("builds")
        .join(save_path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_work_dir_is_versioned() {
        let dir = default_work_dir();
        assert!(dir.ends_with(format!("v{SCHEMA_VERSION}")));
    }

    #[test]
    fn test_install_dir_scoped() {
        let dir = install_dir(Path::new("/w"), "@babel/core", "7.24.0");
        assert_eq!(
            dir,
            PathBuf::from("/w/npm/@babel/core@7.24.0/node_modules/@babel/core")
        );
    }

    #[test]
    fn test_artifact_path_strips_leading_slash() {
        let path = artifact_path(Path::new("/w"), "/react@18.2.0/es2022/react.mjs");
        assert_eq!(path, PathBuf::from("/w/builds/react@18.2.0/es2022/react.mjs"));
    }
}
