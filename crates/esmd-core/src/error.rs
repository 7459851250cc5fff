//! Error types shared by every resolution and build stage.
//!
//! `Error` is `Clone` because one build outcome is delivered to every
//! waiter of a coalesced task.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, surfaced in CLI JSON output and logs.
pub mod codes {
    pub const ESM_NOT_FOUND: &str = "ESM_NOT_FOUND";
    pub const ESM_INVALID_SPEC: &str = "ESM_INVALID_SPEC";
    pub const ESM_UPSTREAM: &str = "ESM_UPSTREAM";
    pub const ESM_TIMEOUT: &str = "ESM_TIMEOUT";
    pub const ESM_CONFLICT: &str = "ESM_CONFLICT";
}

/// Core error type for esmd operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Package, version, tag, or entry does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Malformed path, package name, version, or build-args token.
    #[error("{0}")]
    InvalidSpec(String),

    /// Registry, git, installer, or bundler failure.
    #[error("{0}")]
    Upstream(String),

    /// A waiter gave up before its build finished.
    #[error("{0}")]
    Timeout(String),

    /// Inconsistent state, e.g. a task key collision with a different job.
    #[error("{0}")]
    Conflict(String),
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => codes::ESM_NOT_FOUND,
            Self::InvalidSpec(_) => codes::ESM_INVALID_SPEC,
            Self::Upstream(_) => codes::ESM_UPSTREAM,
            Self::Timeout(_) => codes::ESM_TIMEOUT,
            Self::Conflict(_) => codes::ESM_CONFLICT,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(err.to_string())
        } else {
            Self::Upstream(format!("IO error: {err}"))
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream(format!("invalid JSON: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("request timed out: {err}"))
        } else {
            Self::Upstream(format!("HTTP error: {err}"))
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors from loading an `esmd.json` config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
}
