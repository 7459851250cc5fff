//! Build targets and user-agent inference.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output environment a module is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    Es2023,
    Es2024,
    EsNext,
    Deno,
    DenoNext,
    Node,
}

impl Target {
    pub const ALL: [Target; 14] = [
        Self::Es2015,
        Self::Es2016,
        Self::Es2017,
        Self::Es2018,
        Self::Es2019,
        Self::Es2020,
        Self::Es2021,
        Self::Es2022,
        Self::Es2023,
        Self::Es2024,
        Self::EsNext,
        Self::Deno,
        Self::DenoNext,
        Self::Node,
    ];

    /// Target used when nothing better is known.
    pub const DEFAULT: Target = Self::Es2022;

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Es2015 => "es2015",
            Self::Es2016 => "es2016",
            Self::Es2017 => "es2017",
            Self::Es2018 => "es2018",
            Self::Es2019 => "es2019",
            Self::Es2020 => "es2020",
            Self::Es2021 => "es2021",
            Self::Es2022 => "es2022",
            Self::Es2023 => "es2023",
            Self::Es2024 => "es2024",
            Self::EsNext => "esnext",
            Self::Deno => "deno",
            Self::DenoNext => "denonext",
            Self::Node => "node",
        }
    }

    /// Parse a path segment; `None` if it is not a target name.
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == segment)
    }

    /// Browser-family targets (`es20xx`, `esnext`).
    #[must_use]
    pub fn is_browser(&self) -> bool {
        !matches!(self, Self::Deno | Self::DenoNext | Self::Node)
    }

    #[must_use]
    pub fn is_deno(&self) -> bool {
        matches!(self, Self::Deno | Self::DenoNext)
    }

    /// Infer a target from a `User-Agent` header.
    ///
    /// - `ES/2020` selects that ES level when it is a known target
    /// - `Deno/x.y.z` selects `deno` below 1.33.2, `denonext` otherwise
    /// - `Node/`, `Node.js/`, `Bun/`, and `undici` select `node`
    /// - anything else selects [`Target::DEFAULT`]
    #[must_use]
    pub fn from_user_agent(ua: &str) -> Self {
        if let Some(year) = ua.strip_prefix("ES/") {
            if let Some(target) = Self::from_segment(&format!("es{year}")) {
                return target;
            }
        }
        if let Some(version) = ua.strip_prefix("Deno/") {
            let legacy = semver::Version::parse(version.trim())
                .is_ok_and(|v| v < semver::Version::new(1, 33, 2));
            return if legacy { Self::Deno } else { Self::DenoNext };
        }
        if ua == "undici"
            || ua.starts_with("Node.js/")
            || ua.starts_with("Node/")
            || ua.starts_with("Bun/")
        {
            return Self::Node;
        }
        Self::DEFAULT
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segment(s).ok_or_else(|| Error::invalid_spec(format!("unknown target '{s}'")))
    }
}
