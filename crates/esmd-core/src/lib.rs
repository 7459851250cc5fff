#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Resolution and build scheduling core for an npm-to-ESM CDN.
//!
//! The crate turns request paths such as `/react@18.2.0/es2022/jsx-runtime.mjs`
//! into canonical package references and build arguments, picks the entry
//! files a build should start from, rewrites the imports of a build, and
//! schedules builds so that each distinct artifact is produced once.

pub mod build;
pub mod config;
pub mod error;
pub mod esm;
pub mod npm;
pub mod paths;
pub mod queue;
pub mod resolver;
pub mod sync;
pub mod version;

pub use build::{
    BuildEnv, BuildMeta, BuildRequest, BuildService, BuildTask, Bundler, BundleInput,
    BundleOutput, InstalledPackage, PackageInstaller, StoreInstaller,
};
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use esm::{
    parse_esm_path, BuildArgs, DepGraphWalker, EsmPath, ParsedEsmPath, PathResolver,
    ResolvedRequest, Target,
};
pub use npm::{
    ConditionValue, GitRefLister, ModuleKind, PackageManifest, PackageMetadataProvider,
};
pub use queue::{BuildQueue, QueueJob, QueueStats, Waiter};
pub use resolver::{
    BuildEntry, DependencyResolver, EntryResolver, ImportResolution, PackageFiles, PrewarmSink,
};
pub use sync::KeyedMutex;
pub use version::VERSION;
