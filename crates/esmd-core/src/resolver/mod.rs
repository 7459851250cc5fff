//! Entry and import resolution inside an installed package.
//!
//! [`EntryResolver`] turns a subpath into the files to build: the ESM or
//! CommonJS entry and its type declarations. [`DependencyResolver`] decides
//! what each import of that entry becomes in the output.

mod conditions;
mod deps;
mod entry;
mod files;
mod sniff;
mod types_versions;

pub use conditions::{platform_conditions, ConditionResolver, EntryKind};
pub use deps::{DependencyResolver, ImportResolution, PrewarmSink};
pub use entry::{normalize_entry_path, BuildEntry, EntryResolver};
pub use files::{clean_rel, DirPackageFiles, MemoryPackageFiles, PackageFiles};
pub use sniff::is_esm_source;
pub use types_versions::apply_types_versions;
