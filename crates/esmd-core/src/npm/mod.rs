//! npm naming, version shapes, manifests, and metadata sources.

pub mod git;
pub mod manifest;
pub mod name;
pub mod range;
pub mod registry;
pub mod source;

pub use git::{parse_ls_remote, resolve_github_ref, GitCli, GitRef, GitRefLister};
pub use manifest::{ConditionValue, ModuleKind, PackageManifest};
pub use name::{
    is_commitish, is_dist_tag, is_exact_version, is_node_builtin, normalize_version,
    package_name_of, split_package_path, to_types_package_name, validate_package_name,
    PackagePathParts,
};
pub use range::{highest_satisfying, parse_range, resolve_version};
pub use registry::{
    MemoryRegistry, PackageMetadataProvider, Packument, RegistryClient, RegistryMetadataProvider,
};
pub use source::{parse_dependency_source, PackageSource};
