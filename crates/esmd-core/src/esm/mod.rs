//! Canonical package references, build arguments, and targets.
//!
//! Everything that decides the identity of a build artifact lives here: two
//! requests that map to the same [`EsmPath`], [`BuildArgs`] encoding, and
//! [`Target`] produce the same artifact path.

mod args;
mod path;
mod target;
mod walk;

pub use args::BuildArgs;
pub use path::{
    normalize_save_path, parse_esm_path, strip_module_ext, EsmPath, ParsedEsmPath, PathResolver,
    ResolvedRequest, ES_EXTS,
};
pub use target::Target;
pub use walk::{canonicalize_build_args, fix_build_args, is_namespace, DepGraphWalker};
