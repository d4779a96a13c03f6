//! Dependency resolution for user programs.
//!
//! Scans source text for `import` declarations, closes the resulting seed
//! set over the precomputed dependency [`Manifest`], and expands every
//! reached module into the artifact paths the runtime will try to read.

#![warn(missing_docs)]

pub mod error;
pub mod imports;
pub mod manifest;
pub mod resolver;

pub use error::ResolveError;
pub use imports::{detect_implicit_imports, parse_explicit_imports, ImportRules};
pub use manifest::{Manifest, ModuleInfo, WILDCARD_IMPORT};
pub use resolver::{expand_to_artifact_paths, DependencySet, Resolver};
