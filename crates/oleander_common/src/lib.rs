//! Shared foundational types for the Oleander library loader.
//!
//! This crate provides dotted module names, artifact paths and the suffix
//! layout that maps one onto the other, and the artifact header validator.

#![warn(missing_docs)]

pub mod artifact;
pub mod module;
pub mod path;

pub use artifact::{inspect, is_valid, ArtifactDefect, ARTIFACT_MAGIC, MIN_HEADER_LEN};
pub use module::ModuleName;
pub use path::{ArtifactKind, ArtifactLayout, ArtifactPath, PRIMARY_SUFFIX, VARIANT_SUFFIXES};
