//! Artifact paths under the content root and the suffix layout that produces them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::module::ModuleName;

/// Suffix of the primary compiled artifact.
pub const PRIMARY_SUFFIX: &str = ".olean";

/// Suffixes of the two optional variant artifacts.
pub const VARIANT_SUFFIXES: [&str; 2] = [".olean.private", ".olean.server"];

/// A slash-separated file path relative to the content root, e.g.
/// `Init/Data/String.olean`.
///
/// Paths are compared and cached on their exact string value.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactPath(String);

impl ArtifactPath {
    /// Wraps a relative path string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the path, returning the owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactPath({})", self.0)
    }
}

impl From<&str> for ArtifactPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ArtifactPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl AsRef<str> for ArtifactPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether an artifact path names the primary artifact of a module or one of
/// its optional variants.
///
/// Variants are sparse on the server; a miss or a bad header on a variant is
/// never worth reporting. Primary misses and bad headers are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The main compiled artifact (`.olean`).
    Primary,
    /// An optional variant artifact (`.olean.private`, `.olean.server`).
    Variant,
}

/// The suffixes appended to a module's base path to produce its candidate
/// artifact paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Suffix of the primary artifact.
    pub primary_suffix: String,
    /// Suffixes of the two optional variant artifacts.
    pub variant_suffixes: [String; 2],
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            primary_suffix: PRIMARY_SUFFIX.to_string(),
            variant_suffixes: VARIANT_SUFFIXES.map(str::to_string),
        }
    }
}

impl ArtifactLayout {
    /// Returns the three candidate paths for a module: primary first, then
    /// the variants in layout order.
    pub fn candidates(&self, module: &ModuleName) -> [ArtifactPath; 3] {
        let base = module.base_path();
        [
            ArtifactPath::new(format!("{base}{}", self.primary_suffix)),
            ArtifactPath::new(format!("{base}{}", self.variant_suffixes[0])),
            ArtifactPath::new(format!("{base}{}", self.variant_suffixes[1])),
        ]
    }

    /// Classifies a path by suffix.
    ///
    /// Variant suffixes are checked first because with the default layout
    /// they extend the primary suffix. Paths matching no suffix are treated
    /// as primary, so anything unexpected stays visible in the logs.
    pub fn kind_of(&self, path: &ArtifactPath) -> ArtifactKind {
        let s = path.as_str();
        if self
            .variant_suffixes
            .iter()
            .any(|suffix| s.ends_with(suffix.as_str()))
        {
            ArtifactKind::Variant
        } else {
            ArtifactKind::Primary
        }
    }

    /// Returns `true` if the path ends with any suffix of this layout.
    pub fn is_artifact(&self, path: &str) -> bool {
        path.ends_with(self.primary_suffix.as_str())
            || self
                .variant_suffixes
                .iter()
                .any(|suffix| path.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_candidates() {
        let layout = ArtifactLayout::default();
        let paths = layout.candidates(&ModuleName::new("Init.Data.String"));
        assert_eq!(paths[0].as_str(), "Init/Data/String.olean");
        assert_eq!(paths[1].as_str(), "Init/Data/String.olean.private");
        assert_eq!(paths[2].as_str(), "Init/Data/String.olean.server");
    }

    #[test]
    fn kind_of_distinguishes_variants() {
        let layout = ArtifactLayout::default();
        assert_eq!(
            layout.kind_of(&ArtifactPath::from("Init/Core.olean")),
            ArtifactKind::Primary
        );
        assert_eq!(
            layout.kind_of(&ArtifactPath::from("Init/Core.olean.private")),
            ArtifactKind::Variant
        );
        assert_eq!(
            layout.kind_of(&ArtifactPath::from("Init/Core.olean.server")),
            ArtifactKind::Variant
        );
    }

    #[test]
    fn unknown_suffix_is_primary() {
        let layout = ArtifactLayout::default();
        assert_eq!(
            layout.kind_of(&ArtifactPath::from("README.md")),
            ArtifactKind::Primary
        );
        assert!(!layout.is_artifact("README.md"));
        assert!(layout.is_artifact("Init.olean.server"));
    }

    #[test]
    fn paths_order_by_string() {
        let mut paths = vec![
            ArtifactPath::from("b.olean"),
            ArtifactPath::from("a.olean.server"),
            ArtifactPath::from("a.olean"),
        ];
        paths.sort();
        assert_eq!(paths[0].as_str(), "a.olean");
        assert_eq!(paths[1].as_str(), "a.olean.server");
    }
}
