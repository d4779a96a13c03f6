//! Dotted module names as they appear in `import` declarations and the manifest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonical, case-sensitive dotted module name such as `Init.Data.String`.
///
/// Module names order lexicographically by their string form, which is the
/// order used for every sorted module list produced by the resolver.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    /// Creates a module name from any string-like value.
    ///
    /// No validation is performed: manifests routinely mention names that
    /// do not correspond to any artifact, and those must survive untouched.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the dotted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the slash-separated base path (`Init.Data.String` → `Init/Data/String`).
    pub fn base_path(&self) -> String {
        self.0.replace('.', "/")
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleName({})", self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ModuleName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ModuleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
