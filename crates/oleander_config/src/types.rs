//! Configuration types deserialized from `oleander.toml`.

use oleander_common::{ArtifactLayout, PRIMARY_SUFFIX, VARIANT_SUFFIXES};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::error::ConfigError;

/// The top-level configuration parsed from `oleander.toml`.
///
/// Every section is optional; a missing file or section means defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Where artifacts and metadata are served from.
    pub source: SourceConfig,
    /// Fetch orchestration settings.
    pub fetch: FetchConfig,
    /// Artifact suffix layout.
    pub layout: LayoutConfig,
    /// Import analysis conventions.
    pub imports: ImportsConfig,
    /// Execution sandbox settings.
    pub sandbox: SandboxConfig,
}

/// Content root and well-known metadata locations.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL (`http://`, `https://`) or local directory holding the library.
    pub content_root: String,
    /// Dependency manifest location, relative to the content root.
    pub manifest: String,
    /// Flat file listing location, relative to the content root.
    pub listing: String,
    /// Bulk archive location, relative to the content root.
    pub archive: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            content_root: "lib".to_string(),
            manifest: "manifest.json".to_string(),
            listing: "files.json".to_string(),
            archive: "library.tar.gz".to_string(),
        }
    }
}

impl SourceConfig {
    /// Returns `true` if the content root is served over HTTP.
    pub fn is_remote(&self) -> bool {
        self.content_root.starts_with("http://") || self.content_root.starts_with("https://")
    }
}

/// How the set of artifacts to load is chosen.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Resolve the program's imports through the manifest and fetch only
    /// what it needs (default).
    #[default]
    Precise,
    /// Fetch every artifact in the server's file listing.
    Bulk,
}

/// Fetch orchestration settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of concurrent fetch workers.
    pub workers: usize,
    /// Wall-clock limit for one fetch batch, in seconds.
    pub timeout_secs: u64,
    /// Number of invalid primary artifacts reported individually per batch.
    pub max_invalid_reports: usize,
    /// Resolution strategy.
    pub strategy: Strategy,
    /// Fall back to bulk loading when the manifest cannot be loaded.
    pub fallback_to_bulk: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            timeout_secs: 120,
            max_invalid_reports: 10,
            strategy: Strategy::Precise,
            fallback_to_bulk: true,
        }
    }
}

impl FetchConfig {
    /// Returns the batch timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Suffixes appended to a module's base path.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Suffix of the primary artifact.
    pub primary_suffix: String,
    /// Suffixes of the two optional variant artifacts.
    pub variant_suffixes: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            primary_suffix: PRIMARY_SUFFIX.to_string(),
            variant_suffixes: VARIANT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LayoutConfig {
    /// Converts to an [`ArtifactLayout`]. Fails unless there are exactly two
    /// variant suffixes.
    pub fn to_layout(&self) -> Result<ArtifactLayout, ConfigError> {
        let [private, server] = self.variant_suffixes.as_slice() else {
            return Err(ConfigError::ValidationError(format!(
                "layout.variant_suffixes must list exactly 2 suffixes, found {}",
                self.variant_suffixes.len()
            )));
        };
        Ok(ArtifactLayout {
            primary_suffix: self.primary_suffix.clone(),
            variant_suffixes: [private.clone(), server.clone()],
        })
    }
}

/// Import analysis conventions.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImportsConfig {
    /// Root module imported implicitly.
    pub prelude: String,
    /// Token that opts a file out of the implicit import.
    pub opt_out: String,
    /// Line-comment marker.
    pub comment: String,
}

impl Default for ImportsConfig {
    fn default() -> Self {
        Self {
            prelude: "Init".to_string(),
            opt_out: "prelude".to_string(),
            comment: "--".to_string(),
        }
    }
}

/// Execution sandbox settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit for one execution, in seconds.
    pub timeout_secs: u64,
    /// Arguments passed to the runtime binary.
    ///
    /// Accepts a single string or a list of strings.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub args: Vec<String>,
    /// Path the sandbox writes the program to before running it.
    pub target_path: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            args: Vec::new(),
            target_path: None,
        }
    }
}

impl SandboxConfig {
    /// Returns the execution timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
