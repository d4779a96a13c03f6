//! Source text → resolved module set → candidate artifact paths.

use std::collections::{BTreeSet, HashSet};

use oleander_common::{ArtifactLayout, ArtifactPath, ModuleName};
use serde::{Deserialize, Serialize};

use crate::imports::ImportRules;
use crate::manifest::Manifest;

/// The resolved dependencies of one program.
///
/// Recomputed for every analysis; only the fetched artifact bytes are cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySet {
    /// Modules named by `import` lines, in source order, deduplicated.
    pub explicit_imports: Vec<ModuleName>,
    /// Modules imported without being named (the prelude).
    pub implicit_imports: Vec<ModuleName>,
    /// Seeds plus everything they reach, sorted and deduplicated.
    pub all_modules: Vec<ModuleName>,
    /// Candidate artifact paths for `all_modules`, sorted and deduplicated.
    pub olean_paths: Vec<ArtifactPath>,
}

/// Resolves programs against a loaded manifest.
pub struct Resolver<'a> {
    manifest: &'a Manifest,
    rules: &'a ImportRules,
    layout: &'a ArtifactLayout,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `manifest` using the given import rules and
    /// artifact layout.
    pub fn new(manifest: &'a Manifest, rules: &'a ImportRules, layout: &'a ArtifactLayout) -> Self {
        Self {
            manifest,
            rules,
            layout,
        }
    }

    /// Analyzes source text into its full dependency set.
    pub fn analyze(&self, source: &str) -> DependencySet {
        let explicit_imports = dedup_preserving_order(self.rules.parse_explicit(source));
        let implicit_imports = self.rules.detect_implicit(source);

        let seeds = dedup_preserving_order(
            explicit_imports
                .iter()
                .chain(implicit_imports.iter())
                .cloned(),
        );
        let all_modules = self.resolve_modules(&seeds);
        let olean_paths = expand_to_artifact_paths(&all_modules, self.layout);

        tracing::debug!(
            seeds = seeds.len(),
            modules = all_modules.len(),
            paths = olean_paths.len(),
            "resolved dependencies"
        );

        DependencySet {
            explicit_imports,
            implicit_imports,
            all_modules,
            olean_paths,
        }
    }

    /// Returns `seeds` plus their transitive closure, sorted.
    pub fn resolve_modules(&self, seeds: &[ModuleName]) -> Vec<ModuleName> {
        let mut all: BTreeSet<ModuleName> = self.manifest.closure_of(seeds.iter());
        all.extend(seeds.iter().cloned());
        all.into_iter().collect()
    }
}

/// Expands modules into their three candidate artifact paths each.
///
/// The result is deduplicated and sorted lexicographically.
pub fn expand_to_artifact_paths(modules: &[ModuleName], layout: &ArtifactLayout) -> Vec<ArtifactPath> {
    modules
        .iter()
        .flat_map(|module| layout.candidates(module))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn dedup_preserving_order(names: impl IntoIterator<Item = ModuleName>) -> Vec<ModuleName> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
