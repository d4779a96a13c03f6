//! The precomputed dependency manifest and transitive closure over it.
//!
//! The manifest is generated offline from the library's source tree and
//! served as `manifest.json`. It records, for every module, the path of its
//! primary artifact and its direct imports, so resolution never has to parse
//! library sources at run time.

use std::collections::{BTreeSet, HashMap, HashSet};

use oleander_common::ModuleName;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// Import value meaning "everything"; carries no module name and is never
/// followed.
pub const WILDCARD_IMPORT: &str = "all";

/// Module → direct imports mapping for the whole library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Version of the toolchain the manifest was generated for.
    #[serde(default)]
    pub version: String,

    /// Generation timestamp, as written by the generator.
    #[serde(default)]
    pub generated_at: String,

    /// Per-module entries keyed by canonical dotted name.
    pub modules: HashMap<ModuleName, ModuleInfo>,
}

/// Manifest entry for a single module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    /// Path of the module's primary artifact under the content root.
    #[serde(default, alias = "path")]
    pub canonical_artifact_path: String,

    /// Direct imports in declaration order. May name modules that have no
    /// entry of their own.
    #[serde(default)]
    pub imports: Vec<ModuleName>,
}

impl Manifest {
    /// Parses a manifest from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ResolveError> {
        serde_json::from_str(json).map_err(|e| ResolveError::ManifestParse {
            reason: e.to_string(),
        })
    }

    /// Parses a manifest from raw response bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ResolveError> {
        serde_json::from_slice(bytes).map_err(|e| ResolveError::ManifestParse {
            reason: e.to_string(),
        })
    }

    /// Returns `true` if the manifest has an entry for `module`.
    pub fn contains(&self, module: &ModuleName) -> bool {
        self.modules.contains_key(module)
    }

    /// Returns the direct imports of `module`, or an empty slice when the
    /// module is unknown.
    pub fn imports_of(&self, module: &ModuleName) -> &[ModuleName] {
        self.modules
            .get(module)
            .map_or(&[], |info| info.imports.as_slice())
    }

    /// Returns every module reachable from `start` through imports.
    ///
    /// `start` itself is only included when an import cycle leads back to it.
    /// Names without a manifest entry are included once and not followed.
    pub fn transitive_closure(&self, start: &ModuleName) -> BTreeSet<ModuleName> {
        let mut walk = ClosureWalk::new(self);
        walk.walk_from(start);
        walk.reached
    }

    /// Returns the union of [`transitive_closure`](Self::transitive_closure)
    /// over all `seeds`.
    ///
    /// One walk serves every seed, so a subgraph shared by several seeds is
    /// traversed once.
    pub fn closure_of<'a, I>(&self, seeds: I) -> BTreeSet<ModuleName>
    where
        I: IntoIterator<Item = &'a ModuleName>,
    {
        let mut walk = ClosureWalk::new(self);
        for seed in seeds {
            walk.walk_from(seed);
        }
        walk.reached
    }
}

/// State for one closure computation. Lives for a single call.
struct ClosureWalk<'m> {
    manifest: &'m Manifest,
    /// Modules reached through at least one import edge.
    reached: BTreeSet<ModuleName>,
    /// Modules whose imports have already been pushed.
    expanded: HashSet<ModuleName>,
}

impl<'m> ClosureWalk<'m> {
    fn new(manifest: &'m Manifest) -> Self {
        Self {
            manifest,
            reached: BTreeSet::new(),
            expanded: HashSet::new(),
        }
    }

    fn walk_from(&mut self, start: &ModuleName) {
        let mut stack = Vec::new();
        self.expand(start, &mut stack);
        while let Some(module) = stack.pop() {
            self.reached.insert(module.clone());
            self.expand(&module, &mut stack);
        }
    }

    fn expand(&mut self, module: &ModuleName, stack: &mut Vec<ModuleName>) {
        if !self.expanded.insert(module.clone()) {
            return;
        }
        match self.manifest.modules.get(module) {
            Some(info) => stack.extend(
                info.imports
                    .iter()
                    .filter(|import| import.as_str() != WILDCARD_IMPORT)
                    .cloned(),
            ),
            None => tracing::debug!(module = %module, "not in manifest, treating as leaf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(edges: &[(&str, &[&str])]) -> Manifest {
        let modules = edges
            .iter()
            .map(|(name, imports)| {
                (
                    ModuleName::new(*name),
                    ModuleInfo {
                        canonical_artifact_path: format!("{}.olean", name.replace('.', "/")),
                        imports: imports.iter().map(|i| ModuleName::new(*i)).collect(),
                    },
                )
            })
            .collect();
        Manifest {
            version: "4.0.0".to_string(),
            generated_at: "2024-01-01T00:00:00Z".to_string(),
            modules,
        }
    }

    fn names(set: &BTreeSet<ModuleName>) -> Vec<&str> {
        set.iter().map(ModuleName::as_str).collect()
    }

    #[test]
    fn parse_json_shape() {
        let json = r#"{
            "version": "4.9.0",
            "generatedAt": "2024-06-01T12:00:00Z",
            "modules": {
                "Init": { "canonicalArtifactPath": "Init.olean", "imports": ["Init.Prelude"] },
                "Init.Prelude": { "path": "Init/Prelude.olean", "imports": [] }
            }
        }"#;
        let m = Manifest::from_json(json).unwrap();
        assert_eq!(m.version, "4.9.0");
        assert_eq!(m.generated_at, "2024-06-01T12:00:00Z");
        assert_eq!(m.modules.len(), 2);
        assert_eq!(
            m.modules[&ModuleName::new("Init.Prelude")].canonical_artifact_path,
            "Init/Prelude.olean"
        );
        assert_eq!(m.imports_of(&ModuleName::new("Init")).len(), 1);
    }

    #[test]
    fn parse_failure_is_descriptive() {
        let err = Manifest::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ResolveError::ManifestParse { .. }));
        let err = Manifest::from_slice(br#"{"version": "1"}"#).unwrap_err();
        assert!(err.to_string().contains("modules"));
    }

    #[test]
    fn closure_follows_transitive_imports() {
        let m = manifest(&[
            ("A", &["B", "C"]),
            ("B", &["D"]),
            ("C", &["D", "E"]),
            ("D", &[]),
            ("E", &["F"]),
            ("F", &[]),
        ]);
        let closure = m.transitive_closure(&ModuleName::new("A"));
        assert_eq!(names(&closure), vec!["B", "C", "D", "E", "F"]);
    }

    #[test]
    fn start_excluded_without_cycle() {
        let m = manifest(&[("A", &["B"]), ("B", &[])]);
        let closure = m.transitive_closure(&ModuleName::new("A"));
        assert!(!closure.contains(&ModuleName::new("A")));
    }

    #[test]
    fn mutual_cycle_terminates() {
        let m = manifest(&[("A", &["B"]), ("B", &["A"])]);
        let closure = m.transitive_closure(&ModuleName::new("A"));
        assert_eq!(names(&closure), vec!["A", "B"]);
        assert_eq!(closure.iter().filter(|n| n.as_str() == "B").count(), 1);
    }

    #[test]
    fn self_import_terminates() {
        let m = manifest(&[("A", &["A", "B"]), ("B", &["B"])]);
        let closure = m.transitive_closure(&ModuleName::new("A"));
        assert_eq!(names(&closure), vec!["A", "B"]);
    }

    #[test]
    fn unknown_import_is_recorded_as_leaf() {
        let m = manifest(&[("A", &["Typo.Module", "B"]), ("B", &[])]);
        let closure = m.transitive_closure(&ModuleName::new("A"));
        assert_eq!(names(&closure), vec!["B", "Typo.Module"]);
    }

    #[test]
    fn unknown_start_yields_empty_closure() {
        let m = manifest(&[("A", &[])]);
        assert!(m.transitive_closure(&ModuleName::new("Nope")).is_empty());
    }

    #[test]
    fn wildcard_import_ignored() {
        let m = manifest(&[("A", &["all", "B"]), ("B", &[])]);
        let closure = m.transitive_closure(&ModuleName::new("A"));
        assert_eq!(names(&closure), vec!["B"]);
    }

    #[test]
    fn closure_of_many_seeds_is_union() {
        let m = manifest(&[
            ("A", &["Shared"]),
            ("B", &["Shared", "OnlyB"]),
            ("Shared", &["Deep"]),
            ("Deep", &[]),
            ("OnlyB", &[]),
        ]);
        let seeds = [ModuleName::new("A"), ModuleName::new("B")];
        let union = m.closure_of(seeds.iter());

        let mut expected = m.transitive_closure(&seeds[0]);
        expected.extend(m.transitive_closure(&seeds[1]));
        assert_eq!(union, expected);
        assert_eq!(names(&union), vec!["Deep", "OnlyB", "Shared"]);
    }

    #[test]
    fn seed_reached_from_earlier_seed_is_included() {
        let m = manifest(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        let seeds = [ModuleName::new("A"), ModuleName::new("B")];
        let union = m.closure_of(seeds.iter());
        assert_eq!(names(&union), vec!["B", "C"]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let names: Vec<String> = (0..50_000).map(|i| format!("M{i}")).collect();
        let mut modules = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            let imports = names
                .get(i + 1)
                .map(|next| vec![ModuleName::new(next.as_str())])
                .unwrap_or_default();
            modules.insert(
                ModuleName::new(name.as_str()),
                ModuleInfo {
                    canonical_artifact_path: String::new(),
                    imports,
                },
            );
        }
        let m = Manifest {
            modules,
            ..Manifest::default()
        };
        let closure = m.transitive_closure(&ModuleName::new("M0"));
        assert_eq!(closure.len(), 49_999);
    }
}
