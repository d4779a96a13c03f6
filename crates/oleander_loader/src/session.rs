//! The loader session: owner of every cache.
//!
//! A [`Session`] holds the manifest and file-listing singletons and the
//! artifact byte cache. Each is populated on first use and shared by every
//! later run. Embedders pass the session around in an `Arc`; dropping it
//! releases everything.

use std::collections::BTreeSet;
use std::sync::Arc;

use oleander_archive as archive;
use oleander_common::{artifact, ArtifactKind, ArtifactLayout, ArtifactPath};
use oleander_config::{ProjectConfig, Strategy};
use oleander_resolve::{DependencySet, ImportRules, Manifest, Resolver};
use tokio::sync::{Mutex, OnceCell};

use crate::cache::{ArtifactCache, StagedLibrary};
use crate::error::LoaderError;
use crate::fetch::{fetch_many, FetchOptions, ProgressFn};
use crate::transport::{transport_for, Transport};

/// Everything a [`Session`] needs to know besides its transport.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Artifact suffix layout.
    pub layout: ArtifactLayout,
    /// Import analysis conventions.
    pub rules: ImportRules,
    /// Fetch batch settings.
    pub fetch: FetchOptions,
    /// Manifest location relative to the content root.
    pub manifest_path: String,
    /// File listing location relative to the content root.
    pub listing_path: String,
    /// Bulk archive location relative to the content root.
    pub archive_path: String,
    /// How [`Session::prepare`] chooses what to load.
    pub strategy: Strategy,
    /// Whether a missing manifest makes [`Session::prepare`] load everything.
    pub fallback_to_bulk: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::with_layout(&ProjectConfig::default(), ArtifactLayout::default())
    }
}

impl SessionConfig {
    /// Builds a session config from a parsed `oleander.toml`.
    ///
    /// Fails if the `[layout]` section does not describe a valid layout.
    pub fn from_project(config: &ProjectConfig) -> Result<Self, LoaderError> {
        Ok(Self::with_layout(config, config.layout.to_layout()?))
    }

    fn with_layout(config: &ProjectConfig, layout: ArtifactLayout) -> Self {
        Self {
            rules: ImportRules {
                comment_marker: config.imports.comment.clone(),
                prelude_module: config.imports.prelude.as_str().into(),
                opt_out_token: config.imports.opt_out.clone(),
            },
            fetch: FetchOptions::from_config(&config.fetch, layout.clone()),
            layout,
            manifest_path: config.source.manifest.clone(),
            listing_path: config.source.listing.clone(),
            archive_path: config.source.archive.clone(),
            strategy: config.fetch.strategy,
            fallback_to_bulk: config.fetch.fallback_to_bulk,
        }
    }
}

/// Result of one staging run.
#[derive(Debug, Default)]
pub struct StageReport {
    /// The requested artifacts that are now available.
    pub library: StagedLibrary,
    /// Artifacts retrieved by this run.
    pub fetched: usize,
    /// Requested artifacts that were already cached.
    pub cached: usize,
    /// Paths that could not be retrieved.
    pub missing: Vec<ArtifactPath>,
    /// Primary artifacts rejected by validation.
    pub invalid: Vec<ArtifactPath>,
}

/// Result of [`Session::prepare`].
#[derive(Debug)]
pub struct Preparation {
    /// The strategy that actually ran, after any fallback.
    pub strategy: Strategy,
    /// The resolved dependencies; `None` for bulk loads.
    pub dependencies: Option<DependencySet>,
    /// What was staged.
    pub staged: StageReport,
}

/// Counts from [`Session::load_bulk_archive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveLoad {
    /// Artifact entries found in the archive.
    pub entries: usize,
    /// Entries newly added to the cache.
    pub added: usize,
    /// Primary artifacts rejected by validation.
    pub invalid: usize,
}

/// Owner of the manifest, the file listing and the artifact cache.
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    cache: ArtifactCache,
    manifest: OnceCell<Arc<Manifest>>,
    listing: OnceCell<Arc<Vec<ArtifactPath>>>,
    staging: Mutex<()>,
}

struct Unavailable {
    location: String,
    reason: String,
}

impl Session {
    /// Creates a session that reads through `transport`.
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            cache: ArtifactCache::new(),
            manifest: OnceCell::new(),
            listing: OnceCell::new(),
            staging: Mutex::new(()),
        }
    }

    /// Creates a session for a parsed project config, picking the transport
    /// from the configured content root.
    pub fn from_config(config: &ProjectConfig) -> Result<Self, LoaderError> {
        Ok(Self::new(
            SessionConfig::from_project(config)?,
            transport_for(&config.source),
        ))
    }

    /// The session's settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session's artifact cache.
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Returns the dependency manifest, fetching it on first use.
    ///
    /// Concurrent callers share one in-flight fetch. A failed load leaves
    /// nothing behind, so the next call tries again.
    pub async fn manifest(&self) -> Result<Arc<Manifest>, LoaderError> {
        self.manifest
            .get_or_try_init(|| async {
                let bytes = self
                    .fetch_metadata(&self.config.manifest_path)
                    .await
                    .map_err(Unavailable::into_manifest)?;
                let manifest = Manifest::from_slice(&bytes).map_err(|e| {
                    LoaderError::ManifestUnavailable {
                        location: self.transport.locate(&self.config.manifest_path),
                        reason: e.to_string(),
                    }
                })?;
                tracing::info!(
                    modules = manifest.modules.len(),
                    version = %manifest.version,
                    "loaded dependency manifest"
                );
                Ok::<_, LoaderError>(Arc::new(manifest))
            })
            .await
            .map(Arc::clone)
    }

    /// Returns the server's flat artifact listing, fetching it on first use.
    ///
    /// Entries that are not artifact files are dropped; the rest are
    /// deduplicated and sorted. Same sharing and retry rules as
    /// [`manifest`](Self::manifest).
    pub async fn file_listing(&self) -> Result<Arc<Vec<ArtifactPath>>, LoaderError> {
        self.listing
            .get_or_try_init(|| async {
                let bytes = self
                    .fetch_metadata(&self.config.listing_path)
                    .await
                    .map_err(Unavailable::into_listing)?;
                let entries: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
                    LoaderError::ListingUnavailable {
                        location: self.transport.locate(&self.config.listing_path),
                        reason: e.to_string(),
                    }
                })?;
                let listed = entries.len();
                let paths: BTreeSet<ArtifactPath> = entries
                    .into_iter()
                    .filter(|p| self.config.layout.is_artifact(p))
                    .map(ArtifactPath::from)
                    .collect();
                tracing::info!(listed, artifacts = paths.len(), "loaded file listing");
                Ok::<_, LoaderError>(Arc::new(paths.into_iter().collect()))
            })
            .await
            .map(Arc::clone)
    }

    /// Resolves `source` against the manifest.
    pub async fn analyze(&self, source: &str) -> Result<DependencySet, LoaderError> {
        let manifest = self.manifest().await?;
        let resolver = Resolver::new(&manifest, &self.config.rules, &self.config.layout);
        Ok(resolver.analyze(source))
    }

    /// Makes `paths` available, fetching whatever is not cached yet.
    ///
    /// Runs one at a time per session: a second caller waits and then finds
    /// the first caller's artifacts in the cache.
    pub async fn stage(
        &self,
        paths: &[ArtifactPath],
        progress: Option<ProgressFn>,
    ) -> Result<StageReport, LoaderError> {
        let _staging = self.staging.lock().await;

        let pending = self.cache.uncached(paths);
        let cached = paths.len() - pending.len();
        tracing::debug!(requested = paths.len(), cached, "staging artifacts");

        let report = fetch_many(
            Arc::clone(&self.transport),
            pending,
            &self.config.fetch,
            progress,
        )
        .await?;
        let fetched = self.cache.extend(report.files);

        Ok(StageReport {
            library: self.cache.snapshot(paths),
            fetched,
            cached,
            missing: report.missing,
            invalid: report.invalid,
        })
    }

    /// Resolves `source` and stages its artifacts, honoring the configured
    /// strategy.
    ///
    /// Under [`Strategy::Precise`] an unavailable manifest falls back to
    /// [`prepare_all`](Self::prepare_all) when the session allows it.
    pub async fn prepare(
        &self,
        source: &str,
        progress: Option<ProgressFn>,
    ) -> Result<Preparation, LoaderError> {
        if self.config.strategy == Strategy::Bulk {
            return self.prepare_all(progress).await;
        }
        match self.analyze(source).await {
            Ok(dependencies) => {
                let staged = self.stage(&dependencies.olean_paths, progress).await?;
                Ok(Preparation {
                    strategy: Strategy::Precise,
                    dependencies: Some(dependencies),
                    staged,
                })
            }
            Err(e @ LoaderError::ManifestUnavailable { .. }) if self.config.fallback_to_bulk => {
                tracing::warn!(error = %e, "manifest unavailable, loading the whole library");
                self.prepare_all(progress).await
            }
            Err(e) => Err(e),
        }
    }

    /// Stages every artifact in the server's file listing.
    pub async fn prepare_all(&self, progress: Option<ProgressFn>) -> Result<Preparation, LoaderError> {
        let listing = self.file_listing().await?;
        let staged = self.stage(&listing, progress).await?;
        Ok(Preparation {
            strategy: Strategy::Bulk,
            dependencies: None,
            staged,
        })
    }

    /// Fetches the bulk archive and adds its valid artifacts to the cache.
    ///
    /// Entries are validated the way [`fetch_many`] validates single
    /// fetches: invalid primaries are counted and logged, invalid variants
    /// are dropped silently.
    pub async fn load_bulk_archive(&self) -> Result<ArchiveLoad, LoaderError> {
        let bytes = self
            .fetch_metadata(&self.config.archive_path)
            .await
            .map_err(Unavailable::into_archive)?;
        let entries = archive::decode(&bytes)?;

        let _staging = self.staging.lock().await;
        let mut load = ArchiveLoad::default();
        let mut accepted = Vec::new();
        for (name, data) in entries {
            if !self.config.layout.is_artifact(&name) {
                continue;
            }
            load.entries += 1;
            let path = ArtifactPath::from(name);
            match (artifact::inspect(&data), self.config.layout.kind_of(&path)) {
                (Ok(()), _) => accepted.push((path, Arc::from(data))),
                (Err(defect), ArtifactKind::Primary) => {
                    if load.invalid < self.config.fetch.max_invalid_reports {
                        tracing::warn!(
                            path = %path,
                            %defect,
                            "archived artifact failed validation; library and runtime versions may not match"
                        );
                    }
                    load.invalid += 1;
                }
                (Err(_), ArtifactKind::Variant) => {}
            }
        }
        load.added = self.cache.extend(accepted);
        tracing::info!(
            entries = load.entries,
            added = load.added,
            invalid = load.invalid,
            "loaded bulk archive"
        );
        Ok(load)
    }

    async fn fetch_metadata(&self, path: &str) -> Result<Vec<u8>, Unavailable> {
        let unavailable = |reason: String| Unavailable {
            location: self.transport.locate(path),
            reason,
        };
        match self.transport.get(path).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(unavailable("not found".to_string())),
            Err(e) => Err(unavailable(e.to_string())),
        }
    }
}

impl Unavailable {
    fn into_manifest(self) -> LoaderError {
        LoaderError::ManifestUnavailable {
            location: self.location,
            reason: self.reason,
        }
    }

    fn into_listing(self) -> LoaderError {
        LoaderError::ListingUnavailable {
            location: self.location,
            reason: self.reason,
        }
    }

    fn into_archive(self) -> LoaderError {
        LoaderError::ArchiveUnavailable {
            location: self.location,
            reason: self.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use oleander_common::MIN_HEADER_LEN;
    use std::io::Write;
    use std::time::Duration;

    const MANIFEST: &str = r#"{
        "version": "4.9.0",
        "generatedAt": "2024-06-01T00:00:00Z",
        "modules": {
            "Init": { "path": "Init.olean", "imports": ["Init.Prelude", "Init.Core"] },
            "Init.Prelude": { "path": "Init/Prelude.olean", "imports": [] },
            "Init.Core": { "path": "Init/Core.olean", "imports": ["Init.Prelude"] },
            "Std.Data": { "path": "Std/Data.olean", "imports": ["Init"] }
        }
    }"#;

    fn artifact_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; MIN_HEADER_LEN];
        bytes[..4].copy_from_slice(b"olea");
        bytes
    }

    fn library() -> MemoryTransport {
        MemoryTransport::new()
            .with_file("manifest.json", MANIFEST)
            .with_file("files.json", r#"["Init.olean", "Init/Core.olean", "README.md", "Init.olean"]"#)
            .with_file("Init.olean", artifact_bytes())
            .with_file("Init/Prelude.olean", artifact_bytes())
            .with_file("Init/Core.olean", artifact_bytes())
            .with_file("Init/Core.olean.server", artifact_bytes())
            .with_file("Std/Data.olean", artifact_bytes())
    }

    fn session(transport: &Arc<MemoryTransport>) -> Session {
        Session::new(SessionConfig::default(), transport.clone())
    }

    #[tokio::test]
    async fn concurrent_manifest_loads_share_one_fetch() {
        let transport = Arc::new(library().with_latency(Duration::from_millis(10)));
        let session = session(&transport);

        let (a, b) = tokio::join!(session.manifest(), session.manifest());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(transport.requests_for("manifest.json"), 1);
        assert_eq!(a.version, "4.9.0");
    }

    #[tokio::test]
    async fn failed_manifest_load_is_retried() {
        let transport = Arc::new(MemoryTransport::new().with_failure("manifest.json"));
        let session = session(&transport);

        let err = session.manifest().await.unwrap_err();
        assert!(matches!(err, LoaderError::ManifestUnavailable { .. }));
        assert!(session.manifest().await.is_err());
        assert_eq!(transport.requests_for("manifest.json"), 2);
    }

    #[tokio::test]
    async fn concurrent_listing_loads_share_one_fetch() {
        let transport = Arc::new(library().with_latency(Duration::from_millis(10)));
        let session = session(&transport);

        let (a, b) = tokio::join!(session.file_listing(), session.file_listing());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(transport.requests_for("files.json"), 1);
        let listed: Vec<&str> = a.iter().map(ArtifactPath::as_str).collect();
        assert_eq!(listed, vec!["Init.olean", "Init/Core.olean"]);
    }

    #[tokio::test]
    async fn failed_listing_load_is_retried() {
        let transport = Arc::new(MemoryTransport::new().with_failure("files.json"));
        let session = session(&transport);

        let err = session.file_listing().await.unwrap_err();
        assert!(matches!(err, LoaderError::ListingUnavailable { .. }));
        assert!(session.file_listing().await.is_err());
        assert_eq!(transport.requests_for("files.json"), 2);
    }

    #[tokio::test]
    async fn malformed_manifest_is_unavailable() {
        let transport = Arc::new(MemoryTransport::new().with_file("manifest.json", "{not json"));
        let err = session(&transport).manifest().await.unwrap_err();
        assert!(err.to_string().contains("memory:manifest.json"));
    }

    #[tokio::test]
    async fn prepare_stages_resolved_artifacts() {
        let transport = Arc::new(library());
        let session = session(&transport);

        let prep = session.prepare("import Init.Core\n#eval 1", None).await.unwrap();
        assert_eq!(prep.strategy, Strategy::Precise);
        let deps = prep.dependencies.unwrap();
        let modules: Vec<&str> = deps.all_modules.iter().map(|m| m.as_str()).collect();
        assert_eq!(modules, vec!["Init", "Init.Core", "Init.Prelude"]);
        assert_eq!(deps.olean_paths.len(), 9);

        let staged: Vec<&str> = prep.staged.library.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            staged,
            vec![
                "Init.olean",
                "Init/Core.olean",
                "Init/Core.olean.server",
                "Init/Prelude.olean"
            ]
        );
        assert_eq!(prep.staged.fetched, 4);
        assert_eq!(prep.staged.cached, 0);
        assert_eq!(prep.staged.missing.len(), 5);
    }

    #[tokio::test]
    async fn second_run_reuses_cache() {
        let transport = Arc::new(library());
        let session = session(&transport);

        session.prepare("import Init.Core", None).await.unwrap();
        let before = transport.request_count();
        let prep = session.prepare("import Std.Data", None).await.unwrap();

        // Misses from the first run are retried; hits are not.
        assert_eq!(transport.request_count() - before, 8);
        assert_eq!(prep.staged.fetched, 1);
        assert_eq!(prep.staged.cached, 4);
        assert_eq!(transport.requests_for("Init.olean"), 1);
        assert!(prep
            .staged
            .library
            .get(&ArtifactPath::from("Init/Prelude.olean"))
            .is_some());
    }

    #[tokio::test]
    async fn concurrent_prepares_fetch_each_path_once() {
        let transport = Arc::new(library().with_latency(Duration::from_millis(5)));
        let session = session(&transport);

        let (a, b) = tokio::join!(
            session.prepare("import Init.Core", None),
            session.prepare("import Init.Core", None)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.staged.library.len(), b.staged.library.len());
        assert_eq!(transport.requests_for("Init/Core.olean"), 1);
        assert_eq!(a.staged.fetched + b.staged.fetched, 4);
    }

    #[tokio::test]
    async fn progress_reports_every_attempt() {
        let transport = Arc::new(library());
        let session = session(&transport);
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let progress: ProgressFn = Arc::new(move |loaded, total| sink.lock().push((loaded, total)));

        session.prepare("prelude\nimport Init.Prelude", Some(progress)).await.unwrap();
        assert_eq!(*calls.lock(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn missing_manifest_falls_back_to_listing() {
        let transport = Arc::new(
            MemoryTransport::new()
                .with_file("files.json", r#"["Init.olean", "Init/Core.olean"]"#)
                .with_file("Init.olean", artifact_bytes())
                .with_file("Init/Core.olean", artifact_bytes()),
        );
        let session = session(&transport);

        let prep = session.prepare("import Init.Core", None).await.unwrap();
        assert_eq!(prep.strategy, Strategy::Bulk);
        assert!(prep.dependencies.is_none());
        assert_eq!(prep.staged.library.len(), 2);
    }

    #[tokio::test]
    async fn fallback_can_be_disabled() {
        let transport = Arc::new(MemoryTransport::new());
        let config = SessionConfig {
            fallback_to_bulk: false,
            ..SessionConfig::default()
        };
        let session = Session::new(config, transport.clone());

        let err = session.prepare("import Init", None).await.unwrap_err();
        assert!(matches!(err, LoaderError::ManifestUnavailable { .. }));
        assert_eq!(transport.requests_for("files.json"), 0);
    }

    #[tokio::test]
    async fn bulk_strategy_skips_manifest() {
        let transport = Arc::new(library());
        let config = SessionConfig {
            strategy: Strategy::Bulk,
            ..SessionConfig::default()
        };
        let session = Session::new(config, transport.clone());

        let prep = session.prepare("import Init.Core", None).await.unwrap();
        assert_eq!(prep.strategy, Strategy::Bulk);
        assert_eq!(transport.requests_for("manifest.json"), 0);

        let listing = session.file_listing().await.unwrap();
        let listed: Vec<&str> = listing.iter().map(ArtifactPath::as_str).collect();
        assert_eq!(listed, vec!["Init.olean", "Init/Core.olean"]);
        assert_eq!(transport.requests_for("files.json"), 1);
    }

    #[tokio::test]
    async fn listing_must_be_string_array() {
        let transport = Arc::new(MemoryTransport::new().with_file("files.json", r#"{"a": 1}"#));
        let err = session(&transport).file_listing().await.unwrap_err();
        assert!(matches!(err, LoaderError::ListingUnavailable { .. }));
    }

    fn gzipped_tar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_ustar();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_slice()).unwrap();
        }
        let tar = builder.into_inner().unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar).unwrap();
        gz.finish().unwrap()
    }

    #[tokio::test]
    async fn bulk_archive_fills_cache() {
        let archive = gzipped_tar(&[
            ("Init.olean", artifact_bytes()),
            ("Init.olean.server", artifact_bytes()),
            ("Init/Core.olean", b"corrupt".to_vec()),
            ("Init/Core.olean.private", b"corrupt".to_vec()),
            ("LICENSE", b"text".to_vec()),
        ]);
        let transport = Arc::new(MemoryTransport::new().with_file("library.tar.gz", archive));
        let session = session(&transport);

        let load = session.load_bulk_archive().await.unwrap();
        assert_eq!(
            load,
            ArchiveLoad {
                entries: 4,
                added: 2,
                invalid: 1
            }
        );
        assert!(session.cache().contains(&ArtifactPath::from("Init.olean.server")));
        assert!(!session.cache().contains(&ArtifactPath::from("Init/Core.olean")));
    }

    #[tokio::test]
    async fn missing_archive_is_unavailable() {
        let transport = Arc::new(MemoryTransport::new());
        let err = session(&transport).load_bulk_archive().await.unwrap_err();
        assert!(matches!(err, LoaderError::ArchiveUnavailable { .. }));
    }

    #[test]
    fn config_from_project() {
        let project = oleander_config::load_config_from_str(
            "[fetch]\nworkers = 3\nstrategy = \"bulk\"\n[imports]\nprelude = \"Core\"\n",
        )
        .unwrap();
        let config = SessionConfig::from_project(&project).unwrap();
        assert_eq!(config.fetch.workers, 3);
        assert_eq!(config.strategy, Strategy::Bulk);
        assert_eq!(config.rules.prelude_module.as_str(), "Core");
        assert_eq!(config.manifest_path, "manifest.json");
    }

    #[test]
    fn config_rejects_bad_layout() {
        let mut project = ProjectConfig::default();
        project.layout.variant_suffixes = vec![".olean.private".to_string()];
        let err = SessionConfig::from_project(&project).unwrap_err();
        assert!(matches!(err, LoaderError::Config(_)));
        assert!(Session::from_config(&project).is_err());
    }
}
