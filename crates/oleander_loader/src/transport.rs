//! Byte transports for the content root.
//!
//! A transport resolves a path relative to the content root and returns the
//! raw bytes, `None` for "not found", or an error for anything else. The
//! orchestrator and the session only ever talk to the [`Transport`] trait.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oleander_config::SourceConfig;
use parking_lot::Mutex;

use crate::error::TransportError;

/// Source of artifact and metadata bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `path` relative to the content root.
    ///
    /// Returns `Ok(None)` when the server or directory has no such file.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// Returns the full location of `path`, for log and error messages.
    fn locate(&self, path: &str) -> String;
}

/// Picks the transport for a configured content root: HTTP for URLs, the
/// filesystem otherwise.
pub fn transport_for(source: &SourceConfig) -> Arc<dyn Transport> {
    if source.is_remote() {
        Arc::new(HttpTransport::new(&source.content_root))
    } else {
        Arc::new(DirTransport::new(&source.content_root))
    }
}

/// Per-request timeout applied by [`HttpTransport`].
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches over HTTP(S) with a shared `ureq` agent.
///
/// Requests are blocking, so each runs on tokio's blocking pool.
pub struct HttpTransport {
    base: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Creates a transport rooted at `base` (a URL prefix).
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(HTTP_REQUEST_TIMEOUT)
                .build(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let url = self.locate(path);
        let agent = self.agent.clone();
        let task_url = url.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &task_url))
            .await
            .map_err(|e| TransportError::Network {
                location: url,
                reason: e.to_string(),
            })?
    }

    fn locate(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

fn fetch_blocking(agent: &ureq::Agent, url: &str) -> Result<Option<Vec<u8>>, TransportError> {
    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(404, _)) => return Ok(None),
        Err(ureq::Error::Status(status, _)) => {
            return Err(TransportError::Status {
                location: url.to_string(),
                status,
            })
        }
        Err(ureq::Error::Transport(t)) => {
            return Err(TransportError::Network {
                location: url.to_string(),
                reason: t.to_string(),
            })
        }
    };
    let mut buf = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut buf)
        .map_err(|e| TransportError::Io {
            location: url.to_string(),
            source: e,
        })?;
    Ok(Some(buf))
}

/// Serves files from a local directory tree.
pub struct DirTransport {
    root: PathBuf,
}

impl DirTransport {
    /// Creates a transport rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Transport for DirTransport {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(TransportError::InvalidPath {
                path: path.to_string(),
            });
        }
        let full = self.root.join(relative);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::Io {
                location: full.display().to_string(),
                source: e,
            }),
        }
    }

    fn locate(&self, path: &str) -> String {
        self.root
            .join(path.trim_start_matches('/'))
            .display()
            .to_string()
    }
}

/// In-memory transport with request accounting.
///
/// Serves a fixed file map, optionally after a delay, and can be told to
/// fail specific paths with a network error. Used by tests and by embedders
/// that already hold the library in memory.
#[derive(Default)]
pub struct MemoryTransport {
    files: HashMap<String, Vec<u8>>,
    failing: Vec<String>,
    latency: Option<Duration>,
    requests: AtomicUsize,
    per_path: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    /// Creates an empty transport; every path is "not found".
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    pub fn with_file(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), bytes.into());
        self
    }

    /// Makes requests for `path` fail with a network error.
    pub fn with_failure(mut self, path: impl Into<String>) -> Self {
        self.failing.push(path.into());
        self
    }

    /// Delays every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Total number of requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of requests made for `path`.
    pub fn requests_for(&self, path: &str) -> usize {
        self.per_path.lock().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.per_path.lock().entry(path.to_string()).or_default() += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.iter().any(|p| p == path) {
            return Err(TransportError::Network {
                location: self.locate(path),
                reason: "connection reset".to_string(),
            });
        }
        Ok(self.files.get(path).cloned())
    }

    fn locate(&self, path: &str) -> String {
        format!("memory:{path}")
    }
}
