//! Incremental library loading.
//!
//! Fetches the compiled artifacts a program needs from a content root, with
//! bounded concurrency, and keeps them in a session-wide cache so later runs
//! only fetch what is new. The [`Session`] ties manifest resolution,
//! fetching and caching together.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod fetch;
pub mod session;
pub mod transport;

pub use cache::{ArtifactCache, CacheStats, StagedLibrary};
pub use error::{LoaderError, TransportError};
pub use fetch::{fetch_many, FetchOptions, FetchReport, ProgressFn};
pub use session::{ArchiveLoad, Preparation, Session, SessionConfig, StageReport};
pub use transport::{transport_for, DirTransport, HttpTransport, MemoryTransport, Transport};
