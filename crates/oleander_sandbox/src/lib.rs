//! The host side of the execution sandbox.
//!
//! A sandbox is an isolated runtime instance that receives a library and a
//! program, runs it once and reports the output. This crate defines the
//! message contract, the channel abstraction over which messages travel, and
//! the [`Runner`] that stages a program's library through a
//! [`Session`](oleander_loader::Session) before executing it.

#![warn(missing_docs)]

pub mod channel;
pub mod error;
pub mod exchange;
pub mod messages;
pub mod runner;

pub use channel::{
    channel_pair, InProcessFactory, LocalChannel, ProcessFactory, SandboxChannel, SandboxEndpoint,
    SandboxFactory,
};
pub use error::{RunError, SandboxError};
pub use exchange::{execute, ExecutionOutput, ExecutionRequest};
pub use messages::{HostMessage, LibraryFile, SandboxEvent};
pub use runner::{library_files, RunOutcome, RunSettings, Runner};
