//! Stage-then-execute, the top-level run operation.

use std::sync::Arc;
use std::time::Duration;

use oleander_config::SandboxConfig;
use oleander_loader::{Preparation, ProgressFn, Session, StagedLibrary};

use crate::channel::SandboxFactory;
use crate::error::RunError;
use crate::exchange::{execute, ExecutionOutput, ExecutionRequest};
use crate::messages::LibraryFile;

/// Per-run sandbox settings.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Arguments passed to the runtime binary.
    pub args: Vec<String>,
    /// Where the sandbox writes the program.
    pub target_path: Option<String>,
    /// Wall-clock limit for the sandbox exchange.
    pub timeout: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl RunSettings {
    /// Builds settings from the `[sandbox]` config section.
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            args: config.args.clone(),
            target_path: config.target_path.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Result of [`Runner::run`].
#[derive(Debug)]
pub struct RunOutcome {
    /// What was resolved and staged.
    pub preparation: Preparation,
    /// What the sandbox reported.
    pub output: ExecutionOutput,
}

/// Runs programs against a session's library, one fresh sandbox per run.
pub struct Runner {
    session: Arc<Session>,
    factory: Arc<dyn SandboxFactory>,
    settings: RunSettings,
}

impl Runner {
    /// Creates a runner.
    pub fn new(session: Arc<Session>, factory: Arc<dyn SandboxFactory>, settings: RunSettings) -> Self {
        Self {
            session,
            factory,
            settings,
        }
    }

    /// The session the runner stages from.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Resolves and stages `source`'s library, then executes `source` in a
    /// new sandbox instance.
    pub async fn run(&self, source: &str, progress: Option<ProgressFn>) -> Result<RunOutcome, RunError> {
        let preparation = self.session.prepare(source, progress).await?;
        let request = ExecutionRequest {
            args: self.settings.args.clone(),
            source: Some(source.to_string()),
            target_path: self.settings.target_path.clone(),
            library: library_files(&preparation.staged.library),
        };
        tracing::debug!(
            files = request.library.len(),
            bytes = preparation.staged.library.total_bytes(),
            "starting sandbox"
        );

        let channel = self.factory.spawn().await?;
        let output = execute(channel, request, self.settings.timeout).await?;
        Ok(RunOutcome {
            preparation,
            output,
        })
    }
}

/// Converts a staged library into `loadLibrary` payload entries.
pub fn library_files(library: &StagedLibrary) -> Vec<LibraryFile> {
    library
        .to_files()
        .into_iter()
        .map(|(name, bytes)| LibraryFile { name, bytes })
        .collect()
}
