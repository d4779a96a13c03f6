//! One execution round trip with a sandbox instance.

use std::time::Duration;

use crate::channel::SandboxChannel;
use crate::error::SandboxError;
use crate::messages::{HostMessage, LibraryFile, SandboxEvent};

/// What to run and with which library.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Arguments passed to the runtime binary.
    pub args: Vec<String>,
    /// Program text.
    pub source: Option<String>,
    /// Where the sandbox writes the program.
    pub target_path: Option<String>,
    /// Files to stage before execution. Empty means no `loadLibrary` step.
    pub library: Vec<LibraryFile>,
}

/// Everything the sandbox reported for one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// The runtime's exit code.
    pub exit_code: i32,
    /// Standard output chunks in arrival order.
    pub stdout: Vec<String>,
    /// Standard error chunks in arrival order.
    pub stderr: Vec<String>,
    /// Status updates in arrival order.
    pub progress: Vec<String>,
}

impl ExecutionOutput {
    /// Standard output joined into one string.
    pub fn stdout_text(&self) -> String {
        self.stdout.concat()
    }

    /// Standard error joined into one string.
    pub fn stderr_text(&self) -> String {
        self.stderr.concat()
    }
}

/// Runs one program on a fresh sandbox channel.
///
/// Waits for `ready`, sends `configure`, stages the library (waiting for
/// `libraryReceived`) when there is one, sends `start` and collects output
/// until `done`. An `error` event, a closed channel or an out-of-order event
/// ends the run with an error. `timeout` bounds the whole exchange; the
/// channel is dropped on every exit path, which is the teardown.
pub async fn execute(
    mut channel: Box<dyn SandboxChannel>,
    request: ExecutionRequest,
    timeout: Duration,
) -> Result<ExecutionOutput, SandboxError> {
    let mut exchange = Exchange {
        channel: channel.as_mut(),
        output: ExecutionOutput::default(),
    };
    match tokio::time::timeout(timeout, exchange.run(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "sandbox did not finish in time");
            Err(SandboxError::Timeout { after: timeout })
        }
    }
}

struct Exchange<'c> {
    channel: &'c mut dyn SandboxChannel,
    output: ExecutionOutput,
}

impl Exchange<'_> {
    async fn run(&mut self, request: ExecutionRequest) -> Result<ExecutionOutput, SandboxError> {
        self.expect(SandboxEvent::Ready, "ready").await?;
        self.channel
            .send(HostMessage::Configure {
                args: request.args,
                source: request.source,
                target_path: request.target_path,
            })
            .await?;

        if !request.library.is_empty() {
            let files = request.library.len();
            self.channel
                .send(HostMessage::LoadLibrary {
                    files: request.library,
                })
                .await?;
            self.expect(SandboxEvent::LibraryReceived, "libraryReceived")
                .await?;
            tracing::debug!(files, "sandbox received library");
        }

        self.channel.send(HostMessage::Start).await?;
        match self.next().await? {
            SandboxEvent::Done { exit_code } => {
                tracing::debug!(exit_code, "sandbox finished");
                self.output.exit_code = exit_code;
                Ok(std::mem::take(&mut self.output))
            }
            other => Err(SandboxError::Protocol {
                expected: "done",
                got: other.kind().to_string(),
            }),
        }
    }

    async fn expect(&mut self, want: SandboxEvent, name: &'static str) -> Result<(), SandboxError> {
        let event = self.next().await?;
        if event == want {
            Ok(())
        } else {
            Err(SandboxError::Protocol {
                expected: name,
                got: event.kind().to_string(),
            })
        }
    }

    /// Next control event. Output chunks are collected on the way and an
    /// `error` event becomes [`SandboxError::Reported`].
    async fn next(&mut self) -> Result<SandboxEvent, SandboxError> {
        loop {
            match self.channel.recv().await? {
                None => return Err(SandboxError::Closed),
                Some(SandboxEvent::Stdout { text }) => self.output.stdout.push(text),
                Some(SandboxEvent::Stderr { text }) => self.output.stderr.push(text),
                Some(SandboxEvent::Progress { text }) => {
                    tracing::debug!(%text, "sandbox progress");
                    self.output.progress.push(text);
                }
                Some(SandboxEvent::Error { message }) => {
                    return Err(SandboxError::Reported(message))
                }
                Some(event) => return Ok(event),
            }
        }
    }
}
