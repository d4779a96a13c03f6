//! Transports between the host and a sandbox instance.
//!
//! Messages cross the boundary as JSON text, one message per frame. The host
//! side of every channel parses incoming frames with
//! [`SandboxEvent::parse`] so nothing unvalidated reaches the exchange logic.

use std::future::Future;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use crate::error::SandboxError;
use crate::messages::{HostMessage, SandboxEvent};

/// Host end of a connection to one sandbox instance.
///
/// Dropping the channel tears the connection down.
#[async_trait]
pub trait SandboxChannel: Send {
    /// Sends one message to the sandbox.
    async fn send(&mut self, message: HostMessage) -> Result<(), SandboxError>;

    /// Waits for the next event. `Ok(None)` means the sandbox closed the
    /// connection.
    async fn recv(&mut self) -> Result<Option<SandboxEvent>, SandboxError>;
}

/// Starts fresh sandbox instances. Every run gets its own.
#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Starts a new sandbox and returns the host end of its channel.
    async fn spawn(&self) -> Result<Box<dyn SandboxChannel>, SandboxError>;
}

/// Frames buffered per direction by [`channel_pair`].
pub const CHANNEL_CAPACITY: usize = 64;

/// Creates a connected in-process channel.
pub fn channel_pair() -> (LocalChannel, SandboxEndpoint) {
    let (host_tx, host_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        LocalChannel {
            tx: host_tx,
            rx: event_rx,
        },
        SandboxEndpoint {
            rx: host_rx,
            tx: event_tx,
        },
    )
}

/// Host end of an in-process channel.
pub struct LocalChannel {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl SandboxChannel for LocalChannel {
    async fn send(&mut self, message: HostMessage) -> Result<(), SandboxError> {
        let frame = message.encode()?;
        self.tx.send(frame).await.map_err(|_| SandboxError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<SandboxEvent>, SandboxError> {
        match self.rx.recv().await {
            Some(frame) => SandboxEvent::parse(&frame).map(Some),
            None => Ok(None),
        }
    }
}

/// Sandbox end of an in-process channel, driven by an embedded runtime.
pub struct SandboxEndpoint {
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<String>,
}

impl SandboxEndpoint {
    /// Waits for the next host message. `None` once the host has hung up.
    pub async fn recv(&mut self) -> Option<Result<HostMessage, SandboxError>> {
        let frame = self.rx.recv().await?;
        Some(HostMessage::parse(&frame))
    }

    /// Sends an event; returns `false` if the host has hung up.
    pub async fn send(&self, event: SandboxEvent) -> bool {
        match event.encode() {
            Ok(frame) => self.send_raw(frame).await,
            Err(_) => false,
        }
    }

    /// Sends an unchecked frame; returns `false` if the host has hung up.
    pub async fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).await.is_ok()
    }
}

/// Runs a sandbox implementation as a tokio task per instance.
pub struct InProcessFactory<F> {
    body: F,
}

impl<F, Fut> InProcessFactory<F>
where
    F: Fn(SandboxEndpoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Creates a factory that runs `body` for every new instance.
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

#[async_trait]
impl<F, Fut> SandboxFactory for InProcessFactory<F>
where
    F: Fn(SandboxEndpoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn spawn(&self) -> Result<Box<dyn SandboxChannel>, SandboxError> {
        let (host, endpoint) = channel_pair();
        tokio::spawn((self.body)(endpoint));
        Ok(Box::new(host))
    }
}

/// Runs each sandbox as a child process speaking newline-delimited JSON on
/// stdin and stdout.
pub struct ProcessFactory {
    program: String,
    args: Vec<String>,
}

impl ProcessFactory {
    /// Creates a factory that launches `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SandboxFactory for ProcessFactory {
    async fn spawn(&self) -> Result<Box<dyn SandboxChannel>, SandboxError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("{}: {e}", self.program)))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SandboxError::Spawn(format!(
                "{}: stdio not captured",
                self.program
            )));
        };
        tracing::debug!(program = %self.program, pid = ?child.id(), "spawned sandbox process");
        Ok(Box::new(ProcessChannel {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        }))
    }
}

/// Host end of a child-process sandbox. The child is killed on drop.
struct ProcessChannel {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl SandboxChannel for ProcessChannel {
    async fn send(&mut self, message: HostMessage) -> Result<(), SandboxError> {
        let mut frame = message.encode()?;
        frame.push('\n');
        self.stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|_| SandboxError::Closed)?;
        self.stdin.flush().await.map_err(|_| SandboxError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<SandboxEvent>, SandboxError> {
        loop {
            match self.stdout.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return SandboxEvent::parse(&line).map(Some),
                Ok(None) => return Ok(None),
                Err(_) => return Err(SandboxError::Closed),
            }
        }
    }
}
