//! Messages exchanged with the sandbox.
//!
//! Both directions are closed enums serialized as JSON objects with a `type`
//! tag. Anything the sandbox sends is parsed into a [`SandboxEvent`] before
//! the host acts on it.

use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// One file to be written into the sandbox filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFile {
    /// Path relative to the sandbox library root.
    pub name: String,
    /// Raw file contents, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Standard-alphabet base64 for byte payloads.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}

/// Host → sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Run arguments and the program to run.
    Configure {
        /// Arguments passed to the runtime binary.
        args: Vec<String>,
        /// Program text, if the sandbox should write it out itself.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Where the sandbox writes the program.
        #[serde(
            default,
            rename = "targetPath",
            skip_serializing_if = "Option::is_none"
        )]
        target_path: Option<String>,
    },
    /// Library files to stage before execution.
    LoadLibrary {
        /// The files, in path order.
        files: Vec<LibraryFile>,
    },
    /// Begin execution.
    Start,
}

/// Sandbox → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SandboxEvent {
    /// The sandbox is up and accepts configuration.
    Ready,
    /// The library files have been written.
    LibraryReceived,
    /// A chunk of standard output.
    Stdout {
        /// The text.
        text: String,
    },
    /// A chunk of standard error.
    Stderr {
        /// The text.
        text: String,
    },
    /// A status update.
    Progress {
        /// The text.
        text: String,
    },
    /// Execution finished.
    Done {
        /// The runtime's exit code.
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    /// The sandbox failed.
    Error {
        /// Description of the failure.
        message: String,
    },
}

impl HostMessage {
    /// Serializes the message to its wire form.
    pub fn encode(&self) -> Result<String, SandboxError> {
        serde_json::to_string(self).map_err(|e| SandboxError::Malformed(e.to_string()))
    }

    /// Parses a host message, as a sandbox implementation would.
    pub fn parse(raw: &str) -> Result<Self, SandboxError> {
        serde_json::from_str(raw).map_err(|e| SandboxError::Malformed(e.to_string()))
    }
}

impl SandboxEvent {
    /// Validates and parses one raw message from the sandbox.
    pub fn parse(raw: &str) -> Result<Self, SandboxError> {
        serde_json::from_str(raw).map_err(|e| SandboxError::Malformed(e.to_string()))
    }

    /// Serializes the event to its wire form.
    pub fn encode(&self) -> Result<String, SandboxError> {
        serde_json::to_string(self).map_err(|e| SandboxError::Malformed(e.to_string()))
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxEvent::Ready => "ready",
            SandboxEvent::LibraryReceived => "libraryReceived",
            SandboxEvent::Stdout { .. } => "stdout",
            SandboxEvent::Stderr { .. } => "stderr",
            SandboxEvent::Progress { .. } => "progress",
            SandboxEvent::Done { .. } => "done",
            SandboxEvent::Error { .. } => "error",
        }
    }
}
