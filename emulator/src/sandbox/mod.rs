//! Sandbox runtime
//!
//! The emulator never touches namespaces, veth pairs or qdiscs directly; it
//! asks a [`SandboxRuntime`] to. Calls for different nodes and links are
//! independent and may run concurrently.

use async_trait::async_trait;
use link_routing::LinkRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod netns;
pub mod recording;

pub use netns::NetnsRuntime;
pub use recording::{RecordingRuntime, SandboxCall};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("Failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },
    #[error("Command '{command}' on {node} failed: {stderr}")]
    CommandFailed {
        node: String,
        command: String,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// A created node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHandle {
    pub name: String,
    pub is_ground_station: bool,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn create_node(&self, name: &str, is_ground_station: bool) -> Result<NodeHandle>;

    /// Remove every node this emulator may have created.
    async fn cleanup_all(&self) -> Result<()>;

    async fn create_link(&self, link: &LinkRecord) -> Result<()>;

    async fn teardown_link(&self, link: &LinkRecord) -> Result<()>;

    /// Run a shell command inside `node`, returning its stdout.
    async fn run_command(&self, node: &str, command: &str) -> Result<String>;
}
