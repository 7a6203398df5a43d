//! In-memory runtime that records every call.
//!
//! Used for dry runs and tests. Commands can be made to fail for chosen
//! nodes to exercise error handling, and teardowns can be slowed down.

use super::{NodeHandle, Result, SandboxError, SandboxRuntime};
use async_trait::async_trait;
use link_routing::{LinkKey, LinkRecord};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    CreateNode { name: String, is_ground_station: bool },
    CleanupAll,
    CreateLink(LinkKey),
    TeardownLink(LinkKey),
    RunCommand { node: String, command: String },
}

#[derive(Debug, Default)]
pub struct RecordingRuntime {
    calls: Mutex<Vec<SandboxCall>>,
    failing_nodes: Mutex<HashSet<String>>,
    teardown_delay: Mutex<Duration>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command on `node` fail.
    pub fn fail_commands_on(&self, node: &str) {
        self.failing_nodes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node.to_string());
    }

    /// Hold every teardown for `delay` before it is recorded.
    pub fn delay_teardowns(&self, delay: Duration) {
        *self.teardown_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Snapshot of the calls so far, in completion order.
    pub fn calls(&self) -> Vec<SandboxCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain the recorded calls.
    pub fn take(&self) -> Vec<SandboxCall> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn record(&self, call: SandboxCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[async_trait]
impl SandboxRuntime for RecordingRuntime {
    async fn create_node(&self, name: &str, is_ground_station: bool) -> Result<NodeHandle> {
        self.record(SandboxCall::CreateNode {
            name: name.to_string(),
            is_ground_station,
        });
        Ok(NodeHandle {
            name: name.to_string(),
            is_ground_station,
        })
    }

    async fn cleanup_all(&self) -> Result<()> {
        self.record(SandboxCall::CleanupAll);
        Ok(())
    }

    async fn create_link(&self, link: &LinkRecord) -> Result<()> {
        self.record(SandboxCall::CreateLink(link.key));
        Ok(())
    }

    async fn teardown_link(&self, link: &LinkRecord) -> Result<()> {
        let delay = *self.teardown_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.record(SandboxCall::TeardownLink(link.key));
        Ok(())
    }

    async fn run_command(&self, node: &str, command: &str) -> Result<String> {
        self.record(SandboxCall::RunCommand {
            node: node.to_string(),
            command: command.to_string(),
        });
        let failing = self
            .failing_nodes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(node);
        if failing {
            return Err(SandboxError::CommandFailed {
                node: node.to_string(),
                command: command.to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(String::new())
    }
}
