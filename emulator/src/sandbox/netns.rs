//! Linux network namespaces driven through iproute2.
//!
//! One namespace per node; a link is a veth pair whose ends are created
//! directly inside the two namespaces, each end named after the remote node.

use super::{NodeHandle, Result, SandboxError, SandboxRuntime};
use async_trait::async_trait;
use link_routing::{LinkEndpoint, LinkRecord};
use tokio::process::Command;
use tracing::{debug, info};

/// Prefixes of the namespaces owned by the emulator
const NODE_PREFIXES: [&str; 2] = ["Sat", "GS"];

#[derive(Debug, Clone, Default)]
pub struct NetnsRuntime;

impl NetnsRuntime {
    pub fn new() -> Self {
        Self
    }

    async fn ip(&self, node: &str, args: &[&str]) -> Result<String> {
        let command = format!("ip {}", args.join(" "));
        debug!(node, %command, "Running");

        let output = Command::new("ip")
            .args(args)
            .output()
            .await
            .map_err(|e| SandboxError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SandboxError::CommandFailed {
                node: node.to_string(),
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn in_netns(&self, node: &str, args: &[&str]) -> Result<String> {
        let mut full = vec!["netns", "exec", node];
        full.extend_from_slice(args);
        self.ip(node, &full).await
    }

    async fn configure_end(&self, end: &LinkEndpoint, prefix_len: u8) -> Result<()> {
        let address = format!("{}/{}", end.address, prefix_len);
        self.in_netns(&end.name, &["ip", "addr", "replace", &address, "dev", &end.interface])
            .await?;
        self.in_netns(&end.name, &["ip", "link", "set", &end.interface, "up"])
            .await?;
        Ok(())
    }
}

/// Emulator namespaces in `ip netns list` output (`<name> (id: <n>)` per line).
fn owned_namespaces(listing: &str) -> Vec<&str> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| NODE_PREFIXES.iter().any(|p| name.starts_with(p)))
        .collect()
}

#[async_trait]
impl SandboxRuntime for NetnsRuntime {
    async fn create_node(&self, name: &str, is_ground_station: bool) -> Result<NodeHandle> {
        self.ip(name, &["netns", "add", name]).await?;
        self.in_netns(name, &["ip", "link", "set", "lo", "up"]).await?;
        self.in_netns(name, &["sysctl", "-qw", "net.ipv4.ip_forward=1"]).await?;
        Ok(NodeHandle {
            name: name.to_string(),
            is_ground_station,
        })
    }

    async fn cleanup_all(&self) -> Result<()> {
        let listing = self.ip("host", &["netns", "list"]).await?;
        let stale = owned_namespaces(&listing);

        for name in &stale {
            self.ip(name, &["netns", "delete", name]).await?;
        }
        info!(removed = stale.len(), "Cleaned up namespaces");
        Ok(())
    }

    async fn create_link(&self, link: &LinkRecord) -> Result<()> {
        let one = &link.node_one;
        let two = &link.node_two;
        self.ip(
            &one.name,
            &[
                "link", "add", &one.interface, "netns", &one.name, "type", "veth", "peer", "name",
                &two.interface, "netns", &two.name,
            ],
        )
        .await?;

        let prefix_len = link.subnet.prefix_len();
        self.configure_end(one, prefix_len).await?;
        self.configure_end(two, prefix_len).await?;
        Ok(())
    }

    async fn teardown_link(&self, link: &LinkRecord) -> Result<()> {
        // deleting one end removes its peer
        self.in_netns(&link.node_one.name, &["ip", "link", "delete", &link.node_one.interface])
            .await?;
        Ok(())
    }

    async fn run_command(&self, node: &str, command: &str) -> Result<String> {
        self.in_netns(node, &["sh", "-c", command]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_node_namespaces_are_cleaned_up() {
        let listing = "Sat12 (id: 4)\nGSMadrid (id: 3)\ncni-1f2e\nblue (id: 0)\n\nSat0\n";
        assert_eq!(owned_namespaces(listing), vec!["Sat12", "GSMadrid", "Sat0"]);
        assert!(owned_namespaces("").is_empty());
    }
}
