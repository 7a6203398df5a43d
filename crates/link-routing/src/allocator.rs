//! Link/Subnet Allocator
//!
//! Assigns a /29 to every link that can ever be active, before the
//! simulation starts. Enumeration order is fixed:
//! 1. every satellite pair `(i, j)` with `j < i`
//! 2. every access point against every satellite
//! 3. every access point against every non-access-point station
//!
//! Blocks are consecutive from the base address. Within a block the higher
//! graph id (`node_one`) gets network+2 and the lower (`node_two`) network+3.

use crate::{LinkError, LinkKey, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

pub const DEFAULT_BASE: Ipv4Addr = Ipv4Addr::new(120, 130, 0, 0);
pub const LINK_PREFIX_LEN: u8 = 29;
const BLOCK_SIZE: u32 = 8;

/// Linux interface names are limited to 15 bytes.
pub const MAX_INTERFACE_NAME: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Satellite,
    AccessPoint,
    Station,
}

/// A vertex as the allocator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub graph_id: usize,
    pub name: String,
    pub role: NodeRole,
}

impl NodeDescriptor {
    pub fn satellite(graph_id: usize) -> Self {
        Self {
            graph_id,
            name: format!("Sat{}", graph_id),
            role: NodeRole::Satellite,
        }
    }

    pub fn ground_station(graph_id: usize, title: &str, is_access_point: bool) -> Self {
        let title: String = title.chars().filter(|c| !c.is_whitespace()).collect();
        Self {
            graph_id,
            name: format!("GS{}", title),
            role: if is_access_point {
                NodeRole::AccessPoint
            } else {
                NodeRole::Station
            },
        }
    }

    /// Interface name used by the *other* end of a link for this node.
    pub fn interface_name(&self) -> &str {
        let mut end = self.name.len().min(MAX_INTERFACE_NAME);
        while !self.name.is_char_boundary(end) {
            end -= 1;
        }
        &self.name[..end]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub graph_id: usize,
    pub name: String,
    /// Interface on this endpoint's side, named after the remote node
    pub interface: String,
    pub address: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub key: LinkKey,
    pub network_name: String,
    pub subnet: Ipv4Net,
    /// Higher graph id
    pub node_one: LinkEndpoint,
    /// Lower graph id
    pub node_two: LinkEndpoint,
}

impl LinkRecord {
    pub fn endpoint(&self, node: usize) -> Option<&LinkEndpoint> {
        if self.node_one.graph_id == node {
            Some(&self.node_one)
        } else if self.node_two.graph_id == node {
            Some(&self.node_two)
        } else {
            None
        }
    }

    /// Address `node` holds on this link.
    pub fn address_of(&self, node: usize) -> Option<Ipv4Addr> {
        self.endpoint(node).map(|e| e.address)
    }
}

/// Precomputed addressing for the whole universe of potential links.
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    links: HashMap<LinkKey, LinkRecord>,
}

impl LinkTable {
    /// Allocate from [`DEFAULT_BASE`].
    pub fn allocate(nodes: &[NodeDescriptor]) -> Result<Self> {
        Self::allocate_from(DEFAULT_BASE, nodes)
    }

    /// `nodes` must be indexed by graph id, satellites first. Node names and
    /// their truncated interface names must both be unique.
    pub fn allocate_from(base: Ipv4Addr, nodes: &[NodeDescriptor]) -> Result<Self> {
        if let Some(pos) = nodes.iter().enumerate().position(|(i, n)| n.graph_id != i) {
            return Err(LinkError::UnorderedNodes(pos));
        }
        check_names(nodes)?;

        let satellites: Vec<&NodeDescriptor> =
            nodes.iter().filter(|n| n.role == NodeRole::Satellite).collect();
        let access_points: Vec<&NodeDescriptor> =
            nodes.iter().filter(|n| n.role == NodeRole::AccessPoint).collect();
        let stations: Vec<&NodeDescriptor> =
            nodes.iter().filter(|n| n.role == NodeRole::Station).collect();

        let mut pairs = Vec::new();
        for (i, one) in satellites.iter().enumerate() {
            for two in &satellites[..i] {
                pairs.push((*one, *two));
            }
        }
        for ap in &access_points {
            for sat in &satellites {
                pairs.push((*ap, *sat));
            }
        }
        for ap in &access_points {
            for gs in &stations {
                pairs.push((*ap, *gs));
            }
        }

        let base = u32::from(base) & !(BLOCK_SIZE - 1);
        let mut links = HashMap::with_capacity(pairs.len());
        for (index, (a, b)) in pairs.into_iter().enumerate() {
            let network = u32::try_from(index)
                .ok()
                .and_then(|i| i.checked_mul(BLOCK_SIZE))
                .and_then(|offset| base.checked_add(offset))
                .filter(|network| network.checked_add(BLOCK_SIZE - 1).is_some())
                .ok_or(LinkError::AddressSpaceExhausted { links: index })?;
            let record = build_record(network, a, b, index)?;
            links.insert(record.key, record);
        }

        tracing::debug!(links = links.len(), base = %Ipv4Addr::from(base), "Allocated link subnets");
        Ok(Self { links })
    }

    pub fn get(&self, key: LinkKey) -> Result<&LinkRecord> {
        self.links.get(&key).ok_or(LinkError::UnknownLink(key))
    }

    pub fn lookup(&self, a: usize, b: usize) -> Result<&LinkRecord> {
        self.get(LinkKey::new(a, b)?)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &LinkRecord> {
        self.links.values()
    }
}

fn check_names(nodes: &[NodeDescriptor]) -> Result<()> {
    let mut names = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !names.insert(node.name.as_str()) {
            return Err(LinkError::DuplicateName(node.name.clone()));
        }
    }

    let mut interfaces: HashMap<&str, &str> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if let Some(first) = interfaces.insert(node.interface_name(), &node.name) {
            return Err(LinkError::InterfaceCollision {
                interface: node.interface_name().to_string(),
                first: first.to_string(),
                second: node.name.clone(),
            });
        }
    }
    Ok(())
}

fn build_record(network: u32, a: &NodeDescriptor, b: &NodeDescriptor, index: usize) -> Result<LinkRecord> {
    let key = LinkKey::new(a.graph_id, b.graph_id)?;
    let (one, two) = if a.graph_id > b.graph_id { (a, b) } else { (b, a) };
    let subnet = Ipv4Net::new(Ipv4Addr::from(network), LINK_PREFIX_LEN)
        .map_err(|_| LinkError::AddressSpaceExhausted { links: index })?;

    Ok(LinkRecord {
        key,
        network_name: format!("link-{}-{}", one.name, two.name),
        subnet,
        node_one: LinkEndpoint {
            graph_id: one.graph_id,
            name: one.name.clone(),
            interface: two.interface_name().to_string(),
            address: Ipv4Addr::from(network + 2),
        },
        node_two: LinkEndpoint {
            graph_id: two.graph_id,
            name: two.name.clone(),
            interface: one.interface_name().to_string(),
            address: Ipv4Addr::from(network + 3),
        },
    })
}
