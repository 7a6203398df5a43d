//! Route-Table Synthesizer
//!
//! For `path = [v0, .., vk]`:
//! - forward: every `v_i` with `0 <= i <= k-2` reaches `vk` via `v_{i+1}`'s
//!   address on link `(v_i, v_{i+1})`
//! - reverse: every `v_i` with `2 <= i <= k` reaches `v0` via `v_{i-1}`'s
//!   address on link `(v_{i-1}, v_i)`
//!
//! Addresses are picked from the canonical link record, so each hop checks
//! whether its path direction is swapped against the key order. `node_one`
//! is the higher id: on a hop `from -> to` that is not swapped, `to` holds
//! `node_one`.

use crate::{LinkKey, LinkRecord, LinkTable, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// `ip route replace <destination> via <via>` executed on `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDirective {
    pub node: usize,
    pub destination: Ipv4Addr,
    pub via: Ipv4Addr,
}

impl fmt::Display for RouteDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ip route replace {} via {}", self.destination, self.via)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTables {
    pub forward: Vec<RouteDirective>,
    pub reverse: Vec<RouteDirective>,
}

impl RouteTables {
    pub fn len(&self) -> usize {
        self.forward.len() + self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDirective> {
        self.forward.iter().chain(self.reverse.iter())
    }
}

/// Address of the hop's `to` end.
fn far_address(record: &LinkRecord, swapped: bool) -> Ipv4Addr {
    if swapped {
        record.node_two.address
    } else {
        record.node_one.address
    }
}

/// Address of the hop's `from` end.
fn near_address(record: &LinkRecord, swapped: bool) -> Ipv4Addr {
    if swapped {
        record.node_one.address
    } else {
        record.node_two.address
    }
}

fn hop<'a>(links: &'a LinkTable, from: usize, to: usize) -> Result<(&'a LinkRecord, bool)> {
    let (key, swapped) = LinkKey::oriented(from, to)?;
    Ok((links.get(key)?, swapped))
}

/// Addresses of the destination and source endpoints of `path`.
fn endpoints(path: &[usize], links: &LinkTable) -> Result<(Ipv4Addr, Ipv4Addr)> {
    let k = path.len() - 1;
    let (last, swapped) = hop(links, path[k - 1], path[k])?;
    let destination = far_address(last, swapped);
    let (first, swapped) = hop(links, path[0], path[1])?;
    let source = near_address(first, swapped);
    Ok((destination, source))
}

/// Forward and reverse route tables for `path`. Paths shorter than two nodes
/// produce no routes.
pub fn route_tables(path: &[usize], links: &LinkTable) -> Result<RouteTables> {
    if path.len() < 2 {
        return Ok(RouteTables::default());
    }
    let k = path.len() - 1;
    let (destination, source) = endpoints(path, links)?;

    let mut tables = RouteTables::default();
    for i in 0..k - 1 {
        let (record, swapped) = hop(links, path[i], path[i + 1])?;
        tables.forward.push(RouteDirective {
            node: path[i],
            destination,
            via: far_address(record, swapped),
        });
    }
    for i in (2..=k).rev() {
        let (record, swapped) = hop(links, path[i - 1], path[i])?;
        tables.reverse.push(RouteDirective {
            node: path[i],
            destination: source,
            via: near_address(record, swapped),
        });
    }

    Ok(tables)
}

/// Supplementary rules for satellites dropped from the path: each one
/// forwards along the drain chain instead of its old direct hop.
///
/// `chain` is the drain chain built from the previous path; `dropped` lists
/// the satellites of the previous path missing from `path`. Destinations are
/// the endpoints of the current `path`.
pub fn drain_route_tables(
    path: &[usize],
    chain: &[usize],
    dropped: &[usize],
    links: &LinkTable,
) -> Result<RouteTables> {
    if path.len() < 2 {
        return Ok(RouteTables::default());
    }
    let (destination, source) = endpoints(path, links)?;

    let mut tables = RouteTables::default();
    for &node in dropped {
        let Some(j) = chain.iter().position(|&v| v == node) else {
            tracing::warn!(node, "Dropped satellite missing from drain chain");
            continue;
        };
        if let Some(&next) = chain.get(j + 1) {
            let (record, swapped) = hop(links, node, next)?;
            tables.forward.push(RouteDirective {
                node,
                destination,
                via: far_address(record, swapped),
            });
        }
        if let Some(&prev) = j.checked_sub(1).and_then(|p| chain.get(p)) {
            let (record, swapped) = hop(links, prev, node)?;
            tables.reverse.push(RouteDirective {
                node,
                destination: source,
                via: near_address(record, swapped),
            });
        }
    }

    Ok(tables)
}
