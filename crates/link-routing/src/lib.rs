//! Link Routing Library
//!
//! Everything the emulator needs to turn a path into network state:
//! - Canonical undirected link keys
//! - A precomputed subnet table covering every link that can ever be active
//! - The link-set differ deciding what to stand up and tear down
//! - Forward, reverse and drain route tables for a path

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod allocator;
pub mod differ;
pub mod routes;

pub use allocator::{LinkEndpoint, LinkRecord, LinkTable, NodeDescriptor, NodeRole};
pub use differ::{diff, LinkDiff};
pub use routes::{drain_route_tables, route_tables, RouteDirective, RouteTables};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Link requested from node {0} to itself")]
    SelfLoop(usize),
    #[error("No link record for {0}")]
    UnknownLink(LinkKey),
    #[error("Address space exhausted after {links} links")]
    AddressSpaceExhausted { links: usize },
    #[error("Node table is not ordered by graph id at position {0}")]
    UnorderedNodes(usize),
    #[error("Node name {0} is used more than once")]
    DuplicateName(String),
    #[error("Interface name {interface} is shared by {first} and {second}")]
    InterfaceCollision {
        interface: String,
        first: String,
        second: String,
    },
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Undirected link key: the two graph ids packed as `(low << 32) | high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey(u64);

impl LinkKey {
    /// Canonical key for the pair; a self-loop is an internal consistency failure.
    pub fn new(a: usize, b: usize) -> Result<Self> {
        if a == b {
            return Err(LinkError::SelfLoop(a));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(((low as u64) << 32) | high as u64))
    }

    /// Key for the directed hop `from -> to`, plus whether that direction is
    /// swapped with respect to canonical order (i.e. `from` is the higher id).
    pub fn oriented(from: usize, to: usize) -> Result<(Self, bool)> {
        Ok((Self::new(from, to)?, from > to))
    }

    #[inline]
    pub fn low(&self) -> usize {
        (self.0 >> 32) as usize
    }

    #[inline]
    pub fn high(&self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }

    pub fn endpoints(&self) -> (usize, usize) {
        (self.low(), self.high())
    }

    pub fn contains(&self, node: usize) -> bool {
        self.low() == node || self.high() == node
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low(), self.high())
    }
}

/// Keys of the consecutive hops of a path or chain.
pub fn path_links(path: &[usize]) -> Result<Vec<LinkKey>> {
    path.windows(2).map(|hop| LinkKey::new(hop[0], hop[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzz_harness::prelude::*;

    #[test]
    fn test_self_loop_is_rejected() {
        assert_eq!(LinkKey::new(7, 7), Err(LinkError::SelfLoop(7)));
        assert!(path_links(&[1, 2, 2, 3]).is_err());
    }

    #[test]
    fn test_oriented_detects_swap() {
        let (key, swapped) = LinkKey::oriented(9, 4).unwrap();
        assert!(swapped);
        assert_eq!(key.endpoints(), (4, 9));
        let (same, swapped) = LinkKey::oriented(4, 9).unwrap();
        assert!(!swapped);
        assert_eq!(key, same);
        assert_eq!(key.to_string(), "4-9");
    }

    #[test]
    fn test_path_links() {
        let keys = path_links(&[10, 0, 1, 11]).unwrap();
        assert_eq!(
            keys,
            vec![
                LinkKey::new(0, 10).unwrap(),
                LinkKey::new(0, 1).unwrap(),
                LinkKey::new(1, 11).unwrap(),
            ]
        );
        assert!(path_links(&[3]).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn key_is_symmetric(a in 0usize..100_000, b in 0usize..100_000) {
            prop_assume!(a != b);
            let ab = LinkKey::new(a, b).unwrap();
            let ba = LinkKey::new(b, a).unwrap();
            prop_assert_eq!(ab, ba);
            prop_assert_eq!(ab.endpoints(), (a.min(b), a.max(b)));
            // canonicalizing an already canonical pair is a no-op
            prop_assert_eq!(LinkKey::new(ab.low(), ab.high()).unwrap(), ab);
        }
    }
}
