//! Path Planner
//!
//! Owns the topology graph and the current path between the configured
//! source and destination stations. Each L3 tick rebuilds the time-varying
//! edges and decides whether the path changed. In no-drop mode a change also
//! derives the drain chain: the hops of the previous path that keep traffic
//! already in flight toward an abandoned satellite deliverable.

use crate::{Result, TopologyGraph};
use ground_stations::GroundStation;
use orbital_mechanics::OrbitalData;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Graph id of the source ground station
    pub source: usize,
    /// Graph id of the destination ground station
    pub destination: usize,
    pub max_range_km: f64,
    pub no_drop: bool,
}

/// Result of one L3 tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum L3Outcome {
    /// First path found; nothing to drain
    Adopted,
    /// Path differs from the previous one
    Changed,
    /// Same path as before
    Unchanged,
    /// Source and destination disconnected; previous state kept
    NoPath,
}

impl L3Outcome {
    /// Whether downstream link, shaping and route state must follow a new path.
    pub fn is_new_path(&self) -> bool {
        matches!(self, L3Outcome::Adopted | L3Outcome::Changed)
    }
}

pub struct PathPlanner {
    config: PlannerConfig,
    graph: TopologyGraph,
    path: Vec<usize>,
    cost_ms: u64,
    prev_path: Vec<usize>,
    prev_sats: Vec<usize>,
    drain_chain: Vec<usize>,
    drain_edges: Vec<(usize, usize)>,
}

impl PathPlanner {
    pub fn new(config: PlannerConfig, graph: TopologyGraph) -> Self {
        Self {
            config,
            graph,
            path: Vec::new(),
            cost_ms: 0,
            prev_path: Vec::new(),
            prev_sats: Vec::new(),
            drain_chain: Vec::new(),
            drain_edges: Vec::new(),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Cost of the current path as of the last L3 tick
    pub fn cost_ms(&self) -> u64 {
        self.cost_ms
    }

    pub fn prev_path(&self) -> &[usize] {
        &self.prev_path
    }

    /// Satellites of the previous path that the current path dropped
    pub fn prev_sats(&self) -> &[usize] {
        &self.prev_sats
    }

    pub fn drain_chain(&self) -> &[usize] {
        &self.drain_chain
    }

    /// Hops of the drain chain that carry a link
    pub fn drain_edges(&self) -> &[(usize, usize)] {
        &self.drain_edges
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    /// Endpoint pairs that must be linked: the path hops followed by the
    /// drain hops, duplicates removed.
    pub fn link_pairs(&self) -> Vec<(usize, usize)> {
        let mut seen = HashSet::new();
        self.path
            .windows(2)
            .map(|hop| (hop[0], hop[1]))
            .chain(self.drain_edges.iter().copied())
            .filter(|&(a, b)| seen.insert((a.min(b), a.max(b))))
            .collect()
    }

    /// Rebuild edges for `time_index` and re-plan.
    ///
    /// An unreachable destination keeps the previous path, drain state and
    /// activity flags untouched.
    pub fn l3_tick(
        &mut self,
        time_index: usize,
        satellites: &mut [OrbitalData],
        stations: &mut [GroundStation],
    ) -> Result<L3Outcome> {
        let range = self.config.max_range_km;
        let isl = self.graph.rebuild_satellite_edges(time_index, satellites, range)?;
        let uplinks = self.graph.rebuild_ground_station_edges(time_index, satellites, stations, range)?;
        tracing::debug!(time_index, isl, uplinks, "Rebuilt topology");

        let (path, cost_ms) = self
            .graph
            .shortest_path(self.config.source, self.config.destination)?;

        if path.len() < 2 {
            tracing::warn!(
                time_index,
                source = self.config.source,
                destination = self.config.destination,
                "No path between endpoints, keeping previous path"
            );
            return Ok(L3Outcome::NoPath);
        }

        if path == self.path {
            self.cost_ms = cost_ms;
            return Ok(L3Outcome::Unchanged);
        }

        let outcome = if self.path.is_empty() {
            L3Outcome::Adopted
        } else {
            L3Outcome::Changed
        };
        let previous = std::mem::replace(&mut self.path, path);
        self.cost_ms = cost_ms;

        if self.config.no_drop && outcome == L3Outcome::Changed {
            let current: HashSet<usize> = self.path.iter().copied().collect();
            self.prev_sats = previous
                .iter()
                .copied()
                .filter(|v| self.graph.is_satellite(*v) && !current.contains(v))
                .collect();
            let (chain, edges) = drain_chain(&previous, &self.prev_sats);
            self.drain_chain = chain;
            self.drain_edges = edges;
            self.prev_path = previous;
        } else {
            self.prev_sats.clear();
            self.drain_chain.clear();
            self.drain_edges.clear();
            self.prev_path.clear();
        }

        self.update_activity(satellites, stations);
        Ok(outcome)
    }

    /// Path members are active; in no-drop mode so are the dropped
    /// satellites still carrying drain traffic.
    fn update_activity(&self, satellites: &mut [OrbitalData], stations: &mut [GroundStation]) {
        let on_path: HashSet<usize> = self
            .path
            .iter()
            .chain(self.prev_sats.iter())
            .copied()
            .collect();
        let num_satellites = self.graph.num_satellites();
        for (id, sat) in satellites.iter_mut().enumerate() {
            sat.is_active = on_path.contains(&id);
        }
        for (i, gs) in stations.iter_mut().enumerate() {
            gs.is_active = on_path.contains(&(num_satellites + i));
        }
    }
}

/// Drain chain through `prev_path` for the dropped satellites `prev_sats`.
///
/// Walking the dropped members in path order, each one contributes its
/// predecessor, itself and its successor, except that the predecessor (and
/// the member) are skipped when already emitted by the previous member at
/// distance one or two. Returns the chain and the chain hops that were
/// adjacent in `prev_path`.
pub fn drain_chain(prev_path: &[usize], prev_sats: &[usize]) -> (Vec<usize>, Vec<(usize, usize)>) {
    let mut indices: Vec<usize> = Vec::new();
    let mut last: Option<usize> = None;

    let mut members: Vec<usize> = prev_sats
        .iter()
        .filter_map(|s| prev_path.iter().position(|v| v == s))
        .filter(|&j| j > 0 && j + 1 < prev_path.len())
        .collect();
    members.sort_unstable();

    for j in members {
        if last != Some(j - 1) {
            if j < 2 || last != Some(j - 2) {
                indices.push(j - 1);
            }
            indices.push(j);
        }
        indices.push(j + 1);
        last = Some(j);
    }

    let chain = indices.iter().map(|&j| prev_path[j]).collect();
    let edges = indices
        .windows(2)
        .filter(|w| w[1] == w[0] + 1)
        .map(|w| (prev_path[w[0]], prev_path[w[1]]))
        .collect();
    (chain, edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbital_mechanics::Vector3;

    const FAR: f64 = 100_000.0;

    #[test]
    fn test_drain_chain_single_member() {
        let (chain, edges) = drain_chain(&[10, 4, 5, 6, 11], &[5]);
        assert_eq!(chain, vec![4, 5, 6]);
        assert_eq!(edges, vec![(4, 5), (5, 6)]);
    }

    #[test]
    fn test_drain_chain_adjacent_members() {
        let (chain, edges) = drain_chain(&[10, 1, 2, 3, 11], &[1, 2]);
        assert_eq!(chain, vec![10, 1, 2, 3]);
        assert_eq!(edges, vec![(10, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_drain_chain_members_two_apart() {
        let (chain, _) = drain_chain(&[10, 1, 2, 3, 4, 11], &[1, 3]);
        assert_eq!(chain, vec![10, 1, 2, 3, 4]);
    }

    #[test]
    fn test_drain_chain_separate_segments() {
        let (chain, edges) = drain_chain(&[10, 1, 2, 3, 4, 5, 6, 11], &[1, 5]);
        assert_eq!(chain, vec![10, 1, 2, 4, 5, 6]);
        // 2 and 4 were not neighbours, no link between the segments
        assert_eq!(edges, vec![(10, 1), (1, 2), (4, 5), (5, 6)]);
    }

    #[test]
    fn test_drain_chain_ignores_unknown_members() {
        let (chain, edges) = drain_chain(&[10, 1, 11], &[7]);
        assert!(chain.is_empty());
        assert!(edges.is_empty());
    }

    /// Eight satellites; 4, 5, 6 on a line between the stations, the rest far
    /// away. At sample 1 satellite 5 leaves and satellite 7 takes its place.
    fn fixture() -> (Vec<OrbitalData>, Vec<GroundStation>) {
        let mut satellites: Vec<OrbitalData> = (0..8)
            .map(|id| OrbitalData::fixed(id, Vector3::new(0.0, FAR * (id + 1) as f64, 0.0), 2))
            .collect();
        let line = |x: f64| Vector3::new(x, 0.0, 0.0);
        let away = |id: usize| Vector3::new(0.0, FAR * (id + 1) as f64, 0.0);
        let zeros = vec![Vector3::zeros(); 2];
        let lat_longs = vec![Default::default(); 2];

        satellites[4] = OrbitalData::fixed(4, line(1000.0), 2);
        satellites[6] = OrbitalData::fixed(6, line(5000.0), 2);
        satellites[5] = OrbitalData::new(5, "5", vec![line(3000.0), away(5)], zeros.clone(), lat_longs.clone()).unwrap();
        satellites[7] = OrbitalData::new(7, "7", vec![away(7), line(3000.0)], zeros, lat_longs).unwrap();

        let stations = vec![
            GroundStation::fixed(0, "Source", line(0.0), 2, true),
            GroundStation::fixed(1, "Destination", line(6000.0), 2, true),
        ];
        (satellites, stations)
    }

    fn planner(no_drop: bool) -> PathPlanner {
        let config = PlannerConfig {
            source: 8,
            destination: 9,
            max_range_km: 2500.0,
            no_drop,
        };
        PathPlanner::new(config, TopologyGraph::new(8, 2))
    }

    #[test]
    fn test_no_drop_transition() {
        let (mut satellites, mut stations) = fixture();
        let mut planner = planner(true);

        assert_eq!(planner.l3_tick(0, &mut satellites, &mut stations).unwrap(), L3Outcome::Adopted);
        assert_eq!(planner.path(), &[8, 4, 5, 6, 9]);
        assert!(satellites[5].is_active);
        assert!(planner.drain_chain().is_empty());

        assert_eq!(planner.l3_tick(1, &mut satellites, &mut stations).unwrap(), L3Outcome::Changed);
        assert_eq!(planner.path(), &[8, 4, 7, 6, 9]);
        assert_eq!(planner.prev_path(), &[8, 4, 5, 6, 9]);
        assert_eq!(planner.prev_sats(), &[5]);
        assert_eq!(planner.drain_chain(), &[4, 5, 6]);
        // still linked for drain traffic
        assert!(satellites[5].is_active);
        assert!(satellites[7].is_active);
        assert!(!satellites[0].is_active);
        assert!(stations.iter().all(|gs| gs.is_active));

        let pairs = planner.link_pairs();
        assert_eq!(pairs, vec![(8, 4), (4, 7), (7, 6), (6, 9), (4, 5), (5, 6)]);
    }

    #[test]
    fn test_identical_path_is_unchanged() {
        let (mut satellites, mut stations) = fixture();
        let mut planner = planner(true);

        planner.l3_tick(0, &mut satellites, &mut stations).unwrap();
        planner.l3_tick(1, &mut satellites, &mut stations).unwrap();

        let outcome = planner.l3_tick(1, &mut satellites, &mut stations).unwrap();
        assert_eq!(outcome, L3Outcome::Unchanged);
        assert!(!outcome.is_new_path());
        // drain state stays until the next change
        assert_eq!(planner.drain_chain(), &[4, 5, 6]);
    }

    #[test]
    fn test_without_no_drop_there_is_no_drain() {
        let (mut satellites, mut stations) = fixture();
        let mut planner = planner(false);

        planner.l3_tick(0, &mut satellites, &mut stations).unwrap();
        assert_eq!(planner.l3_tick(1, &mut satellites, &mut stations).unwrap(), L3Outcome::Changed);
        assert!(planner.prev_sats().is_empty());
        assert!(planner.drain_edges().is_empty());
        assert!(!satellites[5].is_active);
        assert_eq!(planner.link_pairs().len(), 4);
    }

    #[test]
    fn test_lost_path_keeps_previous() {
        let (mut satellites, mut stations) = fixture();
        let mut planner = planner(true);
        planner.l3_tick(0, &mut satellites, &mut stations).unwrap();
        let cost = planner.cost_ms();

        satellites[4] = OrbitalData::fixed(4, Vector3::new(0.0, -FAR, 0.0), 2);
        assert_eq!(planner.l3_tick(0, &mut satellites, &mut stations).unwrap(), L3Outcome::NoPath);
        assert_eq!(planner.path(), &[8, 4, 5, 6, 9]);
        assert_eq!(planner.cost_ms(), cost);
        assert!(satellites[4].is_active);
    }
}
