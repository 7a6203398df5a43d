//! Constellation Graph
//!
//! Topology of the emulated network at one sample index:
//!
//! - Vertices are dense graph ids: satellites `[0, S)`, ground stations `[S, S+G)`
//! - Edges carry one-way latency in whole milliseconds
//! - Satellite and uplink edges are rebuilt from reachability every planning tick
//! - Terrestrial access-point edges are inserted once
//!
//! The [`planner`] module drives the graph tick by tick.

use ground_stations::GroundStation;
use orbital_mechanics::{geometry, OrbitalData, Vector3};
use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod planner;

pub use planner::{drain_chain, L3Outcome, PathPlanner, PlannerConfig};

/// Graph errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Vertex {vertex} out of range for graph of {size} vertices")]
    VertexOutOfRange { vertex: usize, size: usize },
    #[error("No position sample {time_index} for vertex {vertex}")]
    MissingSample { vertex: usize, time_index: usize },
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// What a vertex stands for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Vertex {
    Satellite,
    GroundStation,
}

/// Link types in the constellation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LinkType {
    /// Inter-satellite link (laser)
    InterSatellite,
    /// Access point to satellite
    SatelliteToGround,
    /// Access point to nearby station (terrestrial backhaul)
    Terrestrial,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub link_type: LinkType,
    /// One-way latency in ms, ceiling-rounded
    pub cost_ms: u64,
}

/// The per-tick topology graph
pub struct TopologyGraph {
    graph: UnGraph<Vertex, Edge>,
    num_satellites: usize,
}

impl TopologyGraph {
    /// `num_satellites + num_ground_stations` isolated vertices.
    pub fn new(num_satellites: usize, num_ground_stations: usize) -> Self {
        let size = num_satellites + num_ground_stations;
        let mut graph = UnGraph::with_capacity(size, 0);
        for id in 0..size {
            graph.add_node(if id < num_satellites {
                Vertex::Satellite
            } else {
                Vertex::GroundStation
            });
        }
        Self { graph, num_satellites }
    }

    pub fn size(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_satellites(&self) -> usize {
        self.num_satellites
    }

    #[inline]
    pub fn is_satellite(&self, vertex: usize) -> bool {
        vertex < self.num_satellites
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Cost of the edge between `a` and `b`, if present.
    pub fn edge_cost(&self, a: usize, b: usize) -> Option<u64> {
        if a >= self.size() || b >= self.size() {
            return None;
        }
        self.graph
            .find_edge(NodeIndex::new(a), NodeIndex::new(b))
            .map(|e| self.graph[e].cost_ms)
    }

    /// Connect every access point with every non-access-point station whose
    /// surface distance is within `range_km`, at zero cost.
    pub fn add_access_point_edges(&mut self, stations: &[GroundStation], range_km: f64) -> usize {
        let mut added = 0;
        for (i, ap) in stations.iter().enumerate().filter(|(_, gs)| gs.is_access_point) {
            for (j, gs) in stations.iter().enumerate().filter(|(_, gs)| !gs.is_access_point) {
                if ap.within_access_range(gs, range_km) {
                    self.graph.add_edge(
                        NodeIndex::new(self.num_satellites + i),
                        NodeIndex::new(self.num_satellites + j),
                        Edge {
                            link_type: LinkType::Terrestrial,
                            cost_ms: 0,
                        },
                    );
                    added += 1;
                }
            }
        }
        tracing::debug!(added, range_km, "Added access point edges");
        added
    }

    /// Replace all inter-satellite edges with the ones reachable at `time_index`.
    pub fn rebuild_satellite_edges(
        &mut self,
        time_index: usize,
        satellites: &[OrbitalData],
        max_range_km: f64,
    ) -> Result<usize> {
        self.clear_edges(LinkType::InterSatellite);

        let positions = satellites
            .iter()
            .enumerate()
            .map(|(id, sat)| sample(sat.position(time_index), id, time_index))
            .collect::<Result<Vec<_>>>()?;

        let mut added = 0;
        for i in 0..positions.len() {
            for j in 0..i {
                if let Some(cost_ms) = link_cost(positions[i], positions[j], max_range_km) {
                    self.graph.add_edge(
                        NodeIndex::new(i),
                        NodeIndex::new(j),
                        Edge {
                            link_type: LinkType::InterSatellite,
                            cost_ms,
                        },
                    );
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Replace all uplink edges with the access point to satellite pairs
    /// reachable at `time_index`.
    pub fn rebuild_ground_station_edges(
        &mut self,
        time_index: usize,
        satellites: &[OrbitalData],
        stations: &[GroundStation],
        max_range_km: f64,
    ) -> Result<usize> {
        self.clear_edges(LinkType::SatelliteToGround);

        let mut added = 0;
        for (i, gs) in stations.iter().enumerate().filter(|(_, gs)| gs.is_access_point) {
            let vertex = self.num_satellites + i;
            let gs_position = sample(gs.position(time_index), vertex, time_index)?;
            for (id, sat) in satellites.iter().enumerate() {
                let sat_position = sample(sat.position(time_index), id, time_index)?;
                if let Some(cost_ms) = link_cost(gs_position, sat_position, max_range_km) {
                    self.graph.add_edge(
                        NodeIndex::new(vertex),
                        NodeIndex::new(id),
                        Edge {
                            link_type: LinkType::SatelliteToGround,
                            cost_ms,
                        },
                    );
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Dijkstra (A* with a zero heuristic) from `source` to `destination`.
    ///
    /// Returns the vertex sequence and its total cost; the path is empty when
    /// the two vertices are disconnected.
    pub fn shortest_path(&self, source: usize, destination: usize) -> Result<(Vec<usize>, u64)> {
        for vertex in [source, destination] {
            if vertex >= self.size() {
                return Err(GraphError::VertexOutOfRange {
                    vertex,
                    size: self.size(),
                });
            }
        }

        let target = NodeIndex::new(destination);
        let result = astar(
            &self.graph,
            NodeIndex::new(source),
            |n| n == target,
            |e| e.weight().cost_ms,
            |_| 0,
        );

        Ok(match result {
            Some((cost, nodes)) => (nodes.into_iter().map(NodeIndex::index).collect(), cost),
            None => (Vec::new(), 0),
        })
    }

    /// Sum of edge costs along `path`, `None` if a hop has no edge.
    pub fn path_cost(&self, path: &[usize]) -> Option<u64> {
        path.windows(2)
            .map(|hop| self.edge_cost(hop[0], hop[1]))
            .sum()
    }

    fn clear_edges(&mut self, link_type: LinkType) {
        self.graph
            .retain_edges(|g, e| g.edge_weight(e).map_or(true, |edge| edge.link_type != link_type));
    }
}

fn sample(position: Option<&Vector3>, vertex: usize, time_index: usize) -> Result<Vector3> {
    position
        .copied()
        .ok_or(GraphError::MissingSample { vertex, time_index })
}

/// Edge cost between two positions, `None` when out of range.
fn link_cost(a: Vector3, b: Vector3, max_range_km: f64) -> Option<u64> {
    geometry::reachable(&a, &b, max_range_km).then(|| geometry::latency_ms(geometry::distance(&a, &b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzz_harness::prelude::*;
    use orbital_mechanics::geometry::latency_ms;

    fn satellites_at(xs: &[Vector3]) -> Vec<OrbitalData> {
        xs.iter()
            .enumerate()
            .map(|(id, p)| OrbitalData::fixed(id, *p, 1))
            .collect()
    }

    fn access_points_at(xs: &[Vector3]) -> Vec<GroundStation> {
        xs.iter()
            .enumerate()
            .map(|(id, p)| GroundStation::fixed(id, format!("GS{}", id), *p, 1, true))
            .collect()
    }

    #[test]
    fn test_scenario_three_satellites_two_stations() {
        let satellites = satellites_at(&[
            Vector3::new(1000.0, 0.0, 0.0),
            Vector3::new(3000.0, 0.0, 0.0),
            Vector3::new(5000.0, 0.0, 0.0),
        ]);
        let stations = access_points_at(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(6000.0, 0.0, 0.0)]);

        let mut graph = TopologyGraph::new(3, 2);
        graph.rebuild_satellite_edges(0, &satellites, 2500.0).unwrap();
        graph.rebuild_ground_station_edges(0, &satellites, &stations, 2500.0).unwrap();

        let (path, cost) = graph.shortest_path(3, 4).unwrap();
        assert_eq!(path, vec![3, 0, 1, 2, 4]);
        let expected = latency_ms(1000.0) + latency_ms(2000.0) + latency_ms(2000.0) + latency_ms(1000.0);
        assert_eq!(cost, expected);
        assert_eq!(graph.path_cost(&path), Some(cost));
    }

    #[test]
    fn test_disconnected_returns_empty_path() {
        let satellites = satellites_at(&[Vector3::new(1000.0, 0.0, 0.0)]);
        let stations = access_points_at(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(9000.0, 0.0, 0.0)]);

        let mut graph = TopologyGraph::new(1, 2);
        graph.rebuild_ground_station_edges(0, &satellites, &stations, 3000.0).unwrap();
        assert_eq!(graph.shortest_path(1, 2).unwrap(), (Vec::new(), 0));
        assert!(matches!(
            graph.shortest_path(1, 7),
            Err(GraphError::VertexOutOfRange { vertex: 7, size: 3 })
        ));
    }

    #[test]
    fn test_rebuild_replaces_only_its_own_edges() {
        let mut satellites = satellites_at(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(100.0, 0.0, 0.0)]);
        let stations = access_points_at(&[Vector3::new(50.0, 0.0, 0.0)]);

        let mut graph = TopologyGraph::new(2, 1);
        assert_eq!(graph.rebuild_satellite_edges(0, &satellites, 3000.0).unwrap(), 1);
        assert_eq!(graph.rebuild_ground_station_edges(0, &satellites, &stations, 3000.0).unwrap(), 2);
        assert_eq!(graph.edge_count(), 3);

        satellites[1] = OrbitalData::fixed(1, Vector3::new(10_000.0, 0.0, 0.0), 1);
        assert_eq!(graph.rebuild_satellite_edges(0, &satellites, 3000.0).unwrap(), 0);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edge_cost(2, 0), Some(1));
        assert_eq!(graph.edge_cost(0, 1), None);
    }

    #[test]
    fn test_only_access_points_get_uplinks() {
        let satellites = satellites_at(&[Vector3::new(0.0, 0.0, 0.0)]);
        let stations = vec![GroundStation::fixed(0, "plain", Vector3::new(10.0, 0.0, 0.0), 1, false)];

        let mut graph = TopologyGraph::new(1, 1);
        assert_eq!(graph.rebuild_ground_station_edges(0, &satellites, &stations, 3000.0).unwrap(), 0);
    }

    #[test]
    fn test_missing_sample_is_an_error() {
        let satellites = satellites_at(&[Vector3::zeros(), Vector3::zeros()]);
        let mut graph = TopologyGraph::new(2, 0);
        assert_eq!(
            graph.rebuild_satellite_edges(3, &satellites, 3000.0),
            Err(GraphError::MissingSample { vertex: 0, time_index: 3 })
        );
    }

    proptest! {
        #[test]
        fn shortest_path_cost_is_sum_of_edges(
            sats in prop::collection::vec(position_km(), 2..10),
            gs in prop::collection::vec(position_km(), 2..3),
        ) {
            let satellites = satellites_at(&sats.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect::<Vec<_>>());
            let stations = access_points_at(&gs.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect::<Vec<_>>());
            let s = satellites.len();

            let mut graph = TopologyGraph::new(s, stations.len());
            graph.rebuild_satellite_edges(0, &satellites, 6000.0).unwrap();
            graph.rebuild_ground_station_edges(0, &satellites, &stations, 6000.0).unwrap();

            let (path, cost) = graph.shortest_path(s, s + 1).unwrap();
            if !path.is_empty() {
                prop_assert_eq!(path[0], s);
                prop_assert_eq!(*path.last().unwrap(), s + 1);
                prop_assert_eq!(graph.path_cost(&path), Some(cost));
            }
        }
    }
}
