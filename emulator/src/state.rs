//! Simulation state owned by the driver.

use crate::{EmulatorError, Result};
use ground_stations::{find_by_title, GroundStation};
use link_routing::{LinkTable, NodeDescriptor};
use orbital_mechanics::{OrbitalData, SampleClock, Vector3};

/// Every vertex of the run, its node name and the link table.
///
/// Graph ids: satellites `[0, S)`, then ground stations in descriptor order.
pub struct SimulationState {
    pub satellites: Vec<OrbitalData>,
    pub stations: Vec<GroundStation>,
    pub clock: SampleClock,
    nodes: Vec<NodeDescriptor>,
    links: LinkTable,
}

impl SimulationState {
    /// Name every vertex and precompute the link table.
    pub fn new(satellites: Vec<OrbitalData>, stations: Vec<GroundStation>, clock: SampleClock) -> Result<Self> {
        let num_satellites = satellites.len();
        let nodes: Vec<NodeDescriptor> = (0..num_satellites)
            .map(NodeDescriptor::satellite)
            .chain(
                stations
                    .iter()
                    .enumerate()
                    .map(|(i, gs)| NodeDescriptor::ground_station(num_satellites + i, &gs.title, gs.is_access_point)),
            )
            .collect();

        let links = LinkTable::allocate(&nodes).map_err(EmulatorError::Addressing)?;
        tracing::info!(
            satellites = num_satellites,
            stations = stations.len(),
            links = links.len(),
            "Allocated link table"
        );

        Ok(Self {
            satellites,
            stations,
            clock,
            nodes,
            links,
        })
    }

    pub fn num_satellites(&self) -> usize {
        self.satellites.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_satellite(&self, vertex: usize) -> bool {
        vertex < self.num_satellites()
    }

    pub fn node(&self, vertex: usize) -> Option<&NodeDescriptor> {
        self.nodes.get(vertex)
    }

    /// Node name of a vertex; unknown ids render as `#<id>`.
    pub fn node_name(&self, vertex: usize) -> String {
        self.node(vertex)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| format!("#{}", vertex))
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Position of any vertex at `time_index`.
    pub fn position(&self, vertex: usize, time_index: usize) -> Option<&Vector3> {
        if self.is_satellite(vertex) {
            self.satellites.get(vertex)?.position(time_index)
        } else {
            self.stations
                .get(vertex - self.num_satellites())?
                .position(time_index)
        }
    }

    /// Graph id of the station titled `title`.
    pub fn station_vertex(&self, title: &str) -> Result<usize> {
        Ok(self.num_satellites() + find_by_title(&self.stations, title)?.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn state() -> SimulationState {
        let satellites = (0..3)
            .map(|id| OrbitalData::fixed(id, Vector3::new(id as f64, 0.0, 0.0), 2))
            .collect();
        let stations = vec![
            GroundStation::fixed(0, "Madrid", Vector3::new(-1.0, 0.0, 0.0), 2, true),
            GroundStation::fixed(1, "El Alamo", Vector3::new(-2.0, 0.0, 0.0), 2, false),
        ];
        let clock = SampleClock::new(Utc::now(), Duration::seconds(1), 2);
        SimulationState::new(satellites, stations, clock).unwrap()
    }

    #[test]
    fn test_vertex_numbering() {
        let state = state();
        assert_eq!(state.num_vertices(), 5);
        assert_eq!(state.node_name(2), "Sat2");
        assert_eq!(state.node_name(4), "GSElAlamo");
        assert_eq!(state.node_name(9), "#9");
        assert_eq!(state.station_vertex("Madrid").unwrap(), 3);
        assert!(state.station_vertex("Oslo").is_err());
    }

    #[test]
    fn test_positions_branch_on_vertex_kind() {
        let state = state();
        assert_eq!(state.position(1, 0), Some(&Vector3::new(1.0, 0.0, 0.0)));
        assert_eq!(state.position(4, 1), Some(&Vector3::new(-2.0, 0.0, 0.0)));
        assert_eq!(state.position(4, 2), None);
        assert_eq!(state.position(5, 0), None);
    }

    #[test]
    fn test_link_universe() {
        let state = state();
        // 3 satellite pairs, 3 uplinks from the access point, 1 backhaul
        assert_eq!(state.links().len(), 7);
    }
}
