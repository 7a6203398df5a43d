//! Traffic-Shaping Scheduler
//!
//! Each linked edge is shaped from both ends with the delay of its current
//! length. A directive always replaces the root qdisc, so re-issuing an
//! unchanged directive is harmless. Ground station to ground station edges
//! are never shaped.

use crate::state::SimulationState;
use orbital_mechanics::geometry;
use std::collections::HashSet;
use std::fmt;

pub const RATE: &str = "100mbit";
pub const QUEUE_LIMIT: u32 = 500;

/// `tc qdisc replace` on one end of a shaped edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapingDirective {
    pub node: usize,
    /// Interface named after the remote node
    pub device: String,
    pub delay_ms: u64,
}

impl fmt::Display for ShapingDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tc qdisc replace dev {} root netem delay {}ms rate {} limit {}",
            self.device, self.delay_ms, RATE, QUEUE_LIMIT
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapingPlan {
    pub directives: Vec<ShapingDirective>,
    /// Summed delay of the shaped path hops (drain hops excluded)
    pub cost_ms: u64,
}

/// Directives for the path hops and the drain hops at `time_index`.
///
/// Edges whose endpoints are out of range (or lack a sample) are skipped.
pub fn plan(
    state: &SimulationState,
    time_index: usize,
    path: &[usize],
    drain_edges: &[(usize, usize)],
    max_range_km: f64,
) -> ShapingPlan {
    let mut plan = ShapingPlan::default();
    let mut seen = HashSet::new();

    let path_hops = path.windows(2).map(|hop| (hop[0], hop[1], true));
    let drain_hops = drain_edges.iter().map(|&(a, b)| (a, b, false));

    for (a, b, on_path) in path_hops.chain(drain_hops) {
        if !seen.insert((a.min(b), a.max(b))) {
            continue;
        }
        if !state.is_satellite(a) && !state.is_satellite(b) {
            continue;
        }
        let (Some(pa), Some(pb)) = (state.position(a, time_index), state.position(b, time_index)) else {
            tracing::warn!(time_index, a, b, "Missing position sample, edge not shaped");
            continue;
        };
        if !geometry::reachable(pa, pb, max_range_km) {
            tracing::debug!(time_index, a, b, "Edge out of range, not shaped");
            continue;
        }
        let (Some(na), Some(nb)) = (state.node(a), state.node(b)) else {
            continue;
        };

        let delay_ms = geometry::latency_ms(geometry::distance(pa, pb));
        if on_path {
            plan.cost_ms += delay_ms;
        }
        plan.directives.push(ShapingDirective {
            node: a,
            device: nb.interface_name().to_string(),
            delay_ms,
        });
        plan.directives.push(ShapingDirective {
            node: b,
            device: na.interface_name().to_string(),
            delay_ms,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use fuzz_harness::prelude::*;
    use ground_stations::GroundStation;
    use orbital_mechanics::{OrbitalData, SampleClock, Vector3};

    fn state() -> SimulationState {
        let satellites = vec![
            OrbitalData::fixed(0, Vector3::new(1000.0, 0.0, 0.0), 1),
            OrbitalData::fixed(1, Vector3::new(3000.0, 0.0, 0.0), 1),
            OrbitalData::fixed(2, Vector3::new(90_000.0, 0.0, 0.0), 1),
        ];
        let stations = vec![
            GroundStation::fixed(0, "Madrid", Vector3::new(0.0, 0.0, 0.0), 1, true),
            GroundStation::fixed(1, "El Alamo", Vector3::new(5.0, 0.0, 0.0), 1, false),
        ];
        let clock = SampleClock::new(Utc::now(), Duration::seconds(1), 1);
        SimulationState::new(satellites, stations, clock).unwrap()
    }

    #[test]
    fn test_both_ends_shaped_toward_remote() {
        let state = state();
        let plan = plan(&state, 0, &[3, 0, 1], &[], 3000.0);

        assert_eq!(plan.directives.len(), 4);
        assert_eq!(plan.directives[0].node, 3);
        assert_eq!(plan.directives[0].device, "Sat0");
        assert_eq!(plan.directives[1].node, 0);
        assert_eq!(plan.directives[1].device, "GSMadrid");
        assert_eq!(
            plan.directives[0].to_string(),
            "tc qdisc replace dev Sat0 root netem delay 4ms rate 100mbit limit 500"
        );
        let expected = geometry::latency_ms(1000.0) + geometry::latency_ms(2000.0);
        assert_eq!(plan.cost_ms, expected);
    }

    #[test]
    fn test_skips_station_pairs_and_unreachable_edges() {
        let state = state();
        let plan = plan(&state, 0, &[4, 3, 0, 2], &[], 3000.0);
        // only the uplink 3-0 is shaped
        assert_eq!(plan.directives.len(), 2);
        assert_eq!(plan.cost_ms, geometry::latency_ms(1000.0));
    }

    #[test]
    fn test_drain_edges_shaped_but_not_costed() {
        let state = state();
        let plan = plan(&state, 0, &[3, 0], &[(0, 1), (3, 0)], 3000.0);
        assert_eq!(plan.directives.len(), 4);
        assert_eq!(plan.cost_ms, geometry::latency_ms(1000.0));
    }

    proptest! {
        #![proptest_config(config(64))]

        #[test]
        fn delay_grows_with_distance(a in distance_km(), b in distance_km()) {
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            let satellites = vec![
                OrbitalData::fixed(0, Vector3::zeros(), 1),
                OrbitalData::fixed(1, Vector3::new(near, 0.0, 0.0), 1),
                OrbitalData::fixed(2, Vector3::new(0.0, far, 0.0), 1),
            ];
            let clock = SampleClock::new(Utc::now(), Duration::seconds(1), 1);
            let state = SimulationState::new(satellites, Vec::new(), clock).unwrap();

            let near_plan = plan(&state, 0, &[0, 1], &[], f64::MAX);
            let far_plan = plan(&state, 0, &[0, 2], &[], f64::MAX);
            prop_assert!(near_plan.cost_ms <= far_plan.cost_ms);
        }
    }
}
