//! Fixed-length trajectories sampled at a constant time step.

use crate::propagation::Propagator;
use crate::{transforms, LatLong, OrbitalError, Result, Satellite, Vector3};
use chrono::{DateTime, Duration, Utc};

/// Sample timeline shared by every trajectory of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleClock {
    pub start: DateTime<Utc>,
    pub step: Duration,
    pub samples: usize,
}

impl SampleClock {
    pub fn new(start: DateTime<Utc>, step: Duration, samples: usize) -> Self {
        Self { start, step, samples }
    }

    /// Wall epoch of sample `index`
    pub fn epoch(&self, index: usize) -> DateTime<Utc> {
        self.start + self.step * index as i32
    }

    pub fn epochs(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.samples).map(move |i| self.epoch(i))
    }
}

/// Satellite record: one position, velocity and lat/long per sample index.
///
/// The sample sequences are immutable after construction; only `is_active`
/// changes during a run.
#[derive(Debug, Clone)]
pub struct OrbitalData {
    pub id: usize,
    pub title: String,
    positions: Vec<Vector3>,
    velocities: Vec<Vector3>,
    lat_longs: Vec<LatLong>,
    pub is_active: bool,
}

impl OrbitalData {
    pub fn new(
        id: usize,
        title: impl Into<String>,
        positions: Vec<Vector3>,
        velocities: Vec<Vector3>,
        lat_longs: Vec<LatLong>,
    ) -> Result<Self> {
        if positions.len() != velocities.len() || positions.len() != lat_longs.len() {
            return Err(OrbitalError::SampleLengthMismatch {
                id,
                positions: positions.len(),
                velocities: velocities.len(),
                lat_longs: lat_longs.len(),
            });
        }

        Ok(Self {
            id,
            title: title.into(),
            positions,
            velocities,
            lat_longs,
            is_active: true,
        })
    }

    /// Stationary record, convenient for fixtures.
    pub fn fixed(id: usize, position: Vector3, samples: usize) -> Self {
        Self {
            id,
            title: id.to_string(),
            positions: vec![position; samples],
            velocities: vec![Vector3::zeros(); samples],
            lat_longs: vec![LatLong::default(); samples],
            is_active: true,
        }
    }

    #[inline]
    pub fn position(&self, index: usize) -> Option<&Vector3> {
        self.positions.get(index)
    }

    pub fn positions(&self) -> &[Vector3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vector3] {
        &self.velocities
    }

    pub fn lat_longs(&self) -> &[LatLong] {
        &self.lat_longs
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Propagate every satellite at every sample epoch.
///
/// Dense ids follow the order of `satellites` (sorted by catalog number when
/// produced by `parse_tle_file`).
pub fn propagate_constellation(satellites: &[Satellite], clock: &SampleClock) -> Result<Vec<OrbitalData>> {
    satellites
        .iter()
        .enumerate()
        .map(|(id, satellite)| {
            let propagator = Propagator::from_satellite(satellite)?;
            let mut positions = Vec::with_capacity(clock.samples);
            let mut velocities = Vec::with_capacity(clock.samples);
            let mut lat_longs = Vec::with_capacity(clock.samples);

            for epoch in clock.epochs() {
                let state = propagator.propagate(epoch)?;
                lat_longs.push(transforms::lat_long(&state.position, epoch)?);
                positions.push(state.position);
                velocities.push(state.velocity);
            }

            OrbitalData::new(id, satellite.norad_id.to_string(), positions, velocities, lat_longs)
        })
        .collect()
}
