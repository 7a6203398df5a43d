//! Orbital Mechanics Library
//!
//! Pure geometry consumed by the constellation emulator:
//! - 3D distance, reachability and the free-space latency model
//! - Geodetic <-> Cartesian transforms with Earth rotation (GMST)
//! - TLE parsing and SGP4 propagation into fixed-length trajectories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod geometry;
pub mod trajectory;

pub use geometry::{LatLong, Vector3};
pub use trajectory::{OrbitalData, SampleClock};

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error(
        "Sample length mismatch for satellite {id}: {positions} positions, \
         {velocities} velocities, {lat_longs} lat/longs"
    )]
    SampleLengthMismatch {
        id: usize,
        positions: usize,
        velocities: usize,
        lat_longs: usize,
    },
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// A satellite described by its two-line element set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Satellite {
    pub norad_id: u64,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    /// Position in km
    pub position: Vector3,
    /// Velocity in km/s
    pub velocity: Vector3,
    pub epoch: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

impl Satellite {
    pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector> {
        propagation::Propagator::from_satellite(self)?.propagate(time)
    }
}

pub mod propagation {
    use super::*;

    /// Parsed elements plus SGP4 constants, built once per satellite.
    pub struct Propagator {
        constants: sgp4::Constants,
        epoch: DateTime<Utc>,
    }

    impl Propagator {
        pub fn new(tle_line1: &str, tle_line2: &str) -> Result<Self> {
            let elements = sgp4::Elements::from_tle(
                None,
                tle_line1.as_bytes(),
                tle_line2.as_bytes(),
            ).map_err(|e| OrbitalError::InvalidTle(format!("{:?}", e)))?;

            let constants = sgp4::Constants::from_elements(&elements)
                .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

            let epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

            Ok(Self { constants, epoch })
        }

        pub fn from_satellite(satellite: &Satellite) -> Result<Self> {
            Self::new(&satellite.tle_line1, &satellite.tle_line2)
        }

        pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector> {
            let duration = time.signed_duration_since(self.epoch);
            let minutes_since_epoch = duration.num_milliseconds() as f64 / 60_000.0;

            let prediction = self.constants.propagate(minutes_since_epoch)
                .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

            Ok(StateVector {
                position: Vector3::new(
                    prediction.position[0],
                    prediction.position[1],
                    prediction.position[2],
                ),
                velocity: Vector3::new(
                    prediction.velocity[0],
                    prediction.velocity[1],
                    prediction.velocity[2],
                ),
                epoch: time,
            })
        }
    }

    /// Parse a three-line TLE file (name line, line 1, line 2 per satellite).
    ///
    /// The result is sorted by catalog number so that dense satellite ids are
    /// stable across runs.
    pub fn parse_tle_file(contents: &str) -> Result<Vec<Satellite>> {
        let lines: Vec<&str> = contents
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();

        if lines.len() % 3 != 0 {
            return Err(OrbitalError::InvalidTle(format!(
                "expected groups of three lines, found {} lines",
                lines.len()
            )));
        }

        let mut satellites = Vec::with_capacity(lines.len() / 3);
        for chunk in lines.chunks(3) {
            let (name, line1, line2) = (chunk[0].trim(), chunk[1], chunk[2]);
            if !line1.starts_with("1 ") || !line2.starts_with("2 ") {
                return Err(OrbitalError::InvalidTle(format!(
                    "element lines for '{}' are out of order",
                    name
                )));
            }
            let norad_id = line1
                .get(2..7)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    OrbitalError::InvalidTle(format!("bad catalog number for '{}'", name))
                })?;

            satellites.push(Satellite {
                norad_id,
                name: name.to_string(),
                tle_line1: line1.to_string(),
                tle_line2: line2.to_string(),
            });
        }

        satellites.sort_by_key(|s| s.norad_id);
        Ok(satellites)
    }
}

pub mod transforms {
    use super::*;
    use nalgebra::Rotation3;

    pub const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    /// Greenwich mean sidereal time in radians (IAU 1982 model).
    pub fn gmst(time: DateTime<Utc>) -> f64 {
        let unix_seconds = time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9;
        let julian_date = unix_seconds / 86_400.0 + 2_440_587.5;
        let t = (julian_date - 2_451_545.0) / 36_525.0;

        let seconds = 67_310.548_41
            + (876_600.0 * 3600.0 + 8_640_184.812_866) * t
            + 0.093_104 * t * t
            - 6.2e-6 * t * t * t;

        (seconds.rem_euclid(86_400.0) / 240.0).to_radians()
    }

    /// Earth-fixed Cartesian position (km) of a geodetic point.
    pub fn geodetic_to_ecef(pos: &GeodeticPosition) -> Vector3 {
        let lat_rad = pos.latitude.to_radians();
        let lon_rad = pos.longitude.to_radians();
        let alt = pos.altitude_km;

        let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
        let n = EARTH_RADIUS_KM / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();

        Vector3::new(
            (n + alt) * lat_rad.cos() * lon_rad.cos(),
            (n + alt) * lat_rad.cos() * lon_rad.sin(),
            (n * (1.0 - e2) + alt) * lat_rad.sin(),
        )
    }

    /// Inertial position (km) of a geodetic point at the given instant.
    pub fn geodetic_to_eci(pos: &GeodeticPosition, time: DateTime<Utc>) -> Result<Vector3> {
        if !pos.latitude.is_finite() || !pos.longitude.is_finite() || !pos.altitude_km.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!("{:?}", pos)));
        }
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), gmst(time));
        Ok(rotation * geodetic_to_ecef(pos))
    }

    /// Spherical-Earth geodetic position of an inertial point at the given instant.
    pub fn eci_to_geodetic(position: &Vector3, time: DateTime<Utc>) -> Result<GeodeticPosition> {
        if !position.iter().all(|c| c.is_finite()) {
            return Err(OrbitalError::InvalidCoordinates(format!("{:?}", position)));
        }
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), -gmst(time));
        let fixed = rotation * position;

        let r = (fixed.x * fixed.x + fixed.y * fixed.y).sqrt();
        let longitude = fixed.y.atan2(fixed.x).to_degrees();
        let latitude = fixed.z.atan2(r).to_degrees();
        let altitude_km = fixed.norm() - EARTH_RADIUS_KM;

        Ok(GeodeticPosition {
            latitude,
            longitude,
            altitude_km,
        })
    }

    pub fn lat_long(position: &Vector3, time: DateTime<Utc>) -> Result<LatLong> {
        let geo = eci_to_geodetic(position, time)?;
        Ok(LatLong::new(geo.latitude, geo.longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ISS_TLE: &str = "ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537
";

    #[test]
    fn test_parse_tle_file() {
        let satellites = propagation::parse_tle_file(ISS_TLE).unwrap();
        assert_eq!(satellites.len(), 1);
        assert_eq!(satellites[0].norad_id, 25544);
        assert_eq!(satellites[0].name, "ISS (ZARYA)");
    }

    #[test]
    fn test_parse_tle_file_rejects_partial_group() {
        let err = propagation::parse_tle_file("NAME\n1 25544U 98067A\n").unwrap_err();
        assert!(matches!(err, OrbitalError::InvalidTle(_)));
    }

    #[test]
    fn test_propagate_low_earth_orbit() {
        let satellites = propagation::parse_tle_file(ISS_TLE).unwrap();
        let time = Utc.with_ymd_and_hms(2008, 9, 21, 0, 0, 0).unwrap();
        let state = satellites[0].propagate(time).unwrap();

        let radius = state.position.norm();
        assert!(radius > 6500.0 && radius < 7000.0, "radius {} km", radius);
        assert!(state.velocity.norm() > 7.0);
    }

    #[test]
    fn test_geodetic_round_trip_through_rotation() {
        let time = Utc.with_ymd_and_hms(2022, 9, 11, 12, 0, 0).unwrap();
        let madrid = GeodeticPosition {
            latitude: 40.228732,
            longitude: -4.010844,
            altitude_km: 0.0,
        };
        let eci = transforms::geodetic_to_eci(&madrid, time).unwrap();
        let back = transforms::eci_to_geodetic(&eci, time).unwrap();

        // Spherical inverse of an ellipsoidal forward transform: within a fraction of a degree
        assert!((back.longitude - madrid.longitude).abs() < 1e-6);
        assert!((back.latitude - madrid.latitude).abs() < 0.3);
    }

    #[test]
    fn test_earth_rotates_ground_point() {
        let t0 = Utc.with_ymd_and_hms(2022, 9, 11, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::hours(6);
        let point = GeodeticPosition {
            latitude: 0.0,
            longitude: 0.0,
            altitude_km: 0.0,
        };
        let a = transforms::geodetic_to_eci(&point, t0).unwrap();
        let b = transforms::geodetic_to_eci(&point, t1).unwrap();

        assert!((a.norm() - b.norm()).abs() < 1e-6);
        assert!(geometry::distance(&a, &b) > 8000.0);
    }
}
