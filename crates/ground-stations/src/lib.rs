//! Ground Stations Library
//!
//! Ground stations of the emulated network: descriptor file loading,
//! Earth-fixed position sampling and access-point reachability.

use chrono::{DateTime, Utc};
use orbital_mechanics::transforms;
use orbital_mechanics::GeodeticPosition;
use orbital_mechanics::{geometry, LatLong, OrbitalError, SampleClock, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Station not found: {0}")]
    NotFound(String),
    #[error("Malformed descriptor line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("Failed to read descriptor file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Station {station} has {found} position samples, expected {expected}")]
    SampleCount {
        station: String,
        found: usize,
        expected: usize,
    },
    #[error(transparent)]
    Orbital(#[from] OrbitalError),
}

pub type Result<T> = std::result::Result<T, StationError>;

/// A ground station as described by one descriptor line.
///
/// `id` is the zero-based line order of the descriptor; the graph id of the
/// station is `num_satellites + id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundStation {
    pub id: usize,
    pub title: String,
    pub lat_long: LatLong,
    positions: Vec<Vector3>,
    /// Only access points may host a satellite uplink
    pub is_access_point: bool,
    pub is_active: bool,
}

impl GroundStation {
    pub fn new(id: usize, title: impl Into<String>, lat_long: LatLong, is_access_point: bool) -> Self {
        Self {
            id,
            title: title.into(),
            lat_long,
            positions: Vec::new(),
            is_access_point,
            is_active: false,
        }
    }

    /// Stationary station with `samples` copies of one position, for fixtures.
    pub fn fixed(
        id: usize,
        title: impl Into<String>,
        position: Vector3,
        samples: usize,
        is_access_point: bool,
    ) -> Self {
        let mut station = Self::new(id, title, LatLong::default(), is_access_point);
        station.positions = vec![position; samples];
        station
    }

    /// Earth-fixed position rotated into the inertial frame at `time`.
    pub fn position_at(&self, time: DateTime<Utc>) -> Result<Vector3> {
        let geodetic = GeodeticPosition {
            latitude: self.lat_long.latitude,
            longitude: self.lat_long.longitude,
            altitude_km: 0.0,
        };
        Ok(transforms::geodetic_to_eci(&geodetic, time)?)
    }

    /// Fill the position samples by rotating the station with the Earth.
    pub fn sample_positions(&mut self, clock: &SampleClock) -> Result<()> {
        self.positions = clock
            .epochs()
            .map(|epoch| self.position_at(epoch))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    /// Replace the position samples with externally supplied ones.
    pub fn set_positions(&mut self, positions: Vec<Vector3>, expected: usize) -> Result<()> {
        if positions.len() != expected {
            return Err(StationError::SampleCount {
                station: self.title.clone(),
                found: positions.len(),
                expected,
            });
        }
        self.positions = positions;
        Ok(())
    }

    #[inline]
    pub fn position(&self, index: usize) -> Option<&Vector3> {
        self.positions.get(index)
    }

    pub fn positions(&self) -> &[Vector3] {
        &self.positions
    }

    /// Terrestrial backhaul is possible when the great-circle distance between
    /// the two stations is within `range_km`.
    pub fn within_access_range(&self, other: &GroundStation, range_km: f64) -> bool {
        geometry::surface_distance(self.lat_long, other.lat_long) <= range_km
    }
}

/// Look a station up by its descriptor title.
pub fn find_by_title<'a>(stations: &'a [GroundStation], title: &str) -> Result<&'a GroundStation> {
    stations
        .iter()
        .find(|gs| gs.title == title)
        .ok_or_else(|| StationError::NotFound(title.to_string()))
}

pub mod descriptor {
    //! `title, latitude, longitude, is_access_point` per line.

    use super::*;

    pub fn load(path: impl AsRef<Path>) -> Result<Vec<GroundStation>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| StationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let stations = parse(&contents)?;
        tracing::info!(path = %path.display(), count = stations.len(), "Loaded ground stations");
        Ok(stations)
    }

    pub fn parse(contents: &str) -> Result<Vec<GroundStation>> {
        let mut stations = Vec::new();

        for (index, raw) in contents.lines().enumerate() {
            let line = index + 1;
            if raw.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(StationError::MalformedLine {
                    line,
                    reason: format!("expected 4 fields, found {}", fields.len()),
                });
            }

            let latitude = parse_degrees(fields[1], line, "latitude")?;
            let longitude = parse_degrees(fields[2], line, "longitude")?;
            let is_access_point = parse_flag(fields[3]).ok_or_else(|| StationError::MalformedLine {
                line,
                reason: format!("invalid access point flag '{}'", fields[3]),
            })?;

            stations.push(GroundStation::new(
                stations.len(),
                fields[0],
                LatLong::new(latitude, longitude),
                is_access_point,
            ));
        }

        Ok(stations)
    }

    fn parse_degrees(field: &str, line: usize, name: &str) -> Result<f64> {
        field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| StationError::MalformedLine {
                line,
                reason: format!("invalid {} '{}'", name, field),
            })
    }

    fn parse_flag(field: &str) -> Option<bool> {
        match field {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    const DESCRIPTORS: &str = "Madrid, 40.228732, -4.010844, true
El Alamo, 40.231081686, -3.9943653458, false

Munich, 48.0848, 11.2798, 1
";

    #[test]
    fn test_parse_descriptors() {
        let stations = descriptor::parse(DESCRIPTORS).unwrap();
        assert_eq!(stations.len(), 3);
        assert_eq!(stations[1].title, "El Alamo");
        assert!(!stations[1].is_access_point);
        // ids follow station order, blank lines do not count
        assert_eq!(stations[2].id, 2);
        assert!(stations[2].is_access_point);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = descriptor::parse("A, 1.0, 2.0, true\nB, 1.0, true\n").unwrap_err();
        assert!(matches!(err, StationError::MalformedLine { line: 2, .. }));

        let err = descriptor::parse("A, north, 2.0, true\n").unwrap_err();
        assert!(matches!(err, StationError::MalformedLine { line: 1, .. }));

        let err = descriptor::parse("A, 1.0, 2.0, maybe\n").unwrap_err();
        assert!(matches!(err, StationError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DESCRIPTORS.as_bytes()).unwrap();

        let stations = descriptor::load(file.path()).unwrap();
        assert_eq!(stations.len(), 3);
        assert!(find_by_title(&stations, "Munich").is_ok());
        assert!(matches!(
            find_by_title(&stations, "Oslo"),
            Err(StationError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = descriptor::load("/nonexistent/stations.txt").unwrap_err();
        assert!(matches!(err, StationError::Io { .. }));
    }

    #[test]
    fn test_access_range() {
        let stations = descriptor::parse(DESCRIPTORS).unwrap();
        assert!(stations[0].within_access_range(&stations[1], 8.0));
        assert!(!stations[0].within_access_range(&stations[2], 8.0));
    }

    #[test]
    fn test_sample_positions_follow_earth_rotation() {
        let mut stations = descriptor::parse(DESCRIPTORS).unwrap();
        let start = Utc.with_ymd_and_hms(2022, 9, 11, 12, 0, 0).unwrap();
        let clock = SampleClock::new(start, Duration::minutes(10), 6);

        stations[0].sample_positions(&clock).unwrap();
        assert_eq!(stations[0].positions().len(), 6);

        let first = stations[0].position(0).unwrap();
        let last = stations[0].position(5).unwrap();
        assert!((first.norm() - last.norm()).abs() < 1e-6);
        assert!(geometry::distance(first, last) > 100.0);
    }

    #[test]
    fn test_set_positions_checks_count() {
        let mut gs = GroundStation::new(0, "A", LatLong::default(), true);
        assert!(gs.set_positions(vec![Vector3::zeros(); 3], 3).is_ok());
        assert!(matches!(
            gs.set_positions(vec![Vector3::zeros(); 2], 3),
            Err(StationError::SampleCount { found: 2, expected: 3, .. })
        ));
    }
}
