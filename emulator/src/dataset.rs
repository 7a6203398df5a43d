//! Trajectory datasets
//!
//! Satellite rows: `satellite_id,time_index,pos_x,pos_y,pos_z[,vel_x,vel_y,vel_z]`.
//! Ground station rows: `groundstation_id,time_index,latitude,longitude,pos_x,pos_y,pos_z`.
//! Positions are meters on disk and kilometers in memory. A dataset must
//! hold exactly one row per (id, time index).

use chrono::DateTime;
use ground_stations::{GroundStation, StationError};
use orbital_mechanics::propagation::parse_tle_file;
use orbital_mechanics::trajectory::propagate_constellation;
use orbital_mechanics::{transforms, LatLong, OrbitalData, OrbitalError, SampleClock, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const METERS_PER_KM: f64 = 1000.0;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Expected {expected} rows, found {found}")]
    RowCountMismatch { expected: usize, found: usize },
    #[error("Row for id {id} at time index {time_index} is out of range")]
    OutOfRange { id: usize, time_index: usize },
    #[error("Duplicate row for id {id} at time index {time_index}")]
    Duplicate { id: usize, time_index: usize },
    #[error("Expected {expected} satellites, found {found}")]
    SatelliteCount { expected: usize, found: usize },
    #[error(transparent)]
    Orbital(#[from] OrbitalError),
    #[error(transparent)]
    Station(#[from] StationError),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Debug, Deserialize)]
struct SatelliteRow {
    satellite_id: usize,
    time_index: usize,
    pos_x: f64,
    pos_y: f64,
    pos_z: f64,
    #[serde(default)]
    vel_x: Option<f64>,
    #[serde(default)]
    vel_y: Option<f64>,
    #[serde(default)]
    vel_z: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StationRow {
    groundstation_id: usize,
    time_index: usize,
    pos_x: f64,
    pos_y: f64,
    pos_z: f64,
}

/// Export row
#[derive(Debug, Serialize)]
struct TrajectoryRow {
    satellite_id: usize,
    time_index: usize,
    pos_x: f64,
    pos_y: f64,
    pos_z: f64,
    vel_x: f64,
    vel_y: f64,
    vel_z: f64,
    latitude: f64,
    longitude: f64,
    timestamp_ms: i64,
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file))
}

/// Dense `ids x samples` grid filled exactly once per cell.
struct Grid<T> {
    samples: usize,
    cells: Vec<Option<T>>,
}

impl<T: Clone> Grid<T> {
    fn new(ids: usize, samples: usize) -> Self {
        Self {
            samples,
            cells: vec![None; ids * samples],
        }
    }

    fn insert(&mut self, id: usize, time_index: usize, value: T) -> Result<()> {
        let index = id
            .checked_mul(self.samples)
            .and_then(|start| start.checked_add(time_index))
            .filter(|&index| time_index < self.samples && index < self.cells.len())
            .ok_or(DatasetError::OutOfRange { id, time_index })?;
        let cell = &mut self.cells[index];
        if cell.is_some() {
            return Err(DatasetError::Duplicate { id, time_index });
        }
        *cell = Some(value);
        Ok(())
    }

    /// Values of one id in time order. Every cell is filled once the row count
    /// matched and no insert failed.
    fn row(&self, id: usize) -> Vec<T> {
        self.cells[id * self.samples..(id + 1) * self.samples]
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}

fn check_rows(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(DatasetError::RowCountMismatch { expected, found });
    }
    Ok(())
}

/// Load `num_satellites` trajectories of `clock.samples` samples each.
pub fn load_satellites(path: impl AsRef<Path>, num_satellites: usize, clock: &SampleClock) -> Result<Vec<OrbitalData>> {
    let path = path.as_ref();
    let mut reader = open_reader(path)?;
    let mut grid: Grid<(Vector3, Vector3)> = Grid::new(num_satellites, clock.samples);

    let mut rows = 0;
    for record in reader.deserialize() {
        let row: SatelliteRow = record?;
        rows += 1;
        let position = Vector3::new(row.pos_x, row.pos_y, row.pos_z) / METERS_PER_KM;
        let velocity = Vector3::new(
            row.vel_x.unwrap_or(0.0),
            row.vel_y.unwrap_or(0.0),
            row.vel_z.unwrap_or(0.0),
        ) / METERS_PER_KM;
        grid.insert(row.satellite_id, row.time_index, (position, velocity))?;
    }
    check_rows(num_satellites * clock.samples, rows)?;

    let satellites = (0..num_satellites)
        .map(|id| {
            let samples = grid.row(id);
            let lat_longs = samples
                .iter()
                .enumerate()
                .map(|(t, (position, _))| transforms::lat_long(position, clock.epoch(t)))
                .collect::<std::result::Result<Vec<LatLong>, _>>()?;
            let (positions, velocities) = samples.into_iter().unzip();
            Ok(OrbitalData::new(id, id.to_string(), positions, velocities, lat_longs)?)
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(path = %path.display(), satellites = satellites.len(), samples = clock.samples, "Loaded satellite dataset");
    Ok(satellites)
}

/// Fill station positions from a dataset.
pub fn load_station_positions(path: impl AsRef<Path>, stations: &mut [GroundStation], samples: usize) -> Result<()> {
    let path = path.as_ref();
    let mut reader = open_reader(path)?;
    let mut grid: Grid<Vector3> = Grid::new(stations.len(), samples);

    let mut rows = 0;
    for record in reader.deserialize() {
        let row: StationRow = record?;
        rows += 1;
        let position = Vector3::new(row.pos_x, row.pos_y, row.pos_z) / METERS_PER_KM;
        grid.insert(row.groundstation_id, row.time_index, position)?;
    }
    check_rows(stations.len() * samples, rows)?;

    for (id, station) in stations.iter_mut().enumerate() {
        station.set_positions(grid.row(id), samples)?;
    }
    tracing::info!(path = %path.display(), stations = stations.len(), "Loaded ground station positions");
    Ok(())
}

/// Rotate every station with the Earth at each sample epoch.
pub fn sample_station_positions(stations: &mut [GroundStation], clock: &SampleClock) -> Result<()> {
    for station in stations.iter_mut() {
        station.sample_positions(clock)?;
    }
    Ok(())
}

/// Propagate a TLE file; the file must describe exactly `num_satellites` satellites.
pub fn generate_satellites(tle_path: impl AsRef<Path>, num_satellites: usize, clock: &SampleClock) -> Result<Vec<OrbitalData>> {
    let tle_path = tle_path.as_ref();
    let contents = std::fs::read_to_string(tle_path).map_err(|source| DatasetError::Io {
        path: tle_path.display().to_string(),
        source,
    })?;
    let satellites = parse_tle_file(&contents)?;
    if satellites.len() != num_satellites {
        return Err(DatasetError::SatelliteCount {
            expected: num_satellites,
            found: satellites.len(),
        });
    }

    tracing::info!(satellites = satellites.len(), samples = clock.samples, "Propagating constellation");
    Ok(propagate_constellation(&satellites, clock)?)
}

/// Write every sample of every satellite, positions and velocities in meters.
pub fn export_trajectories(path: impl AsRef<Path>, satellites: &[OrbitalData], clock: &SampleClock) -> Result<usize> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;

    let mut rows = 0;
    for sat in satellites {
        let samples = sat.positions().iter().zip(sat.velocities()).zip(sat.lat_longs());
        for (time_index, ((position, velocity), lat_long)) in samples.enumerate() {
            let timestamp: DateTime<chrono::Utc> = clock.epoch(time_index);
            writer.serialize(TrajectoryRow {
                satellite_id: sat.id,
                time_index,
                pos_x: position.x * METERS_PER_KM,
                pos_y: position.y * METERS_PER_KM,
                pos_z: position.z * METERS_PER_KM,
                vel_x: velocity.x * METERS_PER_KM,
                vel_y: velocity.y * METERS_PER_KM,
                vel_z: velocity.z * METERS_PER_KM,
                latitude: lat_long.latitude,
                longitude: lat_long.longitude,
                timestamp_ms: timestamp.timestamp_millis(),
            })?;
            rows += 1;
        }
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;

    tracing::info!(path = %path.display(), rows, "Exported trajectories");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::io::Write;

    fn clock(samples: usize) -> SampleClock {
        let start = Utc.with_ymd_and_hms(2022, 9, 11, 12, 0, 0).unwrap();
        SampleClock::new(start, Duration::seconds(1), samples)
    }

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const TWO_BY_TWO: &str = "satellite_id,time_index,pos_x,pos_y,pos_z
0,0,7000000,0,0
1,0,0,7000000,0
0,1,7000000,1000,0
1,1,0,7000000,1000
";

    #[test]
    fn test_load_converts_meters() {
        let file = write_csv(TWO_BY_TWO);
        let sats = load_satellites(file.path(), 2, &clock(2)).unwrap();
        assert_eq!(sats.len(), 2);
        assert_eq!(sats[0].position(1), Some(&Vector3::new(7000.0, 1.0, 0.0)));
        assert_eq!(sats[1].velocities()[0], Vector3::zeros());
        assert!(sats[1].lat_longs()[0].latitude.abs() < 1e-9);
    }

    #[test]
    fn test_row_count_must_match() {
        let file = write_csv(TWO_BY_TWO);
        let err = load_satellites(file.path(), 2, &clock(3)).unwrap_err();
        assert!(matches!(err, DatasetError::RowCountMismatch { expected: 6, found: 4 }));
    }

    #[test]
    fn test_duplicate_and_out_of_range_rows() {
        let file = write_csv("satellite_id,time_index,pos_x,pos_y,pos_z\n0,0,1,1,1\n0,0,1,1,1\n");
        let err = load_satellites(file.path(), 1, &clock(2)).unwrap_err();
        assert!(matches!(err, DatasetError::Duplicate { id: 0, time_index: 0 }));

        let file = write_csv("satellite_id,time_index,pos_x,pos_y,pos_z\n3,0,1,1,1\n");
        let err = load_satellites(file.path(), 1, &clock(1)).unwrap_err();
        assert!(matches!(err, DatasetError::OutOfRange { id: 3, .. }));
    }

    #[test]
    fn test_huge_ids_are_out_of_range() {
        let file = write_csv("satellite_id,time_index,pos_x,pos_y,pos_z\n18446744073709551615,0,1,1,1\n");
        let err = load_satellites(file.path(), 1, &clock(2)).unwrap_err();
        assert!(matches!(err, DatasetError::OutOfRange { id: usize::MAX, time_index: 0 }));

        let file = write_csv(
            "groundstation_id,time_index,latitude,longitude,pos_x,pos_y,pos_z\n0,18446744073709551615,0.0,0.0,1,1,1\n",
        );
        let mut stations = vec![GroundStation::new(0, "Quito", LatLong::new(0.0, 0.0), true)];
        let err = load_station_positions(file.path(), &mut stations, 2).unwrap_err();
        assert!(matches!(err, DatasetError::OutOfRange { id: 0, .. }));
    }

    #[test]
    fn test_export_can_be_loaded_back() {
        let file = write_csv(TWO_BY_TWO);
        let sats = load_satellites(file.path(), 2, &clock(2)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("trajectories.csv");
        assert_eq!(export_trajectories(&export, &sats, &clock(2)).unwrap(), 4);

        let header = std::fs::read_to_string(&export).unwrap();
        assert!(header.starts_with(
            "satellite_id,time_index,pos_x,pos_y,pos_z,vel_x,vel_y,vel_z,latitude,longitude,timestamp_ms"
        ));

        let reloaded = load_satellites(&export, 2, &clock(2)).unwrap();
        assert_eq!(reloaded[1].positions(), sats[1].positions());
    }

    #[test]
    fn test_station_positions() {
        let file = write_csv(
            "groundstation_id,time_index,latitude,longitude,pos_x,pos_y,pos_z
0,0,0.0,0.0,6378000,0,0
0,1,0.0,0.0,6378000,5000,0
",
        );
        let mut stations = vec![GroundStation::new(0, "Quito", LatLong::new(0.0, 0.0), true)];
        load_station_positions(file.path(), &mut stations, 2).unwrap();
        assert_eq!(stations[0].position(1), Some(&Vector3::new(6378.0, 5.0, 0.0)));

        let err = load_station_positions(file.path(), &mut stations, 3).unwrap_err();
        assert!(matches!(err, DatasetError::RowCountMismatch { expected: 3, found: 2 }));
    }

    #[test]
    fn test_generation_checks_satellite_count() {
        let tle = write_csv(
            "ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537
",
        );
        let err = generate_satellites(tle.path(), 2, &clock(2)).unwrap_err();
        assert!(matches!(err, DatasetError::SatelliteCount { expected: 2, found: 1 }));
    }
}
