//! Configuration
//!
//! Every option can be given on the command line or through its `EMULATOR_*`
//! environment variable. [`Cli::validate`] turns the raw options into an
//! [`EmulatorConfig`].

use crate::driver::DriverSettings;
use crate::{EmulatorError, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};
use orbital_mechanics::SampleClock;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Satellite count of a known constellation, or an explicit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constellation {
    Kepler,
    OneWeb,
    Starlink,
    Custom(usize),
}

impl Constellation {
    pub fn satellites(&self) -> usize {
        match self {
            Constellation::Kepler => 140,
            Constellation::OneWeb => 648,
            Constellation::Starlink => 1584,
            Constellation::Custom(n) => *n,
        }
    }
}

impl FromStr for Constellation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kepler" => Ok(Constellation::Kepler),
            "oneweb" => Ok(Constellation::OneWeb),
            "starlink" => Ok(Constellation::Starlink),
            other => other
                .parse::<usize>()
                .map(Constellation::Custom)
                .map_err(|_| format!("unknown constellation '{}'", s)),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "emulator", version, about = "Time-varying satellite network emulator")]
pub struct Cli {
    /// Ground station descriptor file (`title, lat, lon, is_access_point` per line)
    #[arg(long, env = "EMULATOR_STATIONS")]
    pub stations: PathBuf,

    /// Satellite trajectory dataset (CSV), used unless positions are generated
    #[arg(long, env = "EMULATOR_SATELLITE_DATASET")]
    pub satellites: Option<PathBuf>,

    /// Three-line TLE file, used when positions are generated
    #[arg(long, env = "EMULATOR_TLE_FILE")]
    pub tle: Option<PathBuf>,

    /// Ground station trajectory dataset (CSV); Earth rotation is computed when absent
    #[arg(long, env = "EMULATOR_STATION_POSITIONS")]
    pub station_positions: Option<PathBuf>,

    /// Propagate the TLE file instead of loading a dataset
    #[arg(long, env = "EMULATOR_GENERATE_POSITIONS")]
    pub generate_positions: bool,

    /// Write the loaded trajectories to `export_path` and exit
    #[arg(long, env = "EMULATOR_EXPORT_TRAJECTORIES")]
    pub export_trajectories: bool,

    #[arg(long, env = "EMULATOR_EXPORT_PATH", default_value = "trajectories.csv")]
    pub export_path: PathBuf,

    /// kepler, oneweb, starlink or a satellite count
    #[arg(long, env = "EMULATOR_CONSTELLATION", default_value = "kepler")]
    pub constellation: Constellation,

    /// Position samples per trajectory
    #[arg(long, env = "EMULATOR_SAMPLES", default_value_t = 3600)]
    pub samples: usize,

    /// Seconds between samples (and wall time per tick)
    #[arg(long, env = "EMULATOR_STEP_SECONDS", default_value_t = 1)]
    pub step_seconds: u32,

    /// Epoch of sample 0 (RFC 3339)
    #[arg(long, env = "EMULATOR_START", default_value = "2022-09-11T12:00:00Z")]
    pub start: DateTime<Utc>,

    /// Title of the source ground station
    #[arg(long, env = "EMULATOR_SOURCE")]
    pub source: String,

    /// Title of the destination ground station
    #[arg(long, env = "EMULATOR_DESTINATION")]
    pub destination: String,

    /// Ticks between topology recomputations
    #[arg(long, env = "EMULATOR_L3_EVERY", default_value_t = 10)]
    pub l3_every: usize,

    /// Ticks between shaping refreshes; must divide `l3_every`
    #[arg(long, env = "EMULATOR_L2_EVERY", default_value_t = 1)]
    pub l2_every: usize,

    #[arg(long, env = "EMULATOR_MAX_RANGE_KM", default_value_t = 3000.0)]
    pub max_range_km: f64,

    /// Terrestrial access point range
    #[arg(long, env = "EMULATOR_AP_RANGE_KM", default_value_t = 8.0)]
    pub ap_range_km: f64,

    /// Keep abandoned satellites linked until their traffic drains
    #[arg(long, env = "EMULATOR_NO_DROP", default_value_t = true, action = ArgAction::Set)]
    pub no_drop: bool,

    #[arg(long, env = "EMULATOR_AUDIT_FILE", default_value = "route_changes.log")]
    pub audit_file: PathBuf,

    #[arg(long, env = "EMULATOR_COST_FILE", default_value = "route_costs.log")]
    pub cost_file: PathBuf,

    /// Number of ticks to run (defaults to the sample count)
    #[arg(long, env = "EMULATOR_TICKS")]
    pub ticks: Option<usize>,

    /// Pace ticks to wall-clock time
    #[arg(long, env = "EMULATOR_REALTIME", default_value_t = true, action = ArgAction::Set)]
    pub realtime: bool,

    /// Delay before returning after an interrupt
    #[arg(long, env = "EMULATOR_GRACE_SECONDS", default_value_t = 2)]
    pub grace_seconds: u64,

    /// Record sandbox operations instead of executing them
    #[arg(long, env = "EMULATOR_DRY_RUN")]
    pub dry_run: bool,

    /// Directory for the run log file (system temp dir by default)
    #[arg(long, env = "EMULATOR_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Where satellite trajectories come from
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSource {
    Dataset(PathBuf),
    Generate { tle: PathBuf },
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub stations: PathBuf,
    pub positions: PositionSource,
    pub station_positions: Option<PathBuf>,
    /// Export target when running in export mode
    pub export: Option<PathBuf>,
    pub num_satellites: usize,
    pub clock: SampleClock,
    pub source: String,
    pub destination: String,
    pub l3_every: usize,
    pub l2_every: usize,
    pub max_range_km: f64,
    pub ap_range_km: f64,
    pub no_drop: bool,
    pub audit_file: PathBuf,
    pub cost_file: PathBuf,
    pub ticks: usize,
    pub pacing: Option<Duration>,
    pub grace: Duration,
    pub dry_run: bool,
    pub log_dir: PathBuf,
}

impl Cli {
    pub fn validate(self) -> Result<EmulatorConfig> {
        let invalid = |msg: String| Err(EmulatorError::Config(msg));

        if self.l3_every == 0 || self.l2_every == 0 {
            return invalid("tick cadences must be greater than zero".into());
        }
        if self.l3_every % self.l2_every != 0 {
            return invalid(format!(
                "L2 cadence {} does not divide L3 cadence {}",
                self.l2_every, self.l3_every
            ));
        }
        if self.samples == 0 || self.step_seconds == 0 {
            return invalid("sample count and step must be greater than zero".into());
        }
        let ticks = self.ticks.unwrap_or(self.samples);
        if ticks > self.samples {
            return invalid(format!("{} ticks exceed {} samples", ticks, self.samples));
        }
        if self.source == self.destination {
            return invalid(format!("source and destination are both '{}'", self.source));
        }
        if self.max_range_km.is_nan() || self.max_range_km <= 0.0 || self.ap_range_km < 0.0 {
            return invalid("ranges must be positive".into());
        }
        let num_satellites = self.constellation.satellites();
        if num_satellites == 0 {
            return invalid("constellation has no satellites".into());
        }

        let positions = if self.generate_positions {
            match self.tle {
                Some(tle) => PositionSource::Generate { tle },
                None => return invalid("generating positions requires --tle".into()),
            }
        } else {
            match self.satellites {
                Some(path) => PositionSource::Dataset(path),
                None => return invalid("loading positions requires --satellites".into()),
            }
        };

        let step = Duration::from_secs(u64::from(self.step_seconds));
        let clock = SampleClock::new(
            self.start,
            chrono::Duration::seconds(i64::from(self.step_seconds)),
            self.samples,
        );

        Ok(EmulatorConfig {
            stations: self.stations,
            positions,
            station_positions: self.station_positions,
            export: self.export_trajectories.then_some(self.export_path),
            num_satellites,
            clock,
            source: self.source,
            destination: self.destination,
            l3_every: self.l3_every,
            l2_every: self.l2_every,
            max_range_km: self.max_range_km,
            ap_range_km: self.ap_range_km,
            no_drop: self.no_drop,
            audit_file: self.audit_file,
            cost_file: self.cost_file,
            ticks,
            pacing: self.realtime.then_some(step),
            grace: Duration::from_secs(self.grace_seconds),
            dry_run: self.dry_run,
            log_dir: self.log_dir.unwrap_or_else(std::env::temp_dir),
        })
    }
}

impl EmulatorConfig {
    /// Driver settings once the endpoint titles are resolved to graph ids.
    pub fn driver_settings(&self, source: usize, destination: usize) -> DriverSettings {
        DriverSettings {
            source,
            destination,
            l3_every: self.l3_every,
            l2_every: self.l2_every,
            ticks: self.ticks,
            max_range_km: self.max_range_km,
            ap_range_km: self.ap_range_km,
            no_drop: self.no_drop,
            step_seconds: self.clock.step.num_seconds().max(0) as u64,
            pacing: self.pacing,
            grace: self.grace,
        }
    }
}
