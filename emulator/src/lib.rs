//! Constellation Emulator
//!
//! Maps every satellite and ground station to a sandboxed network node and
//! keeps the virtual links, latency shaping and routing tables between them
//! in step with orbital geometry:
//!
//! - [`config`]: CLI / environment configuration
//! - [`dataset`]: trajectory loading, generation and export
//! - [`state`]: vertices, node names and the precomputed link table
//! - [`sandbox`]: the runtime that executes node, link and command operations
//! - [`shaping`]: per-edge `netem` delay directives
//! - [`audit`]: route-change and route-cost logs
//! - [`driver`]: the L3/L2 tick loop

use thiserror::Error;

pub mod audit;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod logging;
pub mod sandbox;
pub mod shaping;
pub mod state;

pub use config::{Cli, EmulatorConfig};
pub use driver::{DriverSettings, Emulator, RunSummary};
pub use state::SimulationState;

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to create log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Logging already initialised: {0}")]
    Logging(String),
    #[error(transparent)]
    Dataset(#[from] dataset::DatasetError),
    #[error(transparent)]
    Station(#[from] ground_stations::StationError),
    #[error("Link addressing failed: {0}")]
    Addressing(link_routing::LinkError),
    #[error(transparent)]
    Graph(#[from] constellation_graph::GraphError),
    #[error(transparent)]
    Sandbox(#[from] sandbox::SandboxError),
    #[error("Sandbox task failed: {0}")]
    Task(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(link_routing::LinkError),
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
