use anyhow::{Context, Result};
use clap::Parser;
use emulator::audit::AuditLog;
use emulator::config::PositionSource;
use emulator::sandbox::{NetnsRuntime, RecordingRuntime, SandboxRuntime};
use emulator::{dataset, logging, Cli, Emulator, SimulationState};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().validate()?;
    logging::init(&config.log_dir)?;

    tracing::info!(
        satellites = config.num_satellites,
        samples = config.clock.samples,
        l3_every = config.l3_every,
        l2_every = config.l2_every,
        no_drop = config.no_drop,
        "🛰️  Constellation emulator starting"
    );

    let satellites = match &config.positions {
        PositionSource::Generate { tle } => {
            dataset::generate_satellites(tle, config.num_satellites, &config.clock)?
        }
        PositionSource::Dataset(path) => {
            dataset::load_satellites(path, config.num_satellites, &config.clock)?
        }
    };
    tracing::info!("   Loaded {} satellite trajectories", satellites.len());

    if let Some(path) = &config.export {
        let rows = dataset::export_trajectories(path, &satellites, &config.clock)?;
        tracing::info!("   Exported {} rows to {}", rows, path.display());
        return Ok(());
    }

    let mut stations = ground_stations::descriptor::load(&config.stations)
        .with_context(|| format!("loading {}", config.stations.display()))?;
    match &config.station_positions {
        Some(path) => dataset::load_station_positions(path, &mut stations, config.clock.samples)?,
        None => dataset::sample_station_positions(&mut stations, &config.clock)?,
    }
    tracing::info!("   Loaded {} ground stations", stations.len());

    let state = SimulationState::new(satellites, stations, config.clock)?;
    let source = state.station_vertex(&config.source)?;
    let destination = state.station_vertex(&config.destination)?;

    let runtime: Arc<dyn SandboxRuntime> = if config.dry_run {
        tracing::warn!("   Dry run: sandbox operations are recorded, not executed");
        Arc::new(RecordingRuntime::new())
    } else {
        Arc::new(NetnsRuntime::new())
    };

    let audit = AuditLog::open(&config.audit_file, &config.cost_file);
    let mut emulator = Emulator::new(
        state,
        runtime,
        config.driver_settings(source, destination),
        audit,
    )?;

    let interrupt = emulator.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.store(true, Ordering::SeqCst);
        }
    });

    let summary = emulator.run().await?;
    tracing::info!(
        "   {} ticks, {} path changes, {} failed commands",
        summary.ticks,
        summary.path_changes,
        summary.failed_commands
    );
    Ok(())
}
