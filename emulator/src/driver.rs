//! Simulation Driver
//!
//! One tick per sample index. Every `l3_every` ticks the planner re-plans;
//! a new path is applied in strict phases, each joined before the next:
//!
//! 1. stand up new links
//! 2. shape path and drain edges
//! 3. install forward, reverse and drain routes
//! 4. tear down stale links (not awaited; reaped on later ticks)
//!
//! A link stood up again while its teardown is still in flight waits for
//! that teardown first.
//!
//! Every `l2_every` ticks the shaping alone is refreshed. Sandbox operations
//! inside a phase run concurrently as a bounded burst of tasks.

use crate::audit::AuditLog;
use crate::sandbox::{self, SandboxError, SandboxRuntime};
use crate::shaping;
use crate::state::SimulationState;
use crate::{EmulatorError, Result};
use constellation_graph::{L3Outcome, PathPlanner, PlannerConfig, TopologyGraph};
use link_routing::{diff, drain_route_tables, route_tables, LinkError, LinkKey, LinkRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Sandbox operations in flight at once
const MAX_IN_FLIGHT: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    /// Graph id of the source ground station
    pub source: usize,
    /// Graph id of the destination ground station
    pub destination: usize,
    pub l3_every: usize,
    pub l2_every: usize,
    pub ticks: usize,
    pub max_range_km: f64,
    pub ap_range_km: f64,
    pub no_drop: bool,
    /// Simulated seconds per tick
    pub step_seconds: u64,
    /// Wall time per tick; `None` free-runs
    pub pacing: Option<Duration>,
    pub grace: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: usize,
    pub path_changes: usize,
    pub links_stood_up: usize,
    pub links_torn_down: usize,
    pub failed_commands: usize,
    pub interrupted: bool,
}

type TeardownResult = (LinkKey, sandbox::Result<()>);

pub struct Emulator {
    state: SimulationState,
    planner: PathPlanner,
    runtime: Arc<dyn SandboxRuntime>,
    settings: DriverSettings,
    audit: AuditLog,
    active: BTreeSet<LinkKey>,
    teardowns: JoinSet<TeardownResult>,
    pending_teardowns: BTreeSet<LinkKey>,
    permits: Arc<Semaphore>,
    interrupt: Arc<AtomicBool>,
    summary: RunSummary,
}

impl Emulator {
    pub fn new(
        state: SimulationState,
        runtime: Arc<dyn SandboxRuntime>,
        settings: DriverSettings,
        audit: AuditLog,
    ) -> Result<Self> {
        for endpoint in [settings.source, settings.destination] {
            if state.is_satellite(endpoint) || endpoint >= state.num_vertices() {
                return Err(EmulatorError::Config(format!(
                    "endpoint {} is not a ground station",
                    endpoint
                )));
            }
        }
        if settings.l3_every == 0 || settings.l2_every == 0 {
            return Err(EmulatorError::Config("tick cadences must be greater than zero".into()));
        }

        let mut graph = TopologyGraph::new(state.num_satellites(), state.stations.len());
        graph.add_access_point_edges(&state.stations, settings.ap_range_km);
        let planner = PathPlanner::new(
            PlannerConfig {
                source: settings.source,
                destination: settings.destination,
                max_range_km: settings.max_range_km,
                no_drop: settings.no_drop,
            },
            graph,
        );

        Ok(Self {
            state,
            planner,
            runtime,
            settings,
            audit,
            active: BTreeSet::new(),
            teardowns: JoinSet::new(),
            pending_teardowns: BTreeSet::new(),
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            interrupt: Arc::new(AtomicBool::new(false)),
            summary: RunSummary::default(),
        })
    }

    /// Flag polled at the top of every tick; set it to stop the run.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    pub fn active_links(&self) -> &BTreeSet<LinkKey> {
        &self.active
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Create every node, then tick until the configured count or an interrupt.
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.start_nodes().await?;

        let start = Instant::now();
        for tick in 0..self.settings.ticks {
            if self.interrupt.load(Ordering::SeqCst) {
                info!(tick, "Interrupt received, stopping");
                self.summary.interrupted = true;
                tokio::time::sleep(self.settings.grace).await;
                break;
            }

            self.reap_teardowns();
            self.tick(tick).await?;
            self.summary.ticks += 1;
            self.pace(start, tick).await;
        }

        while let Some(joined) = self.teardowns.join_next().await {
            self.note_teardown(joined);
        }

        let s = &self.summary;
        info!(
            ticks = s.ticks,
            path_changes = s.path_changes,
            links_stood_up = s.links_stood_up,
            links_torn_down = s.links_torn_down,
            failed_commands = s.failed_commands,
            interrupted = s.interrupted,
            "Run complete"
        );
        Ok(self.summary.clone())
    }

    async fn start_nodes(&mut self) -> Result<()> {
        self.runtime.cleanup_all().await?;

        let mut tasks = JoinSet::new();
        for vertex in 0..self.state.num_vertices() {
            let name = self.state.node_name(vertex);
            let is_ground_station = !self.state.is_satellite(vertex);
            let runtime = self.runtime.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                runtime.create_node(&name, is_ground_station).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| EmulatorError::Task(e.to_string()))??;
        }
        info!(nodes = self.state.num_vertices(), "Created nodes");
        Ok(())
    }

    async fn tick(&mut self, time_index: usize) -> Result<()> {
        let mut shaped = false;

        if time_index % self.settings.l3_every == 0 {
            let outcome = self.planner.l3_tick(
                time_index,
                &mut self.state.satellites,
                &mut self.state.stations,
            )?;
            match outcome {
                L3Outcome::Adopted | L3Outcome::Changed => {
                    self.apply_path_change(time_index).await?;
                    shaped = true;
                }
                L3Outcome::Unchanged => debug!(time_index, "Path unchanged"),
                L3Outcome::NoPath => {}
            }
        }

        if time_index % self.settings.l2_every == 0 && !shaped && self.planner.has_path() {
            self.shape(time_index).await;
        }
        Ok(())
    }

    async fn apply_path_change(&mut self, time_index: usize) -> Result<()> {
        let next = self
            .planner
            .link_pairs()
            .into_iter()
            .map(|(a, b)| LinkKey::new(a, b))
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .map_err(EmulatorError::Invariant)?;
        let change = diff(&self.active, &next);
        let names: Vec<String> = self
            .planner
            .path()
            .iter()
            .map(|&v| self.state.node_name(v))
            .collect();
        info!(
            time_index,
            path = %names.join(" "),
            cost_ms = self.planner.cost_ms(),
            stand_up = change.stand_up.len(),
            tear_down = change.tear_down.len(),
            "Path change"
        );

        // 1. stand up
        self.await_teardowns(&change.stand_up).await;
        let mut tasks = JoinSet::new();
        for record in self.records(&change.stand_up)? {
            let runtime = self.runtime.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = runtime.create_link(&record).await;
                (record.key, result)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => self.summary.links_stood_up += 1,
                Ok((link, Err(e))) => self.command_failed(time_index, "stand up", Some(link), &e),
                Err(e) => self.task_failed(time_index, "stand up", e),
            }
        }

        // 2. shaping
        self.shape(time_index).await;

        // 3. routes
        let path = self.planner.path();
        let mut tables = route_tables(path, self.state.links()).map_err(EmulatorError::Invariant)?;
        if self.settings.no_drop && !self.planner.prev_sats().is_empty() {
            let drain = drain_route_tables(
                path,
                self.planner.drain_chain(),
                self.planner.prev_sats(),
                self.state.links(),
            )
            .map_err(EmulatorError::Invariant)?;
            debug!(time_index, rules = drain.len(), prev_sats = ?self.planner.prev_sats(), "Drain routes");
            tables.forward.extend(drain.forward);
            tables.reverse.extend(drain.reverse);
        }
        let mut commands: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for rule in tables.iter() {
            commands.entry(rule.node).or_default().push(rule.to_string());
        }
        self.run_commands(time_index, "routes", commands).await;

        let elapsed = self.elapsed(time_index);
        self.audit
            .record_path_change(elapsed, self.planner.cost_ms(), &names);

        // 4. tear down, fire and forget
        for record in self.records(&change.tear_down)? {
            let runtime = self.runtime.clone();
            let permits = self.permits.clone();
            self.pending_teardowns.insert(record.key);
            self.teardowns.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = runtime.teardown_link(&record).await;
                (record.key, result)
            });
            self.summary.links_torn_down += 1;
        }

        change.apply(&mut self.active);
        self.summary.path_changes += 1;
        Ok(())
    }

    /// Shape every path and drain edge and log the path cost.
    async fn shape(&mut self, time_index: usize) {
        let plan = shaping::plan(
            &self.state,
            time_index,
            self.planner.path(),
            self.planner.drain_edges(),
            self.settings.max_range_km,
        );

        let mut commands: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for directive in &plan.directives {
            commands
                .entry(directive.node)
                .or_default()
                .push(directive.to_string());
        }
        debug!(time_index, directives = plan.directives.len(), cost_ms = plan.cost_ms, "Shaping");
        self.run_commands(time_index, "shaping", commands).await;

        let elapsed = self.elapsed(time_index);
        self.audit.record_cost(elapsed, plan.cost_ms);
    }

    /// One task per node running its commands in order; all tasks joined.
    async fn run_commands(
        &mut self,
        time_index: usize,
        phase: &'static str,
        commands: BTreeMap<usize, Vec<String>>,
    ) {
        let mut tasks = JoinSet::new();
        for (node, list) in commands {
            let name = self.state.node_name(node);
            let runtime = self.runtime.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let mut failures = Vec::new();
                for command in list {
                    if let Err(e) = runtime.run_command(&name, &command).await {
                        failures.push(e);
                    }
                }
                failures
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(failures) => {
                    for e in failures {
                        self.command_failed(time_index, phase, None, &e);
                    }
                }
                Err(e) => self.task_failed(time_index, phase, e),
            }
        }
    }

    fn records(&self, keys: &[LinkKey]) -> Result<Vec<LinkRecord>> {
        keys.iter()
            .map(|key| self.state.links().get(*key).cloned())
            .collect::<std::result::Result<Vec<_>, LinkError>>()
            .map_err(EmulatorError::Invariant)
    }

    fn reap_teardowns(&mut self) {
        while let Some(joined) = self.teardowns.try_join_next() {
            self.note_teardown(joined);
        }
    }

    /// Wait until none of `keys` has a teardown in flight.
    async fn await_teardowns(&mut self, keys: &[LinkKey]) {
        while keys.iter().any(|key| self.pending_teardowns.contains(key)) {
            match self.teardowns.join_next().await {
                Some(joined) => self.note_teardown(joined),
                None => self.pending_teardowns.clear(),
            }
        }
    }

    fn note_teardown(&mut self, joined: std::result::Result<TeardownResult, JoinError>) {
        if let Ok((link, _)) = &joined {
            self.pending_teardowns.remove(link);
        }
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((link, Err(e))) => {
                self.summary.failed_commands += 1;
                warn!(%link, error = %e, "Teardown failed");
            }
            Err(e) => {
                self.summary.failed_commands += 1;
                warn!(error = %e, "Teardown task failed");
            }
        }
    }

    fn command_failed(
        &mut self,
        time_index: usize,
        phase: &'static str,
        link: Option<LinkKey>,
        error: &SandboxError,
    ) {
        self.summary.failed_commands += 1;
        match (error, link) {
            (SandboxError::CommandFailed { node, command, stderr }, _) => {
                warn!(time_index, phase, node = %node, command = %command, stderr = %stderr, "Sandbox command failed")
            }
            (e, Some(link)) => warn!(time_index, phase, %link, error = %e, "Sandbox operation failed"),
            (e, None) => warn!(time_index, phase, error = %e, "Sandbox operation failed"),
        }
    }

    fn task_failed(&mut self, time_index: usize, phase: &'static str, error: JoinError) {
        self.summary.failed_commands += 1;
        warn!(time_index, phase, error = %error, "Sandbox task failed");
    }

    fn elapsed(&self, time_index: usize) -> u64 {
        time_index as u64 * self.settings.step_seconds
    }

    /// Sleep until the end of `tick`'s wall-clock slot; never catch up.
    async fn pace(&self, start: Instant, tick: usize) {
        let Some(step) = self.settings.pacing else {
            return;
        };
        let slots = u32::try_from(tick + 1).unwrap_or(u32::MAX);
        let deadline = start + step.saturating_mul(slots);
        let now = Instant::now();
        if now > deadline {
            warn!(
                tick,
                behind_ms = (now - deadline).as_millis() as u64,
                "Emulation is not running in real time"
            );
        } else {
            tokio::time::sleep_until(deadline).await;
        }
    }
}
