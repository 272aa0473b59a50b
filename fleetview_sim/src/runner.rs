//! Scenario runner - drives a live view through feed fault scenarios.
//!
//! Every scenario publishes simulated fleet updates, pushes them through a
//! [`LiveView`] (directly or via [`FeedRuntime`] over a [`SimFeed`]) and then
//! checks what the operator would have seen.

use crate::context::SimContext;
use crate::exporter::{camera_kind, SimEvent, SimFrame};
use crate::feed::{FeedEvent, SimFeed};
use crate::oracle::{FleetOracle, OracleConfig};
use crate::publisher::{FeedPublisher, PublishMode, PublishedUpdate, PublisherConfig, RecordStyle};
use crate::scenarios::ScenarioId;

use fleetview_core::live_view::FrameOutcome;
use fleetview_core::wire::DecodeError;
use fleetview_core::{
    ClusterPolicy, ConnectionStatus, FeedRuntime, LiveView, LiveViewConfig, ProtocolAnomaly, RenderFrame,
    RenderSurface, RuntimeConfig, Snapshot, ViewMode,
};
use fleetview_env::{EnvError, FeedController, FleetViewContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Salt separating the feed's loss RNG from the physics RNG.
const LOSS_SALT: u64 = 0x5eed_f00d_dead_beef;

/// Garbage frames and the warning each one must raise.
const GARBAGE: [(&str, &str); 6] = [
    ("not json at all", "unrecognized-message"),
    (r#"{"foo":1}"#, "unrecognized-message"),
    ("42", "unrecognized-message"),
    ("[1,2]", "unrecognized-message"),
    (r#"{"batch":[],"batchNumber":0,"totalBatches":2}"#, "invalid-part"),
    (r#"{"batch":[],"batchNumber":5,"totalBatches":2}"#, "invalid-part"),
];

// ============================================================================
// RESULTS
// ============================================================================

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Entities in the snapshot at the end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Rendered frames, when export was requested
    pub frames: Vec<SimFrame>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    pub updates_published: u64,
    pub updates_applied: u64,
    pub frames_sent: u64,
    pub frames_lost: u64,
    /// Warnings shown to the operator
    pub anomalies: u64,
    pub superseded: u64,
    pub abandoned: u64,
    pub disconnects: u64,
    pub renders: u64,
    pub forced_redraws: u64,
    pub max_clusters: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Publish failed: {0}")]
    Publish(#[from] DecodeError),

    #[error("Feed failed: {0}")]
    Feed(#[from] EnvError),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("{0}")]
    Violation(String),
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(ScenarioError::Violation(message()))
    }
}

// ============================================================================
// AUDIT SURFACE
// ============================================================================

/// What one render looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRecord {
    pub generation: u64,
    pub total: usize,
    pub on_map: usize,
    pub clusters: usize,
    pub zoom: u8,
    pub camera: &'static str,
}

/// Render surface that records everything instead of drawing.
pub struct AuditSurface {
    clock: SimContext,
    capture: bool,
    pub renders: Vec<RenderRecord>,
    /// Anomaly codes in arrival order
    pub warnings: Vec<&'static str>,
    pub statuses: Vec<ConnectionStatus>,
    pub forced_redraws: u64,
    /// Entities on screen each time the feed went down
    pub totals_at_disconnect: Vec<usize>,
    pub frames: Vec<SimFrame>,
    pending_events: Vec<SimEvent>,
}

impl AuditSurface {
    pub fn new(clock: SimContext, capture: bool) -> Self {
        Self {
            clock,
            capture,
            renders: Vec::new(),
            warnings: Vec::new(),
            statuses: Vec::new(),
            forced_redraws: 0,
            totals_at_disconnect: Vec::new(),
            frames: Vec::new(),
            pending_events: Vec::new(),
        }
    }

    pub fn warning_count(&self, kind: &str) -> usize {
        self.warnings.iter().filter(|w| **w == kind).count()
    }

    fn event(&mut self, message: String, level: &str) {
        if self.capture {
            self.pending_events.push(SimEvent {
                message,
                level: Some(level.to_string()),
            });
        }
    }
}

impl RenderSurface for AuditSurface {
    fn render(&mut self, frame: &RenderFrame) {
        self.renders.push(RenderRecord {
            generation: frame.stats.generation,
            total: frame.stats.total,
            on_map: frame.stats.on_map,
            clusters: frame.stats.clusters,
            zoom: frame.viewport.zoom,
            camera: camera_kind(&frame.camera),
        });
        if self.capture {
            let events = std::mem::take(&mut self.pending_events);
            let time_sec = self.clock.now().as_secs_f64();
            self.frames.push(SimFrame::from_render(time_sec, frame, events));
        }
    }

    fn force_redraw(&mut self) {
        self.forced_redraws += 1;
    }

    fn on_warning(&mut self, anomaly: &ProtocolAnomaly) {
        self.warnings.push(anomaly.kind());
        self.event(anomaly.to_string(), "warn");
    }

    fn on_status(&mut self, status: &ConnectionStatus) {
        if matches!(status, ConnectionStatus::Disconnected { .. }) {
            let total = self.renders.last().map_or(0, |r| r.total);
            self.totals_at_disconnect.push(total);
        }
        self.event(format!("{:?}", status), "info");
        self.statuses.push(status.clone());
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// One simulated world: fleet, publisher and the view under test.
struct Harness {
    context: Arc<SimContext>,
    oracle: FleetOracle,
    publisher: FeedPublisher,
    view: LiveView<SimContext, AuditSurface>,
    published: Vec<PublishedUpdate>,
    interval: Duration,
    page_size: usize,
    metrics: ScenarioMetrics,
}

impl Harness {
    fn new(runner: &ScenarioRunner, scenario: ScenarioId) -> Self {
        let context = SimContext::shared(runner.seed);
        let physics_seed = runner.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let oracle = FleetOracle::new(physics_seed, runner.oracle_config(scenario));
        let publisher = runner.publisher_config(scenario);
        let surface = AuditSurface::new((*context).clone(), runner.export);
        let config = LiveViewConfig::default();
        let page_size = config.page_size;
        let view = LiveView::new(Arc::clone(&context), surface, config);

        Self {
            context,
            oracle,
            publisher: FeedPublisher::new(publisher),
            view,
            published: Vec::new(),
            interval: runner.update_interval,
            page_size,
            metrics: ScenarioMetrics::default(),
        }
    }

    /// Moves the fleet one interval forward and publishes its reports.
    fn next_update(&mut self) -> Result<PublishedUpdate, ScenarioError> {
        self.oracle.step(self.interval.as_secs_f64());
        self.context.advance_time(self.interval);
        self.view.tick();

        let reports = self.oracle.reports(self.context.epoch_ms());
        let update = self.publisher.publish(&reports)?;
        self.metrics.updates_published += 1;
        self.metrics.frames_sent += update.frames.len() as u64;
        self.published.push(update.clone());
        Ok(update)
    }

    /// Feeds frames straight into the view, ticking after each one.
    fn deliver<S: AsRef<str>>(&mut self, frames: &[S]) -> Vec<FrameOutcome> {
        frames
            .iter()
            .map(|frame| {
                let outcome = self.view.handle_text(frame.as_ref());
                self.view.tick();
                outcome
            })
            .collect()
    }

    fn runtime(&self, feed: Arc<SimFeed>) -> FeedRuntime<SimContext, SimFeed> {
        let config = RuntimeConfig {
            retry_delay: Duration::from_secs(5),
            max_attempts: Some(100),
        };
        FeedRuntime::new(Arc::clone(&self.context), feed, config)
    }

    /// The current snapshot holds exactly `update`'s records.
    fn check_snapshot(&self, update: &PublishedUpdate) -> Result<(), ScenarioError> {
        let current = self.view.store().current();
        let expected = Snapshot::from_records(current.generation(), &update.records);
        ensure(current.entities() == expected.entities(), || {
            format!(
                "snapshot (gen {}, {} entities) does not match update #{} ({} records)",
                current.generation(),
                current.len(),
                update.sequence,
                update.records.len()
            )
        })
    }

    /// No render ever showed a snapshot that was not a whole published update.
    fn check_no_partial_renders(&self) -> Result<(), ScenarioError> {
        let sizes: Vec<usize> = self.published.iter().map(|u| u.records.len()).collect();
        for render in &self.view.surface().renders {
            let whole = render.generation == 0 || sizes.contains(&render.total);
            ensure(whole, || {
                format!(
                    "render of generation {} showed {} entities, no update had that many",
                    render.generation, render.total
                )
            })?;
        }
        Ok(())
    }

    /// Every change reached the surface as a whole frame.
    fn check_last_applied(&self, outcomes: &[FrameOutcome], update: &PublishedUpdate) -> Result<(), ScenarioError> {
        let Some((last, rest)) = outcomes.split_last() else {
            return Err(ScenarioError::Violation(format!(
                "update #{} produced no frames",
                update.sequence
            )));
        };
        ensure(rest.iter().all(|o| matches!(o, FrameOutcome::Pending)), || {
            format!("update #{}: an intermediate part changed the view", update.sequence)
        })?;
        ensure(
            matches!(last, FrameOutcome::Updated { entities, .. } if *entities == update.records.len()),
            || format!("update #{}: final part gave {:?}", update.sequence, last),
        )?;
        self.check_snapshot(update)
    }

    fn finish(mut self, scenario: ScenarioId, seed: u64, outcome: Result<(), ScenarioError>) -> ScenarioResult {
        let stats = self.view.reassembly_stats().clone();
        let surface = self.view.surface();
        self.metrics.updates_applied = stats.completed;
        self.metrics.superseded = stats.superseded;
        self.metrics.abandoned = stats.abandoned;
        self.metrics.anomalies = surface.warnings.len() as u64;
        self.metrics.renders = surface.renders.len() as u64;
        self.metrics.forced_redraws = surface.forced_redraws;
        self.metrics.max_clusters = self
            .metrics
            .max_clusters
            .max(surface.renders.iter().map(|r| r.clusters).max().unwrap_or(0));

        let outcome = outcome.and_then(|_| self.check_no_partial_renders());
        let failure_reason = outcome.err().map(|e| e.to_string());
        if let Some(reason) = &failure_reason {
            warn!(scenario = scenario.name(), seed, "Scenario failed: {}", reason);
        }

        let frames = std::mem::take(&mut self.view.surface_mut().frames);
        ScenarioResult {
            scenario,
            seed,
            passed: failure_reason.is_none(),
            final_time_secs: self.context.now().as_secs_f64(),
            final_entity_count: self.view.store().current().len(),
            failure_reason,
            metrics: self.metrics,
            frames,
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs feed scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Fleet size (at least 8)
    vehicles: usize,

    /// Records per part for the batched scenarios
    batch_size: usize,

    /// Updates published per scenario
    updates: usize,

    /// Virtual time between updates
    update_interval: Duration,

    /// Capture rendered frames for export
    export: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, vehicles: usize) -> Self {
        Self {
            seed,
            vehicles: vehicles.max(8),
            batch_size: 100,
            updates: 5,
            update_interval: Duration::from_secs(15),
            export: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_updates(mut self, updates: usize) -> Self {
        self.updates = updates.max(1);
        self
    }

    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Runs a scenario on a private single-threaded runtime.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime.block_on(self.run_async(scenario)),
            Err(e) => {
                let harness = Harness::new(self, scenario);
                harness.finish(scenario, self.seed, Err(ScenarioError::Setup(e.to_string())))
            }
        }
    }

    /// Runs a scenario on the caller's runtime.
    pub async fn run_async(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        let mut harness = Harness::new(self, scenario);

        let outcome = match scenario {
            ScenarioId::Steady => self.run_steady(&mut harness),
            ScenarioId::BatchLoss => self.run_batch_loss(&mut harness).await,
            ScenarioId::Supersede => self.run_supersede(&mut harness),
            ScenarioId::Reconnect => self.run_reconnect(&mut harness).await,
            ScenarioId::Legacy => self.run_legacy(&mut harness),
            ScenarioId::Malformed => self.run_malformed(&mut harness),
            ScenarioId::ZoomSweep => self.run_zoom_sweep(&mut harness),
        };

        harness.finish(scenario, self.seed, outcome)
    }

    fn oracle_config(&self, scenario: ScenarioId) -> OracleConfig {
        let base = OracleConfig {
            vehicles: self.vehicles,
            ..OracleConfig::default()
        };
        match scenario {
            // The feed's everyday defects
            ScenarioId::Steady => OracleConfig {
                missing_position_rate: 0.05,
                missing_id_rate: 0.02,
                stale_duplicate_rate: 0.1,
                ..base
            },
            _ => base,
        }
    }

    fn publisher_config(&self, scenario: ScenarioId) -> PublisherConfig {
        // At least four parts per update
        let quarter = (self.vehicles / 4).max(1);
        match scenario {
            ScenarioId::Steady => PublisherConfig {
                batch_size: self.batch_size,
                mode: PublishMode::Batched,
                style: RecordStyle::Upstream,
            },
            ScenarioId::Legacy => PublisherConfig {
                mode: PublishMode::Legacy,
                ..PublisherConfig::default()
            },
            ScenarioId::Supersede | ScenarioId::Reconnect | ScenarioId::Malformed => PublisherConfig {
                batch_size: quarter,
                ..PublisherConfig::default()
            },
            ScenarioId::BatchLoss | ScenarioId::ZoomSweep => PublisherConfig {
                batch_size: self.batch_size,
                ..PublisherConfig::default()
            },
        }
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// FV-001: clean updates plus the operator's everyday actions.
    fn run_steady(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        for _ in 0..self.updates {
            let update = h.next_update()?;
            let outcomes = h.deliver(&update.frames);
            h.check_last_applied(&outcomes, &update)?;
        }
        ensure(h.view.surface().warnings.is_empty(), || {
            format!("clean feed raised warnings: {:?}", h.view.surface().warnings)
        })?;

        // Defective records stay listed but never reach the map
        let stats = h.view.store_stats();
        let last = h.published.last().map_or(0, |u| u.records.len() - u.ids().len());
        ensure(stats.unidentified == last && stats.duplicates_merged == 0, || {
            format!(
                "unidentified {} (published {}), merged {}",
                stats.unidentified, last, stats.duplicates_merged
            )
        })?;
        let mappable = h.view.visible().mappable_count();
        ensure(h.view.cluster_tree().member_count == mappable, || {
            format!("{} on map, {} mappable", h.view.cluster_tree().member_count, mappable)
        })?;

        let first_camera = h.view.surface().renders.first().map(|r| r.camera);
        ensure(first_camera == Some("fit"), || {
            format!("first population should fit the camera, got {:?}", first_camera)
        })?;

        // Filter by one line
        let line = h
            .oracle
            .line_labels()
            .into_iter()
            .next()
            .ok_or_else(|| ScenarioError::Setup("fleet has no lines".to_string()))?;
        h.view.search(&line.to_uppercase(), "");
        let visible = h.view.visible();
        ensure(!visible.is_empty(), || format!("line {} matched nothing", line))?;
        ensure(
            visible.iter().all(|e| e.line.as_deref().is_some_and(|l| l.contains(&line))),
            || format!("filter on line {} let other lines through", line),
        )?;
        ensure(h.view.view_mode() == ViewMode::Filtered, || "search left all mode on".to_string())?;

        let page_size = h.page_size;
        let (page, rows) = h.view.page_rows();
        ensure(rows.len() <= page_size && page.number == 1, || {
            format!("page {} has {} rows", page.number, rows.len())
        })?;

        h.view.clear_filters();
        ensure(
            h.view.visible().len() == h.view.store().current().len(),
            || "clearing filters did not restore every entity".to_string(),
        )?;

        // The debounced forced redraw fires once the delay elapsed
        h.context.advance_time(Duration::from_millis(150));
        ensure(h.view.tick().redrawn, || "forced redraw never fired".to_string())
    }

    /// FV-002: frame loss over the real runtime loop.
    async fn run_batch_loss(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        let mut script = Vec::new();
        for _ in 0..self.updates {
            let update = h.next_update()?;
            script.extend(update.frames.into_iter().map(FeedEvent::Frame));
        }

        let feed = Arc::new(SimFeed::new(Arc::clone(&h.context), self.seed ^ LOSS_SALT, script));
        feed.controller().set_loss_rate(0.2);
        let summary = h.runtime(Arc::clone(&feed)).run(&mut h.view).await?;
        let stats = feed.stats().await;
        h.metrics.frames_lost = stats.lost;
        h.metrics.disconnects = summary.disconnects;
        debug!(?summary, ?stats, "Batch loss run finished");

        let completed = h.view.reassembly_stats().completed;
        ensure(summary.updates == completed, || {
            format!("{} updates rendered but {} completed", summary.updates, completed)
        })?;
        ensure(completed <= self.updates as u64, || {
            format!("{} updates completed out of {} published", completed, self.updates)
        })?;
        if stats.lost == 0 {
            ensure(completed == self.updates as u64, || {
                "lossless run dropped an update".to_string()
            })?;
        }

        if completed > 0 {
            let current = h.view.store().current();
            let matches_some = h.published.iter().any(|u| {
                Snapshot::from_records(current.generation(), &u.records).entities() == current.entities()
            });
            ensure(matches_some, || "final snapshot is not a published update".to_string())?;
        }
        Ok(())
    }

    /// FV-003: a truncated update is superseded by the next part 1, and its
    /// straggling last part is dropped without disturbing the new update.
    fn run_supersede(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        let first = h.next_update()?;
        ensure(first.frames.len() >= 2, || "update has a single part".to_string())?;

        let cut = first.frames.len() - 1;
        let outcomes = h.deliver(&first.frames[..cut]);
        ensure(outcomes.iter().all(|o| matches!(o, FrameOutcome::Pending)), || {
            "truncated update changed the view".to_string()
        })?;
        ensure(h.view.surface().renders.is_empty(), || {
            "something rendered before any update completed".to_string()
        })?;

        // Different part count so the straggler is told apart by its total
        h.publisher.set_batch_size((self.vehicles / 2).max(1));
        let second = h.next_update()?;
        ensure(second.frames.len() >= 2 && second.frames.len() != first.frames.len(), || {
            format!(
                "updates split into {} and {} parts",
                first.frames.len(),
                second.frames.len()
            )
        })?;

        let mut outcomes = h.deliver(&second.frames[..1]);
        let late = h.deliver(&first.frames[cut..]);
        ensure(
            matches!(late.as_slice(), [FrameOutcome::Dropped(anomaly)] if anomaly.kind() == "stale-part"),
            || format!("late part of the superseded update gave {:?}", late),
        )?;
        outcomes.extend(h.deliver(&second.frames[1..]));
        h.check_last_applied(&outcomes, &second)?;

        let warnings = &h.view.surface().warnings;
        ensure(warnings.as_slice() == ["stale-part"], || format!("warnings {:?}", warnings))?;
        let stats = h.view.reassembly_stats();
        ensure(stats.superseded == 1, || format!("superseded {} times", stats.superseded))?;
        ensure(h.view.store().current().generation() == 1, || {
            "truncated update was applied".to_string()
        })
    }

    /// FV-004: disconnect mid-update, two refusals, then recovery.
    async fn run_reconnect(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        let u1 = h.next_update()?;
        let u2 = h.next_update()?;
        let u3 = h.next_update()?;
        ensure(u2.frames.len() >= 2, || "update has a single part".to_string())?;

        let mut script: Vec<FeedEvent> = u1.frames.iter().cloned().map(FeedEvent::Frame).collect();
        script.push(FeedEvent::Frame(u2.frames[0].clone()));
        script.push(FeedEvent::Disconnect { refuse_next: 2 });
        script.extend(u2.frames[1..].iter().cloned().map(FeedEvent::Frame));
        script.extend(u3.frames.iter().cloned().map(FeedEvent::Frame));

        let feed = Arc::new(SimFeed::new(Arc::clone(&h.context), self.seed ^ LOSS_SALT, script));
        let before = h.context.now();
        let summary = h.runtime(Arc::clone(&feed)).run(&mut h.view).await?;
        h.metrics.disconnects = summary.disconnects;

        ensure(summary.connection_attempts == 4 && summary.connections == 2, || {
            format!(
                "expected 4 attempts / 2 connections, got {} / {}",
                summary.connection_attempts, summary.connections
            )
        })?;
        ensure(summary.disconnects == 1, || format!("{} disconnects", summary.disconnects))?;

        // Three retry sleeps: after the drop and after each refusal
        let slept = h.context.now() - before;
        ensure(slept == Duration::from_secs(15), || format!("slept {:?}", slept))?;

        let surface = h.view.surface();
        ensure(surface.totals_at_disconnect == vec![u1.records.len()], || {
            format!(
                "snapshot on screen while disconnected: {:?}",
                surface.totals_at_disconnect
            )
        })?;
        ensure(
            surface.warning_count("orphan-part") == u2.frames.len() - 1,
            || format!("orphan warnings: {:?}", surface.warnings),
        )?;
        ensure(
            surface
                .statuses
                .iter()
                .any(|s| matches!(s, ConnectionStatus::Error { .. })),
            || "refusals were not reported".to_string(),
        )?;

        let stats = h.view.reassembly_stats();
        ensure(stats.resets == 2 && stats.abandoned == 1, || {
            format!("resets {} abandoned {}", stats.resets, stats.abandoned)
        })?;
        ensure(h.view.store().current().generation() == 2, || {
            format!("generation {}", h.view.store().current().generation())
        })?;
        h.check_snapshot(&u3)
    }

    /// FV-005: bare arrays complete in one message.
    fn run_legacy(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        for _ in 0..self.updates {
            let update = h.next_update()?;
            ensure(update.frames.len() == 1, || "legacy update split into parts".to_string())?;
            let outcomes = h.deliver(&update.frames);
            h.check_last_applied(&outcomes, &update)?;
        }
        let stats = h.view.reassembly_stats();
        ensure(stats.legacy == self.updates as u64, || {
            format!("{} legacy updates completed", stats.legacy)
        })
    }

    /// FV-006: garbage and a stale duplicate inside every update.
    fn run_malformed(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        let mut expected: Vec<&'static str> = Vec::new();

        for i in 0..self.updates {
            let update = h.next_update()?;
            ensure(update.frames.len() >= 4, || "update has fewer than four parts".to_string())?;
            let (garbage, kind) = GARBAGE[i % GARBAGE.len()];

            let f = &update.frames;
            let mut sequence: Vec<&str> = vec![f[0].as_str(), garbage, f[1].as_str(), f[2].as_str(), f[1].as_str()];
            sequence.extend(f[3..].iter().map(String::as_str));
            expected.push(kind);
            expected.push("stale-part");

            let outcomes = h.deliver(&sequence);
            let last = outcomes.last();
            ensure(
                matches!(last, Some(FrameOutcome::Updated { entities, .. }) if *entities == update.records.len()),
                || format!("update #{} did not survive the garbage: {:?}", update.sequence, last),
            )?;
            h.check_snapshot(&update)?;
        }

        let warnings = &h.view.surface().warnings;
        ensure(*warnings == expected, || {
            format!("warnings {:?}, expected {:?}", warnings, expected)
        })
    }

    /// FV-007: regroup at every zoom level.
    fn run_zoom_sweep(&self, h: &mut Harness) -> Result<(), ScenarioError> {
        let update = h.next_update()?;
        let outcomes = h.deliver(&update.frames);
        h.check_last_applied(&outcomes, &update)?;

        for zoom in 0..=18u8 {
            h.view.begin_interaction();
            let center = h.view.viewport().center;
            h.view.end_interaction(center, zoom);

            let tree = h.view.cluster_tree();
            let mappable = h.view.visible().mappable_count();
            ensure(tree.zoom == zoom, || format!("tree built at {} for zoom {}", tree.zoom, zoom))?;
            ensure(tree.member_count == mappable, || {
                format!("zoom {}: {} of {} members mapped", zoom, tree.member_count, mappable)
            })?;
            let partitioned: usize = tree.partition().iter().map(Vec::len).sum();
            ensure(partitioned == mappable, || {
                format!("zoom {}: partition covers {} of {}", zoom, partitioned, mappable)
            })?;
            if !ClusterPolicy::for_zoom(zoom).clusters_at(zoom) {
                ensure(tree.cluster_count() == 0, || {
                    format!("zoom {}: clusters past the disable threshold", zoom)
                })?;
            }
            for (node, cluster) in tree.clusters() {
                let summary = h
                    .view
                    .cluster_summary(node)
                    .ok_or_else(|| ScenarioError::Violation(format!("no summary for node {}", node)))?;
                ensure(summary.total == cluster.len() && summary.members.len() <= 20, || {
                    format!("zoom {}: bad summary for node {}", zoom, node)
                })?;
            }
            h.metrics.max_clusters = h.metrics.max_clusters.max(tree.cluster_count());
        }
        ensure(h.metrics.max_clusters > 0, || "no zoom level produced a cluster".to_string())?;

        h.view.end_interaction(h.view.viewport().center, 10);
        h.view.set_clustering_enabled(false);
        let tree = h.view.cluster_tree();
        ensure(
            tree.cluster_count() == 0 && tree.individual_points().count() == tree.member_count,
            || "disabled clustering still grouped points".to_string(),
        )?;

        h.view.set_view_mode(ViewMode::All);
        let label = h.view.map_label();
        ensure(label.ends_with("vehicles on map (all)"), || format!("label {:?}", label))
    }
}
