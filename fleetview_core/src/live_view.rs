//! Live View - wires the components into one message-driven pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          LiveView                                │
//! │                                                                  │
//! │  frame ─▶ WireMessage ─▶ BatchReassembler ──(complete)──┐        │
//! │                               │ anomaly                 ▼        │
//! │                               ▼                   EntityStore    │
//! │                        surface.on_warning              │         │
//! │                                                  FilterEngine    │
//! │                                                        │         │
//! │                                   ViewportController ◀─┤         │
//! │                                          │       ClusterEngine   │
//! │                                          ▼             ▼         │
//! │                              surface.render(RenderFrame)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each frame is fully processed before the next one; the pipeline is single
//! threaded and owns all of its state.

use crate::address::{AddressResult, AddressSearch, SearchAction};
use crate::cluster::{ClusterBadge, ClusterEngine, ClusterSummary, ClusterTree, Leaf};
use crate::config::LiveViewConfig;
use crate::entity::{EntityRow, Position};
use crate::filter::{FilterEngine, FilterSpec, Page, Pagination, SortColumn, SortSpec};
use crate::projection::LatLngBounds;
use crate::reassembly::{BatchReassembler, ProtocolAnomaly, ReassemblyOutcome, ReassemblyStats};
use crate::store::{EntityStore, StoreStats, VisibleSet};
use crate::viewport::{CameraAction, ViewportController, ViewportState};
use crate::wire::WireMessage;
use fleetview_env::{ConnectionId, FeedFrame, FleetViewContext};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

// ============================================================================
// RENDER BOUNDARY
// ============================================================================

/// Drawing data for one cluster badge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMarker {
    /// Node index in the current tree, for [`LiveView::cluster_summary`]
    pub node: usize,
    pub count: usize,
    pub centroid: Position,
    pub bounds: LatLngBounds,
    pub badge: ClusterBadge,
}

/// Counters shown next to the map and listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewStats {
    pub generation: u64,
    pub total: usize,
    pub visible: usize,
    pub on_map: usize,
    pub clusters: usize,
    pub view_mode: ViewMode,
    /// Milliseconds since the epoch of the last applied update
    pub last_update_ms: Option<u64>,
}

/// Everything the render surface needs for one redraw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub clusters: Vec<ClusterMarker>,
    pub individual_points: Vec<Leaf>,
    pub camera: CameraAction,
    pub viewport: ViewportState,
    pub address_marker: Option<AddressResult>,
    pub stats: ViewStats,
    pub map_label: String,
}

/// Feed connection state as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected { connection: ConnectionId },
    Disconnected { retry_in_ms: u64 },
    Error { message: String },
}

/// The drawing side of the live view. The core never draws anything itself.
pub trait RenderSurface: Send {
    /// Replaces whatever is drawn with `frame`.
    fn render(&mut self, frame: &RenderFrame);

    /// Debounced forced redraw after a rebuild settled.
    fn force_redraw(&mut self) {}

    fn on_warning(&mut self, _anomaly: &ProtocolAnomaly) {}

    fn on_status(&mut self, _status: &ConnectionStatus) {}

    /// Suggestions of a settled address query; empty clears the list.
    fn on_address_suggestions(&mut self, _results: &[AddressResult]) {}
}

// ============================================================================
// VIEW STATE
// ============================================================================

/// Which entities the map shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// The filtered visible set (default)
    Filtered,
    /// Every entity of the snapshot, regardless of filters
    All,
}

/// Result of handling one feed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// A new snapshot was installed
    Updated { generation: u64, entities: usize },
    /// Part buffered, nothing visible changed
    Pending,
    /// Frame dropped as a protocol anomaly
    Dropped(ProtocolAnomaly),
}

/// Operator action queued for a view owned by a running feed loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    Search { lines: String, ids: String },
    ClearFilters,
    ToggleSort(SortColumn),
    SetViewMode(ViewMode),
    SetClustering(bool),
    SetMapVisible(bool),
    BeginInteraction,
    EndInteraction { center: Position, zoom: u8 },
    NextPage,
    PreviousPage,
    AddressInput(String),
    PlaceAddress(AddressResult),
}

/// Work fired by [`LiveView::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub redrawn: bool,
    pub search: Option<SearchAction>,
}

// ============================================================================
// LIVE VIEW
// ============================================================================

/// The live, filterable, clustered view of the vehicle feed.
///
/// Generic over the environment context (clock) and the render surface, so
/// the same pipeline runs against tokio or a simulated clock.
pub struct LiveView<Ctx, R>
where
    Ctx: FleetViewContext,
    R: RenderSurface,
{
    context: Arc<Ctx>,
    surface: R,
    config: LiveViewConfig,

    reassembler: BatchReassembler,
    store: EntityStore,
    filter: FilterEngine,
    clusters: ClusterEngine,
    viewport: ViewportController,
    pagination: Pagination,
    address: AddressSearch,

    tree: ClusterTree,
    view_mode: ViewMode,
    map_visible: bool,
    address_marker: Option<AddressResult>,
    status: ConnectionStatus,
    last_update: Option<SystemTime>,
    frames_rendered: u64,
}

impl<Ctx, R> LiveView<Ctx, R>
where
    Ctx: FleetViewContext,
    R: RenderSurface,
{
    pub fn new(context: Arc<Ctx>, surface: R, config: LiveViewConfig) -> Self {
        let viewport = ViewportController::new(config.viewport.clone());
        let clusters = ClusterEngine::new(config.cluster.clone());
        let address = AddressSearch::new(config.address.clone());
        let pagination = Pagination::new(config.page_size);
        let tree = ClusterTree::empty(viewport.zoom());

        Self {
            context,
            surface,
            config,
            reassembler: BatchReassembler::new(),
            store: EntityStore::new(),
            filter: FilterEngine::new(),
            clusters,
            viewport,
            pagination,
            address,
            tree,
            view_mode: ViewMode::Filtered,
            map_visible: true,
            address_marker: None,
            status: ConnectionStatus::Connecting,
            last_update: None,
            frames_rendered: 0,
        }
    }

    pub fn with_defaults(context: Arc<Ctx>, surface: R) -> Self {
        Self::new(context, surface, LiveViewConfig::default())
    }

    // ========================================================================
    // FEED INPUT
    // ========================================================================

    /// Processes one received frame end to end.
    pub fn handle_frame(&mut self, frame: &FeedFrame) -> FrameOutcome {
        self.handle_text(&frame.payload)
    }

    /// Processes one text message end to end.
    pub fn handle_text(&mut self, text: &str) -> FrameOutcome {
        let message = match WireMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                let anomaly = ProtocolAnomaly::UnrecognizedMessage {
                    shape: "invalid-json".to_string(),
                };
                self.surface.on_warning(&anomaly);
                return FrameOutcome::Dropped(anomaly);
            }
        };
        self.handle_message(message)
    }

    /// Processes one already-classified message.
    pub fn handle_message(&mut self, message: WireMessage) -> FrameOutcome {
        match self.reassembler.submit(message) {
            ReassemblyOutcome::Completed(update) => {
                let snapshot = self.store.apply_update(&update);
                self.last_update = Some(self.context.system_time());
                self.refresh_visible();
                self.rebuild_map(None);
                FrameOutcome::Updated {
                    generation: snapshot.generation(),
                    entities: snapshot.len(),
                }
            }
            ReassemblyOutcome::Accepted { .. } => FrameOutcome::Pending,
            ReassemblyOutcome::Rejected(anomaly) => {
                self.surface.on_warning(&anomaly);
                FrameOutcome::Dropped(anomaly)
            }
        }
    }

    /// A connection opened: any half-received update is discarded.
    pub fn on_connected(&mut self, connection: ConnectionId) {
        info!(%connection, "Feed connected");
        self.reassembler.reset();
        self.set_status(ConnectionStatus::Connected { connection });
    }

    /// The connection dropped; the last snapshot stays on screen.
    pub fn on_disconnected(&mut self, retry_in: Duration) {
        let retry_in_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX);
        info!(retry_in_ms, "Feed disconnected");
        self.set_status(ConnectionStatus::Disconnected { retry_in_ms });
    }

    pub fn on_connection_error(&mut self, message: &str) {
        warn!(message, "Feed connection error");
        self.set_status(ConnectionStatus::Error {
            message: message.to_string(),
        });
    }

    pub fn on_connecting(&mut self) {
        self.set_status(ConnectionStatus::Connecting);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.surface.on_status(&status);
        self.status = status;
    }

    // ========================================================================
    // OPERATOR INPUT
    // ========================================================================

    /// Applies a queued operator action.
    pub fn apply(&mut self, command: ViewCommand) {
        debug!(?command, "Operator command");
        match command {
            ViewCommand::Search { lines, ids } => self.search(&lines, &ids),
            ViewCommand::ClearFilters => self.clear_filters(),
            ViewCommand::ToggleSort(column) => {
                self.toggle_sort(column);
            }
            ViewCommand::SetViewMode(mode) => self.set_view_mode(mode),
            ViewCommand::SetClustering(enabled) => self.set_clustering_enabled(enabled),
            ViewCommand::SetMapVisible(visible) => self.set_map_visible(visible),
            ViewCommand::BeginInteraction => self.begin_interaction(),
            ViewCommand::EndInteraction { center, zoom } => self.end_interaction(center, zoom),
            ViewCommand::NextPage => {
                self.next_page();
            }
            ViewCommand::PreviousPage => {
                self.previous_page();
            }
            ViewCommand::AddressInput(query) => self.address_input(&query),
            ViewCommand::PlaceAddress(result) => self.place_address_marker(result),
        }
    }

    /// Applies new search input; switches the map back to the filtered view.
    pub fn search(&mut self, line_input: &str, id_input: &str) {
        self.set_filter(FilterSpec::parse(line_input, id_input));
    }

    pub fn set_filter(&mut self, spec: FilterSpec) {
        debug!(lines = ?spec.lines, ids = ?spec.ids, "Filter changed");
        self.filter.set_filter(spec);
        self.pagination.reset();
        self.view_mode = ViewMode::Filtered;
        self.refresh_visible();
        self.rebuild_map(None);
    }

    /// Clears every filter and the address marker.
    pub fn clear_filters(&mut self) {
        self.address_marker = None;
        self.address.cancel();
        self.set_filter(FilterSpec::default());
    }

    /// Sorts by `column`, flipping direction on repeat; resets to page 1.
    pub fn toggle_sort(&mut self, column: SortColumn) -> SortSpec {
        let spec = self.filter.toggle_sort(column);
        self.pagination.reset();
        self.refresh_visible();
        if self.view_mode == ViewMode::Filtered {
            self.rebuild_map(None);
        }
        spec
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if self.view_mode != mode {
            self.view_mode = mode;
            self.rebuild_map(None);
        }
    }

    pub fn set_clustering_enabled(&mut self, enabled: bool) {
        if self.clusters.is_enabled() != enabled {
            self.clusters.set_enabled(enabled);
            self.rebuild_map(None);
        }
    }

    /// Hidden maps are not rebuilt; showing one restores the saved view.
    pub fn set_map_visible(&mut self, visible: bool) {
        let was_visible = self.map_visible;
        self.map_visible = visible;
        if visible && !was_visible {
            let camera = self
                .viewport
                .restore_view()
                .map(|view| CameraAction::Move {
                    center: view.center,
                    zoom: view.zoom,
                });
            self.rebuild_map(camera);
        }
    }

    pub fn begin_interaction(&mut self) {
        self.viewport.begin_interaction();
    }

    /// The operator finished a pan/zoom; regroups at the new zoom.
    pub fn end_interaction(&mut self, center: Position, zoom: u8) {
        let previous = self.viewport.zoom();
        self.viewport.end_interaction(center, zoom);
        if self.viewport.zoom() != previous {
            self.rebuild_map(Some(CameraAction::Preserve));
        }
    }

    pub fn next_page(&mut self) -> Page {
        self.pagination.next(self.store.visible().len())
    }

    pub fn previous_page(&mut self) -> Page {
        self.pagination.previous(self.store.visible().len())
    }

    /// Rows of the current listing page, with placeholders for gaps.
    pub fn page_rows(&mut self) -> (Page, Vec<EntityRow>) {
        let visible = self.store.visible();
        let page = self.pagination.window(visible.len());
        let rows = page
            .range
            .clone()
            .filter_map(|i| visible.get(i))
            .map(|e| e.table_row())
            .collect();
        (page, rows)
    }

    // ========================================================================
    // ADDRESS SEARCH
    // ========================================================================

    /// Records address input; the lookup fires from [`Self::tick`].
    pub fn address_input(&mut self, query: &str) {
        self.address.input(query, self.context.now());
    }

    pub fn address_search(&self) -> &AddressSearch {
        &self.address
    }

    /// Hands lookup results (or an empty list to clear) to the surface.
    pub fn show_address_suggestions(&mut self, results: &[AddressResult]) {
        self.surface.on_address_suggestions(results);
    }

    /// Drops a one-off marker at `result`, outside the clustering.
    pub fn place_address_marker(&mut self, result: AddressResult) {
        let Some(position) = result.position() else {
            warn!(label = %result.label, "Ignoring address with invalid coordinates");
            return;
        };
        let zoom = self.config.address.placement_zoom;
        self.viewport.set_view(position, zoom);
        self.viewport.save_view();
        self.address_marker = Some(result);
        self.rebuild_map(Some(CameraAction::Move {
            center: position,
            zoom,
        }));
    }

    pub fn address_marker(&self) -> Option<&AddressResult> {
        self.address_marker.as_ref()
    }

    // ========================================================================
    // TIMERS
    // ========================================================================

    /// Earliest pending debounce deadline on the context clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.viewport.redraw_deadline(), self.address.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fires due debounce timers against the context clock.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.context.now();
        let redrawn = self.viewport.poll_redraw(now);
        if redrawn {
            self.surface.force_redraw();
        }
        TickOutcome {
            redrawn,
            search: self.address.poll(now),
        }
    }

    // ========================================================================
    // PIPELINE
    // ========================================================================

    fn refresh_visible(&mut self) {
        let visible = self.filter.recompute(self.store.current());
        self.store.set_visible(visible);
        self.pagination.window(self.store.visible().len());
    }

    fn map_set(&self) -> VisibleSet {
        match self.view_mode {
            ViewMode::Filtered => self.store.visible().clone(),
            ViewMode::All => VisibleSet::all(Arc::clone(self.store.current())),
        }
    }

    /// Reclusters and redraws. `camera` overrides the fit/preserve decision.
    fn rebuild_map(&mut self, camera: Option<CameraAction>) {
        if !self.map_visible {
            debug!("Map hidden, skipping rebuild");
            return;
        }

        let set = self.map_set();
        let camera = match camera {
            Some(camera) => camera,
            None => self
                .viewport
                .on_visible_set_changed(set.bounds().map(LatLngBounds::from_rect), set.mappable_count()),
        };
        self.tree = self.clusters.recluster(&set, self.viewport.zoom());
        self.viewport.save_view();
        self.viewport.schedule_redraw(self.context.now());

        let frame = self.render_frame(camera);
        self.surface.render(&frame);
        self.frames_rendered += 1;
    }

    fn render_frame(&self, camera: CameraAction) -> RenderFrame {
        let clusters = self
            .tree
            .clusters()
            .map(|(node, c)| ClusterMarker {
                node,
                count: c.len(),
                centroid: c.centroid,
                bounds: c.bounds,
                badge: c.badge,
            })
            .collect();

        RenderFrame {
            clusters,
            individual_points: self.tree.individual_points().cloned().collect(),
            camera,
            viewport: *self.viewport.state(),
            address_marker: self.address_marker.clone(),
            stats: self.view_stats(),
            map_label: self.map_label(),
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn cluster_summary(&self, node: usize) -> Option<ClusterSummary> {
        self.tree.summary(node, self.clusters.config().summary_limit)
    }

    pub fn cluster_tree(&self) -> &ClusterTree {
        &self.tree
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn visible(&self) -> &VisibleSet {
        self.store.visible()
    }

    /// Line labels for the external itinerary overlay.
    pub fn distinct_visible_lines(&self) -> Vec<String> {
        self.store.distinct_visible_lines()
    }

    pub fn viewport(&self) -> &ViewportState {
        self.viewport.state()
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn last_update(&self) -> Option<SystemTime> {
        self.last_update
    }

    pub fn reassembly_stats(&self) -> &ReassemblyStats {
        self.reassembler.stats()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn view_stats(&self) -> ViewStats {
        ViewStats {
            generation: self.store.current().generation(),
            total: self.store.current().len(),
            visible: self.store.visible().len(),
            on_map: self.tree.member_count,
            clusters: self.tree.cluster_count(),
            view_mode: self.view_mode,
            last_update_ms: self
                .last_update
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64),
        }
    }

    /// "N vehicles on map", or "N of M vehicles on map (all)" in all mode.
    pub fn map_label(&self) -> String {
        let on_map = self.tree.member_count;
        match self.view_mode {
            ViewMode::Filtered => format!("{} vehicles on map", on_map),
            ViewMode::All => format!(
                "{} of {} vehicles on map (all)",
                on_map,
                self.store.current().len()
            ),
        }
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut R {
        &mut self.surface
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_env::TokioContext;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSurface {
        frames: Vec<RenderFrame>,
        warnings: Vec<String>,
        statuses: Vec<ConnectionStatus>,
        redraws: usize,
    }

    impl RenderSurface for RecordingSurface {
        fn render(&mut self, frame: &RenderFrame) {
            self.frames.push(frame.clone());
        }

        fn force_redraw(&mut self) {
            self.redraws += 1;
        }

        fn on_warning(&mut self, anomaly: &ProtocolAnomaly) {
            self.warnings.push(anomaly.kind().to_string());
        }

        fn on_status(&mut self, status: &ConnectionStatus) {
            self.statuses.push(status.clone());
        }
    }

    fn view() -> LiveView<TokioContext, RecordingSurface> {
        LiveView::with_defaults(TokioContext::shared(), RecordingSurface::default())
    }

    fn bus(id: &str, line: &str, lat: f64, lon: f64) -> serde_json::Value {
        json!({
            "ordem": id,
            "linha": line,
            "latitude": lat,
            "longitude": lon,
            "velocidade": 20,
            "datahoraservidor": "2024-03-01T10:00:00"
        })
    }

    fn three_buses() -> String {
        json!([
            bus("A1", "101", -22.90, -43.20),
            bus("A2", "232", -22.95, -43.25),
            bus("A3", "101", -22.91, -43.21)
        ])
        .to_string()
    }

    #[test]
    fn test_legacy_update_renders_frame() {
        let mut lv = view();
        let outcome = lv.handle_text(&three_buses());

        assert_eq!(outcome, FrameOutcome::Updated { generation: 1, entities: 3 });
        let frame = lv.surface().frames.last().unwrap();
        assert!(matches!(frame.camera, CameraAction::Fit { .. }));
        assert_eq!(frame.stats.on_map, 3);
        assert_eq!(frame.map_label, "3 vehicles on map");
        assert!(lv.last_update().is_some());
    }

    #[test]
    fn test_batched_update_renders_only_when_complete() {
        let mut lv = view();
        let p1 = json!({"batch": [bus("A1", "101", -22.9, -43.2)], "batchNumber": 1, "totalBatches": 2});
        let p2 = json!({"batch": [bus("A2", "101", -22.9, -43.2)], "batchNumber": 2, "totalBatches": 2});

        assert_eq!(lv.handle_text(&p1.to_string()), FrameOutcome::Pending);
        assert!(lv.surface().frames.is_empty());
        assert!(matches!(lv.handle_text(&p2.to_string()), FrameOutcome::Updated { entities: 2, .. }));
        assert_eq!(lv.surface().frames.len(), 1);
    }

    #[test]
    fn test_anomalies_keep_snapshot_and_warn() {
        let mut lv = view();
        lv.handle_text(&three_buses());

        let orphan = json!({"batch": [], "batchNumber": 3, "totalBatches": 4});
        assert!(matches!(lv.handle_text(&orphan.to_string()), FrameOutcome::Dropped(_)));
        assert!(matches!(lv.handle_text("not json"), FrameOutcome::Dropped(_)));
        assert!(matches!(lv.handle_text(r#"{"type":"ping"}"#), FrameOutcome::Dropped(_)));

        assert_eq!(
            lv.surface().warnings,
            vec!["orphan-part", "unrecognized-message", "unrecognized-message"]
        );
        assert_eq!(lv.store().current().len(), 3);
        assert_eq!(lv.surface().frames.len(), 1);
    }

    #[test]
    fn test_filter_restricts_listing_and_map() {
        let mut lv = view();
        lv.handle_text(&three_buses());
        lv.search("101", "");

        assert_eq!(lv.visible().len(), 2);
        assert_eq!(lv.distinct_visible_lines(), vec!["101"]);
        assert_eq!(lv.cluster_tree().member_count, 2);

        lv.set_view_mode(ViewMode::All);
        assert_eq!(lv.cluster_tree().member_count, 3);
        assert_eq!(lv.map_label(), "3 of 3 vehicles on map (all)");
        // Table keeps the filtered view
        assert_eq!(lv.visible().len(), 2);

        // A new search switches back to the filtered map
        lv.search("232", "");
        assert_eq!(lv.view_mode(), ViewMode::Filtered);
        assert_eq!(lv.cluster_tree().member_count, 1);
    }

    #[test]
    fn test_unpositioned_entity_listed_not_mapped() {
        let mut lv = view();
        let text = json!([
            bus("A1", "101", -22.90, -43.20),
            {"ordem": "LOST", "linha": "101", "longitude": -43.2}
        ])
        .to_string();
        lv.handle_text(&text);

        assert_eq!(lv.visible().len(), 2);
        assert_eq!(lv.cluster_tree().member_count, 1);

        let (page, rows) = lv.page_rows();
        assert_eq!(page.number, 1);
        assert_eq!(rows[1].id, "LOST");
        assert_eq!(rows[1].latitude, "N/A");
    }

    #[test]
    fn test_reconnect_resets_reassembly_keeps_snapshot() {
        let mut lv = view();
        lv.handle_text(&three_buses());

        let p1 = json!({"batch": [bus("Z", "1", 0.0, 0.0)], "batchNumber": 1, "totalBatches": 2});
        lv.handle_text(&p1.to_string());
        lv.on_disconnected(Duration::from_secs(5));
        lv.on_connected(ConnectionId::from_seed(1));

        let p2 = json!({"batch": [], "batchNumber": 2, "totalBatches": 2});
        assert!(matches!(lv.handle_text(&p2.to_string()), FrameOutcome::Dropped(_)));
        assert_eq!(lv.store().current().len(), 3);
        assert!(matches!(lv.status(), ConnectionStatus::Connected { .. }));
        assert_eq!(lv.surface().statuses.len(), 2);
    }

    #[test]
    fn test_retry_countdown_saturates() {
        let mut lv = view();
        lv.on_disconnected(Duration::from_millis(5_250));
        assert_eq!(lv.status(), &ConnectionStatus::Disconnected { retry_in_ms: 5_250 });

        lv.on_disconnected(Duration::MAX);
        assert_eq!(lv.status(), &ConnectionStatus::Disconnected { retry_in_ms: u64::MAX });
    }

    #[test]
    fn test_commands_dispatch_to_view() {
        let mut lv = view();
        lv.handle_text(&three_buses());

        lv.apply(ViewCommand::Search {
            lines: "101".to_string(),
            ids: String::new(),
        });
        assert_eq!(lv.visible().len(), 2);

        lv.apply(ViewCommand::ClearFilters);
        assert_eq!(lv.visible().len(), 3);

        lv.apply(ViewCommand::SetMapVisible(false));
        let rendered = lv.surface().frames.len();
        lv.apply(ViewCommand::SetViewMode(ViewMode::All));
        assert_eq!(lv.surface().frames.len(), rendered);
        assert_eq!(lv.view_mode(), ViewMode::All);
    }

    #[test]
    fn test_hidden_map_skips_rebuild() {
        let mut lv = view();
        lv.set_map_visible(false);
        lv.handle_text(&three_buses());
        assert!(lv.surface().frames.is_empty());

        lv.set_map_visible(true);
        assert_eq!(lv.surface().frames.len(), 1);
    }

    #[test]
    fn test_clustering_toggle() {
        let mut lv = view();
        lv.handle_text(&three_buses());
        lv.set_clustering_enabled(false);
        let frame = lv.surface().frames.last().unwrap();
        assert!(frame.clusters.is_empty());
        assert_eq!(frame.individual_points.len(), 3);
    }

    #[test]
    fn test_address_marker_sets_view_and_clear_removes_it() {
        let mut lv = view();
        lv.handle_text(&three_buses());
        lv.place_address_marker(AddressResult {
            lat: -22.95,
            lon: -43.18,
            label: "Copacabana, Rio de Janeiro, RJ, Brasil".to_string(),
        });

        assert_eq!(lv.viewport().zoom, 15);
        let frame = lv.surface().frames.last().unwrap();
        assert!(frame.address_marker.is_some());
        assert!(matches!(frame.camera, CameraAction::Move { zoom: 15, .. }));

        // Explicit view survives the next update
        lv.handle_text(&three_buses());
        assert_eq!(lv.surface().frames.last().unwrap().camera, CameraAction::Preserve);

        lv.clear_filters();
        assert!(lv.address_marker().is_none());
    }

    #[test]
    fn test_sort_resets_page() {
        let mut lv = view();
        let buses: Vec<_> = (0..120)
            .map(|i| bus(&format!("V{:03}", i), "1", -22.9, -43.2))
            .collect();
        lv.handle_text(&serde_json::Value::Array(buses).to_string());

        assert_eq!(lv.next_page().number, 2);
        lv.toggle_sort(SortColumn::Identifier);
        let (page, rows) = lv.page_rows();
        assert_eq!(page.number, 1);
        assert_eq!(page.page_count, 3);
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0].id, "V000");
    }

    #[test]
    fn test_cluster_summary_through_view() {
        let mut lv = view();
        let buses: Vec<_> = (0..30)
            .map(|i| bus(&format!("V{:02}", i), "101", -22.9, -43.2))
            .collect();
        lv.handle_text(&serde_json::Value::Array(buses).to_string());

        let frame = lv.surface().frames.last().unwrap();
        // Identical points fit at max zoom where clustering is off
        assert!(frame.clusters.is_empty());

        lv.begin_interaction();
        lv.end_interaction(Position { lat: -22.9, lon: -43.2 }, 12);
        let frame = lv.surface().frames.last().unwrap();
        assert_eq!(frame.clusters.len(), 1);
        assert_eq!(frame.clusters[0].count, 30);

        let summary = lv.cluster_summary(frame.clusters[0].node).unwrap();
        assert_eq!(summary.members.len(), 20);
        assert!(summary.truncated);
    }
}
