//! Camera management: when to fit the visible set and when to leave the
//! operator's view alone.
//!
//! ```text
//!   visible set changed
//!        │
//!        ├─ nothing mappable ─────────────────────────▶ Preserve
//!        ├─ operator interacting / view moved by hand ─▶ Preserve
//!        ├─ first population / still at default zoom ──▶ Fit(bounds padded 10%)
//!        └─ otherwise ─────────────────────────────────▶ Preserve
//! ```

use crate::config::ViewportConfig;
use crate::entity::Position;
use crate::projection::{self, LatLngBounds};
use crate::timer::PendingTimer;
use nalgebra::Point2;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// The camera as last decided.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    pub center: Position,
    pub zoom: u8,

    /// Operator is mid pan/zoom
    pub interacting: bool,
}

/// A remembered camera position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SavedView {
    pub center: Position,
    pub zoom: u8,
}

/// What the render surface should do with the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CameraAction {
    Fit {
        center: Position,
        zoom: u8,
        /// Padded bounds that were fitted
        bounds: LatLngBounds,
    },
    /// Programmatic move (address placement, restored view)
    Move { center: Position, zoom: u8 },
    Preserve,
}

/// Owns the viewport state; everything else reads it.
#[derive(Debug, Clone)]
pub struct ViewportController {
    config: ViewportConfig,
    state: ViewportState,
    /// Operator moved the camera away from the default zoom
    explicitly_set: bool,
    /// At least one fit has happened
    populated: bool,
    saved: Option<SavedView>,
    redraw: PendingTimer,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

impl ViewportController {
    pub fn new(config: ViewportConfig) -> Self {
        let state = ViewportState {
            center: config.default_center,
            zoom: config.default_zoom,
            interacting: false,
        };
        let redraw = PendingTimer::new(config.redraw_delay);
        Self {
            config,
            state,
            explicitly_set: false,
            populated: false,
            saved: None,
            redraw,
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn zoom(&self) -> u8 {
        self.state.zoom
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn is_explicitly_set(&self) -> bool {
        self.explicitly_set
    }

    /// Decides the camera action after the visible set changed.
    pub fn on_visible_set_changed(
        &mut self,
        bounds: Option<LatLngBounds>,
        member_count: usize,
    ) -> CameraAction {
        let Some(bounds) = bounds.filter(|_| member_count > 0) else {
            return CameraAction::Preserve;
        };
        if self.state.interacting || self.explicitly_set {
            return CameraAction::Preserve;
        }
        if self.populated && self.state.zoom != self.config.default_zoom {
            return CameraAction::Preserve;
        }

        let padded = bounds.pad(self.config.fit_padding);
        let (center, zoom) = self.fit(&padded);
        self.state.center = center;
        self.state.zoom = zoom;
        self.populated = true;
        debug!(zoom, lat = center.lat, lon = center.lon, member_count, "Camera fitted");

        CameraAction::Fit {
            center,
            zoom,
            bounds: padded,
        }
    }

    /// Center and zoom that frame `bounds` in the configured surface.
    pub fn fit(&self, bounds: &LatLngBounds) -> (Position, u8) {
        let zoom = bounds_zoom(
            bounds,
            self.config.width_px,
            self.config.height_px,
            self.config.min_zoom,
            self.config.max_zoom,
        );
        let z = f64::from(zoom);
        let sw = projection::project(bounds.south_west(), z);
        let ne = projection::project(bounds.north_east(), z);
        let mid = Point2::from((sw.coords + ne.coords) / 2.0);
        (projection::unproject(mid, z), zoom)
    }

    pub fn begin_interaction(&mut self) {
        self.state.interacting = true;
    }

    /// Records where the operator left the camera.
    pub fn end_interaction(&mut self, center: Position, zoom: u8) {
        self.state.interacting = false;
        self.apply_view(center, zoom);
    }

    /// Moves the camera programmatically (address placement, restore).
    pub fn set_view(&mut self, center: Position, zoom: u8) {
        self.apply_view(center, zoom);
    }

    fn apply_view(&mut self, center: Position, zoom: u8) {
        let zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        self.state.center = center;
        self.state.zoom = zoom;
        self.explicitly_set = zoom != self.config.default_zoom;
    }

    /// Remembers the current camera.
    pub fn save_view(&mut self) -> SavedView {
        let view = SavedView {
            center: self.state.center,
            zoom: self.state.zoom,
        };
        self.saved = Some(view);
        view
    }

    /// Returns to the remembered camera; no-op before the first save.
    pub fn restore_view(&mut self) -> Option<SavedView> {
        let view = self.saved?;
        self.apply_view(view.center, view.zoom);
        Some(view)
    }

    pub fn saved_view(&self) -> Option<SavedView> {
        self.saved
    }

    /// Arms the forced-redraw timer, replacing any pending one.
    pub fn schedule_redraw(&mut self, now: Duration) {
        self.redraw.schedule(now);
    }

    /// True once per armed redraw, when it is due.
    pub fn poll_redraw(&mut self, now: Duration) -> bool {
        self.redraw.fire_if_due(now)
    }

    pub fn redraw_pending(&self) -> bool {
        self.redraw.is_pending()
    }

    /// When the pending forced redraw becomes due.
    pub fn redraw_deadline(&self) -> Option<Duration> {
        self.redraw.deadline()
    }
}

/// Highest whole zoom at which `bounds` fits in a `width` x `height` surface.
///
/// A degenerate (single point) box yields `max_zoom`.
pub fn bounds_zoom(bounds: &LatLngBounds, width: f64, height: f64, min_zoom: u8, max_zoom: u8) -> u8 {
    let sw = projection::project(bounds.south_west(), 0.0);
    let ne = projection::project(bounds.north_east(), 0.0);
    let span_x = (ne.x - sw.x).abs();
    let span_y = (ne.y - sw.y).abs();

    let scale = (width / span_x).min(height / span_y);
    if !scale.is_finite() {
        return max_zoom;
    }

    // Within 1% of a whole level counts as that level
    let zoom = (scale.log2() * 100.0).round() / 100.0;
    let zoom = zoom.floor().clamp(f64::from(min_zoom), f64::from(max_zoom));
    zoom as u8
}
