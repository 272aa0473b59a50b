//! JSON exporter for simulation runs.
//!
//! Exports every rendered frame so a run can be replayed or plotted offline.

use fleetview_core::{CameraAction, RenderFrame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single rendered frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub generation: u64,
    pub total: usize,
    pub visible: usize,
    pub on_map: usize,
    pub zoom: u8,

    /// "fit", "move" or "preserve"
    pub camera: String,

    pub clusters: Vec<ClusterPoint>,

    pub points: Vec<VehiclePoint>,

    /// Warnings and status changes since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    pub fn from_render(time_sec: f64, frame: &RenderFrame, events: Vec<SimEvent>) -> Self {
        Self {
            time_sec,
            generation: frame.stats.generation,
            total: frame.stats.total,
            visible: frame.stats.visible,
            on_map: frame.stats.on_map,
            zoom: frame.viewport.zoom,
            camera: camera_kind(&frame.camera).to_string(),
            clusters: frame
                .clusters
                .iter()
                .map(|c| ClusterPoint {
                    count: c.count,
                    lat: c.centroid.lat,
                    lon: c.centroid.lon,
                })
                .collect(),
            points: frame
                .individual_points
                .iter()
                .map(|leaf| VehiclePoint {
                    id: leaf.entity.id_or_placeholder().to_string(),
                    lat: leaf.position.lat,
                    lon: leaf.position.lon,
                })
                .collect(),
            events,
        }
    }
}

/// Short name of a camera action.
pub fn camera_kind(camera: &CameraAction) -> &'static str {
    match camera {
        CameraAction::Fit { .. } => "fit",
        CameraAction::Move { .. } => "move",
        CameraAction::Preserve => "preserve",
    }
}

/// A drawn cluster badge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub count: usize,
    pub lat: f64,
    pub lon: f64,
}

/// A drawn individual vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehiclePoint {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
