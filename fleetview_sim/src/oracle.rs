//! Ground truth oracle for the simulated fleet.
//!
//! The Oracle maintains the "God's eye view" of the city:
//! - True positions of every bus (local east/north meters around a center)
//! - Shuttle kinematics along each line's straight corridor
//! - GPS report generation with noise and the feed's usual defects

use fleetview_core::Position;
use nalgebra::Vector2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Shape of the simulated fleet.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// City center all corridors are laid around
    pub center: Position,

    /// Number of buses
    pub vehicles: usize,

    /// Number of distinct lines
    pub lines: usize,

    /// Corridor endpoints lie within this distance of the center (meters)
    pub spread_m: f64,

    /// GPS noise standard deviation (meters)
    pub gps_noise_std_m: f64,

    /// Probability a report has no coordinates
    pub missing_position_rate: f64,

    /// Probability a report has no identifier
    pub missing_id_rate: f64,

    /// Probability an older report of the same bus is emitted alongside
    pub stale_duplicate_rate: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            center: Position {
                lat: -23.5505,
                lon: -46.6333,
            },
            vehicles: 200,
            lines: 12,
            spread_m: 12_000.0,
            gps_noise_std_m: 8.0,
            missing_position_rate: 0.0,
            missing_id_rate: 0.0,
            stale_duplicate_rate: 0.0,
        }
    }
}

// ============================================================================
// GROUND TRUTH
// ============================================================================

/// A bus shuttling along its line's corridor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthBus {
    /// Vehicle identifier as published ("ordem")
    pub id: String,

    pub line: String,

    /// Corridor endpoints in local meters
    pub from: Vector2<f64>,
    pub to: Vector2<f64>,

    /// Progress along the corridor in [0, 1]
    pub progress: f64,

    /// +1 toward `to`, -1 toward `from`
    pub heading: f64,

    /// Cruise speed (m/s)
    pub speed_mps: f64,
}

impl GroundTruthBus {
    /// Current position in local meters.
    pub fn local_position(&self) -> Vector2<f64> {
        self.from + (self.to - self.from) * self.progress
    }

    fn advance(&mut self, dt: f64) {
        let length = (self.to - self.from).norm().max(1.0);
        self.progress += self.heading * self.speed_mps * dt / length;
        if self.progress >= 1.0 {
            self.progress = 2.0 - self.progress;
            self.heading = -1.0;
        } else if self.progress <= 0.0 {
            self.progress = -self.progress;
            self.heading = 1.0;
        }
        self.progress = self.progress.clamp(0.0, 1.0);
    }
}

/// One GPS report as the upstream server would hold it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleReport {
    pub id: Option<String>,
    pub line: String,
    pub position: Option<Position>,
    /// Speed in km/h
    pub speed_kmh: f64,
    /// Server receive time, epoch milliseconds
    pub timestamp_ms: u64,
}

// ============================================================================
// ORACLE
// ============================================================================

/// The Oracle - moves the fleet and generates its reports.
pub struct FleetOracle {
    /// Master seed (kept apart from the feed's loss RNG)
    physics_seed: u64,

    physics_rng: ChaCha8Rng,

    config: OracleConfig,

    buses: Vec<GroundTruthBus>,

    /// Current simulation time (seconds)
    current_time: f64,

    /// `None` when the configured std is unusable (reports are then exact)
    noise: Option<Normal<f64>>,
}

impl FleetOracle {
    /// Creates the fleet from `physics_seed`.
    ///
    /// The same seed and config always produce the same corridors, speeds and
    /// noise sequence.
    pub fn new(physics_seed: u64, config: OracleConfig) -> Self {
        let mut physics_rng = ChaCha8Rng::seed_from_u64(physics_seed);
        let noise = Normal::new(0.0, config.gps_noise_std_m).ok();

        let lines = config.lines.max(1);
        let corridors: Vec<(Vector2<f64>, Vector2<f64>)> = (0..lines)
            .map(|_| {
                let a = random_point(&mut physics_rng, config.spread_m);
                let b = random_point(&mut physics_rng, config.spread_m);
                (a, b)
            })
            .collect();

        let buses = (0..config.vehicles)
            .map(|i| {
                let line = i % lines;
                let (from, to) = corridors[line];
                GroundTruthBus {
                    id: format!("B{:05}", 10_000 + i),
                    line: format!("{}", 100 + line * 7),
                    from,
                    to,
                    progress: physics_rng.gen_range(0.0..1.0),
                    heading: if physics_rng.gen_bool(0.5) { 1.0 } else { -1.0 },
                    speed_mps: physics_rng.gen_range(4.0..14.0),
                }
            })
            .collect();

        Self {
            physics_seed,
            physics_rng,
            config,
            buses,
            current_time: 0.0,
            noise,
        }
    }

    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Advances every bus by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        for bus in &mut self.buses {
            bus.advance(dt);
        }
        self.current_time += dt;
    }

    /// Current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn buses(&self) -> &[GroundTruthBus] {
        &self.buses
    }

    pub fn vehicle_count(&self) -> usize {
        self.buses.len()
    }

    /// Distinct line labels in fleet order.
    pub fn line_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for bus in &self.buses {
            if !labels.contains(&bus.line) {
                labels.push(bus.line.clone());
            }
        }
        labels
    }

    /// True positions of every bus.
    pub fn ground_truth(&self) -> Vec<(String, Position)> {
        self.buses
            .iter()
            .map(|bus| (bus.id.clone(), self.to_position(bus.local_position())))
            .collect()
    }

    /// One noisy report per bus, plus any injected defects.
    pub fn reports(&mut self, now_ms: u64) -> Vec<VehicleReport> {
        let mut out = Vec::with_capacity(self.buses.len());
        for i in 0..self.buses.len() {
            let bus = &self.buses[i];
            let truth = bus.local_position();
            let id = bus.id.clone();
            let line = bus.line.clone();
            let speed_kmh = bus.speed_mps * 3.6;

            let noisy = truth + Vector2::new(self.sample_noise(), self.sample_noise());
            let position = if self.physics_rng.gen_bool(self.config.missing_position_rate.clamp(0.0, 1.0)) {
                None
            } else {
                Some(self.to_position(noisy))
            };
            let id = if self.physics_rng.gen_bool(self.config.missing_id_rate.clamp(0.0, 1.0)) {
                None
            } else {
                Some(id)
            };

            if id.is_some()
                && self
                    .physics_rng
                    .gen_bool(self.config.stale_duplicate_rate.clamp(0.0, 1.0))
            {
                out.push(VehicleReport {
                    id: id.clone(),
                    line: line.clone(),
                    position: Some(self.to_position(truth)),
                    speed_kmh: 0.0,
                    timestamp_ms: now_ms.saturating_sub(30_000),
                });
            }

            out.push(VehicleReport {
                id,
                line,
                position,
                speed_kmh,
                timestamp_ms: now_ms,
            });
        }
        out
    }

    fn sample_noise(&mut self) -> f64 {
        match &self.noise {
            Some(normal) => normal.sample(&mut self.physics_rng),
            None => 0.0,
        }
    }

    fn to_position(&self, local: Vector2<f64>) -> Position {
        let center = self.config.center;
        let lat = center.lat + local.y / METERS_PER_DEGREE;
        let lon = center.lon + local.x / (METERS_PER_DEGREE * center.lat.to_radians().cos());
        Position { lat, lon }
    }
}

fn random_point(rng: &mut ChaCha8Rng, spread: f64) -> Vector2<f64> {
    Vector2::new(rng.gen_range(-spread..spread), rng.gen_range(-spread..spread))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> OracleConfig {
        OracleConfig {
            vehicles: 20,
            lines: 4,
            ..OracleConfig::default()
        }
    }

    #[test]
    fn test_oracle_is_deterministic() {
        let mut a = FleetOracle::new(42, small());
        let mut b = FleetOracle::new(42, small());
        a.step(10.0);
        b.step(10.0);
        assert_eq!(a.reports(1_000), b.reports(1_000));

        let mut c = FleetOracle::new(43, small());
        c.step(10.0);
        assert_ne!(a.ground_truth(), c.ground_truth());
    }

    #[test]
    fn test_buses_stay_on_corridor() {
        let mut oracle = FleetOracle::new(7, small());
        for _ in 0..500 {
            oracle.step(5.0);
        }
        for bus in oracle.buses() {
            assert!((0.0..=1.0).contains(&bus.progress));
        }
        assert!((oracle.time() - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn test_reports_near_center() {
        let mut oracle = FleetOracle::new(1, small());
        let reports = oracle.reports(0);
        assert_eq!(reports.len(), 20);
        for report in reports {
            let p = report.position.unwrap();
            assert!((p.lat + 23.5505).abs() < 0.2);
            assert!((p.lon + 46.6333).abs() < 0.2);
        }
    }

    #[test]
    fn test_line_labels_are_distinct() {
        let oracle = FleetOracle::new(3, small());
        let labels = oracle.line_labels();
        assert_eq!(labels, vec!["100", "107", "114", "121"]);
    }

    #[test]
    fn test_defect_rates_inject_gaps_and_duplicates() {
        let config = OracleConfig {
            missing_position_rate: 1.0,
            stale_duplicate_rate: 1.0,
            ..small()
        };
        let mut oracle = FleetOracle::new(9, config);
        let reports = oracle.reports(60_000);

        assert_eq!(reports.len(), 40);
        assert_eq!(reports.iter().filter(|r| r.position.is_none()).count(), 20);
        assert_eq!(reports.iter().filter(|r| r.timestamp_ms == 30_000).count(), 20);
    }
}
