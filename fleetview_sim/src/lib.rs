//! FleetView Deterministic Feed Simulation
//!
//! A controlled world in which the whole live view runs reproducibly:
//! - **Time**: a virtual clock that only moves when a scenario advances it
//! - **Feed**: a scripted transport with frame loss, drops and refusals
//! - **Fleet**: buses moved by a seeded oracle, reported with GPS noise
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                         │
//! │                                                              │
//! │  ┌─────────────┐  reports  ┌───────────────┐  frames         │
//! │  │ FleetOracle │──────────▶│ FeedPublisher │────────┐        │
//! │  └─────────────┘           └───────────────┘        ▼        │
//! │                                              ┌────────────┐  │
//! │                       SimFeedController ───▶ │  SimFeed   │  │
//! │                                              └─────┬──────┘  │
//! │                                                    │ recv    │
//! │  ┌────────────┐   virtual clock   ┌──────────────┐ ▼         │
//! │  │ SimContext │──────────────────▶│ FeedRuntime  │           │
//! │  └────────────┘                   │  + LiveView  │──▶ Audit  │
//! │                                   └──────────────┘  Surface  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fleetview_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 200).run(ScenarioId::Reconnect);
//! assert!(result.passed);
//! ```

mod context;
mod feed;
mod oracle;
mod publisher;
pub mod exporter;
pub mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use feed::{FeedEvent, FeedStats, SimFeed, SimFeedController};
pub use oracle::{FleetOracle, GroundTruthBus, OracleConfig, VehicleReport};
pub use publisher::{FeedPublisher, PublishMode, PublishedUpdate, PublisherConfig, RecordStyle};
pub use exporter::{SimExport, SimFrame};
pub use runner::{AuditSurface, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
