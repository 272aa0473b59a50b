//! FleetView Core - Live vehicle-position view
//!
//! Turns a stream of numbered position batches into a consistent, filterable,
//! spatially clustered view:
//! 1. **Reassembly**: numbered parts become atomic full updates, never partial ones
//! 2. **Filtering**: case-insensitive line/identifier search, stable sort, pagination
//! 3. **Clustering**: zoom-tiered screen-space grouping with H3 candidate pruning
//! 4. **Viewport**: fit-or-preserve camera decisions and debounced redraws

pub mod entity;
pub mod wire;
pub mod reassembly;
pub mod store;
pub mod filter;
pub mod projection;
pub mod cluster;
pub mod timer;
pub mod viewport;
pub mod address;
pub mod config;
pub mod live_view;
pub mod feed_runtime;

// Re-export key types for convenience
pub use entity::{Entity, Position, RawRecord, Snapshot};
pub use wire::{BatchPart, DecodeError, WireMessage};
pub use reassembly::{BatchReassembler, CompletedUpdate, ProtocolAnomaly, ReassemblyOutcome};
pub use store::{EntityStore, VisibleSet};
pub use filter::{FilterEngine, FilterSpec, Page, SortColumn, SortDirection, SortSpec};
pub use cluster::{ClusterEngine, ClusterNode, ClusterPolicy, ClusterSummary, ClusterTree};
pub use viewport::{CameraAction, ViewportController, ViewportState};
pub use address::{AddressError, AddressResolver, AddressResult};
pub use config::{LiveViewConfig, RuntimeConfig, ViewportConfig};
pub use live_view::{ConnectionStatus, LiveView, RenderFrame, RenderSurface, ViewCommand, ViewMode};
pub use feed_runtime::{FeedRuntime, RuntimeSummary};
