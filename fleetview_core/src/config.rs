//! Configuration for the live view and its runtime.
//!
//! All defaults mirror the behaviour of the deployed dashboard.

use crate::cluster::ClusterConfig;
use crate::entity::Position;
use std::time::Duration;

// ============================================================================
// VIEWPORT
// ============================================================================

/// Camera defaults and fitting parameters.
#[derive(Debug, Clone)]
pub struct ViewportConfig {
    /// Initial map center (default: São Paulo, -23.5505 / -46.6333)
    pub default_center: Position,

    /// Initial zoom; while the camera sits here, updates re-fit (default: 12)
    pub default_zoom: u8,

    /// Render surface size in pixels (default: 1024 x 768)
    pub width_px: f64,
    pub height_px: f64,

    /// Zoom range of the tile provider (default: 0..=18)
    pub min_zoom: u8,
    pub max_zoom: u8,

    /// Bounds padding ratio applied before fitting (default: 0.1)
    pub fit_padding: f64,

    /// Forced redraw debounce after a rebuild (default: 100ms)
    pub redraw_delay: Duration,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            default_center: Position {
                lat: -23.5505,
                lon: -46.6333,
            },
            default_zoom: 12,
            width_px: 1024.0,
            height_px: 768.0,
            min_zoom: 0,
            max_zoom: 18,
            fit_padding: 0.1,
            redraw_delay: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// ADDRESS SEARCH
// ============================================================================

/// Address autocomplete parameters.
#[derive(Debug, Clone)]
pub struct AddressSearchConfig {
    /// Trailing debounce before a lookup is issued (default: 300ms)
    pub debounce: Duration,

    /// Shorter queries never reach the resolver (default: 3)
    pub min_query_len: usize,

    /// Suggestions kept from one lookup (default: 5)
    pub max_suggestions: usize,

    /// Zoom applied when an address is placed (default: 15)
    pub placement_zoom: u8,
}

impl Default for AddressSearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            min_query_len: 3,
            max_suggestions: 5,
            placement_zoom: 15,
        }
    }
}

// ============================================================================
// LIVE VIEW
// ============================================================================

/// Configuration for the whole live-view pipeline.
#[derive(Debug, Clone)]
pub struct LiveViewConfig {
    /// Rows per listing page (default: 50)
    pub page_size: usize,

    pub viewport: ViewportConfig,
    pub cluster: ClusterConfig,
    pub address: AddressSearchConfig,
}

impl Default for LiveViewConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            viewport: ViewportConfig::default(),
            cluster: ClusterConfig::default(),
            address: AddressSearchConfig::default(),
        }
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

/// Feed connection runtime parameters.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Fixed delay before reconnecting (default: 5s, no backoff)
    pub retry_delay: Duration,

    /// Stop after this many connection attempts; `None` retries forever
    pub max_attempts: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}
