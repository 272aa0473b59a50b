//! Address search: debounced query handling around an external geocoder.
//!
//! The geocoder itself lives behind [`AddressResolver`]. The core only decides
//! when a lookup should be issued and places the chosen result as a one-off
//! marker outside the clustering system.

use crate::config::AddressSearchConfig;
use crate::entity::Position;
use crate::timer::PendingTimer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressResult {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
}

impl AddressResult {
    pub fn position(&self) -> Option<Position> {
        Position::new(self.lat, self.lon)
    }

    /// Short label for suggestion lists.
    pub fn short_label(&self) -> String {
        format_address(&self.label)
    }
}

/// External geocoding service.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<AddressResult>, AddressError>;
}

/// Keeps the first three comma-separated components of a label.
pub fn format_address(label: &str) -> String {
    label
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What the caller should do after the debounce elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAction {
    /// Issue a lookup for this query
    Lookup(String),
    /// Query too short; clear suggestions
    Clear,
}

/// Trailing-debounced address query state.
#[derive(Debug, Clone)]
pub struct AddressSearch {
    config: AddressSearchConfig,
    timer: PendingTimer,
    query: String,
}

impl AddressSearch {
    pub fn new(config: AddressSearchConfig) -> Self {
        let timer = PendingTimer::new(config.debounce);
        Self {
            config,
            timer,
            query: String::new(),
        }
    }

    /// Records new input; the lookup is deferred until input settles.
    pub fn input(&mut self, query: &str, now: Duration) {
        self.query = query.trim().to_string();
        self.timer.schedule(now);
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// When the pending lookup becomes due.
    pub fn deadline(&self) -> Option<Duration> {
        self.timer.deadline()
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.query.clear();
    }

    /// Fires once the debounce elapsed since the last input.
    pub fn poll(&mut self, now: Duration) -> Option<SearchAction> {
        if !self.timer.fire_if_due(now) {
            return None;
        }
        if self.query.chars().count() < self.config.min_query_len {
            Some(SearchAction::Clear)
        } else {
            Some(SearchAction::Lookup(self.query.clone()))
        }
    }

    /// Runs the lookup through `resolver`, capped to the suggestion limit.
    pub async fn lookup<R: AddressResolver + ?Sized>(
        &self,
        resolver: &R,
        query: &str,
    ) -> Result<Vec<AddressResult>, AddressError> {
        if query.chars().count() < self.config.min_query_len {
            return Err(AddressError::QueryTooShort(self.config.min_query_len));
        }
        let mut results = resolver.resolve(query).await?;
        results.truncate(self.config.max_suggestions);
        Ok(results)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Query must be at least {0} characters")]
    QueryTooShort(usize),

    #[error("No results for: {0}")]
    NotFound(String),

    #[error("Resolver failed: {0}")]
    Resolver(String),
}
