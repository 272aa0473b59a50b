//! Production context on the tokio timer wheel.

use crate::FleetViewContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Wall-clock context for a live feed.
///
/// The monotonic origin is a tokio [`Instant`], so debounce deadlines map
/// straight onto `tokio::time::sleep_until`.
pub struct TokioContext {
    origin: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FleetViewContext for TokioContext {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, deadline: Duration) {
        tokio::time::sleep_until(self.origin + deadline).await;
    }

    fn seed(&self) -> u64 {
        0
    }
}
