//! Clock seam between the live view and its environment.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// Time as seen by the live view and its feed runtime.
///
/// Debounce deadlines and reconnect delays are expressed on the monotonic
/// [`now`](Self::now) clock, so the same pipeline runs against wall time or a
/// manually advanced virtual clock.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - `tokio::time` plus the system clock
/// - **Simulation**: `SimContext` - a virtual clock that sleeping advances
#[async_trait]
pub trait FleetViewContext: Send + Sync + 'static {
    /// Monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Wall-clock time, used for "last update" stamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Suspends until the monotonic clock reaches `deadline`.
    ///
    /// Returns at once when the deadline already passed.
    async fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now).await;
        }
    }

    /// Seed of a simulated context; 0 in production.
    fn seed(&self) -> u64;
}
