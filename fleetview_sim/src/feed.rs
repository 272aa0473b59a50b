//! Simulated feed transport with fault injection.
//!
//! A [`SimFeed`] replays a script of feed events. Scripted events model what
//! the server and network do; [`SimFeedController`] injects faults on top.
//!
//! ```text
//!   script: Frame Frame Disconnect Frame Frame ... (end = shutdown)
//!              │     │      │
//!              ▼     ▼      ▼
//!   recv():  frame frame  ConnectionClosed ─▶ connect() ─▶ frame ...
//! ```

use async_trait::async_trait;
use fleetview_env::{ConnectionId, EnvError, FeedController, FeedFrame, FeedTransport, FleetViewContext};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::context::SimContext;

/// One scripted feed event.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A text frame sent by the server
    Frame(String),

    /// The connection drops; the next `refuse_next` connects fail
    Disconnect { refuse_next: u32 },
}

/// Delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub connects: u64,
    pub refused: u64,
    pub delivered: u64,
    pub lost: u64,
    pub disconnects: u64,
}

#[derive(Debug)]
struct FeedState {
    script: VecDeque<FeedEvent>,
    connection: Option<ConnectionId>,
    refuse_next: u32,
    rng: ChaCha8Rng,
    stats: FeedStats,
}

/// Shared fault switches, written by the controller and read by the feed.
#[derive(Debug, Default)]
struct FaultSwitches {
    drop_pending: AtomicBool,
    refusing: AtomicBool,
    /// f64 bits
    loss_rate: AtomicU64,
}

/// Simulated feed endpoint.
pub struct SimFeed {
    context: Arc<SimContext>,
    state: Mutex<FeedState>,
    faults: Arc<FaultSwitches>,
    connections_opened: AtomicU64,
}

impl SimFeed {
    /// Creates a feed that replays `script`; `seed` drives frame loss.
    pub fn new(context: Arc<SimContext>, seed: u64, script: Vec<FeedEvent>) -> Self {
        Self {
            context,
            state: Mutex::new(FeedState {
                script: script.into(),
                connection: None,
                refuse_next: 0,
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: FeedStats::default(),
            }),
            faults: Arc::new(FaultSwitches::default()),
            connections_opened: AtomicU64::new(0),
        }
    }

    /// A controller sharing this feed's fault switches.
    pub fn controller(&self) -> SimFeedController {
        SimFeedController {
            faults: Arc::clone(&self.faults),
        }
    }

    /// Appends events to the script.
    pub async fn push(&self, events: impl IntoIterator<Item = FeedEvent>) {
        self.state().script.extend(events);
    }

    pub async fn stats(&self) -> FeedStats {
        self.state().stats.clone()
    }

    /// Events not yet consumed.
    pub async fn remaining(&self) -> usize {
        self.state().script.len()
    }

    // Never held across an await, so `recv` is ready on its first poll
    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn loss_rate(&self) -> f64 {
        f64::from_bits(self.faults.loss_rate.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl FeedTransport for SimFeed {
    async fn connect(&self) -> Result<ConnectionId, EnvError> {
        let mut state = self.state();
        if state.script.is_empty() {
            return Err(EnvError::Shutdown);
        }
        if self.faults.refusing.load(Ordering::SeqCst) || state.refuse_next > 0 {
            state.refuse_next = state.refuse_next.saturating_sub(1);
            state.stats.refused += 1;
            debug!("Simulated feed refused connection");
            return Err(EnvError::connection_failed("simulated refusal"));
        }

        let n = self.connections_opened.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = ConnectionId::from_seed(n);
        state.connection = Some(connection);
        state.stats.connects += 1;
        self.faults.drop_pending.store(false, Ordering::SeqCst);
        info!(%connection, "Simulated feed accepted connection");
        Ok(connection)
    }

    async fn recv(&self) -> Result<FeedFrame, EnvError> {
        let mut state = self.state();
        let Some(connection) = state.connection else {
            return Err(EnvError::closed("not connected"));
        };

        if self.faults.drop_pending.swap(false, Ordering::SeqCst) {
            state.connection = None;
            state.stats.disconnects += 1;
            return Err(EnvError::closed("dropped by controller"));
        }

        let loss_rate = self.loss_rate().clamp(0.0, 1.0);
        loop {
            match state.script.pop_front() {
                None => {
                    state.connection = None;
                    return Err(EnvError::Shutdown);
                }
                Some(FeedEvent::Disconnect { refuse_next }) => {
                    state.connection = None;
                    state.refuse_next = refuse_next;
                    state.stats.disconnects += 1;
                    return Err(EnvError::closed("scripted disconnect"));
                }
                Some(FeedEvent::Frame(payload)) => {
                    if loss_rate > 0.0 && state.rng.gen_bool(loss_rate) {
                        state.stats.lost += 1;
                        continue;
                    }
                    state.stats.delivered += 1;
                    return Ok(FeedFrame::new(connection, payload, self.context.epoch_ms()));
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("sim://feed/{}", self.context.seed())
    }
}

/// Fault injection handle for a [`SimFeed`].
#[derive(Debug, Clone)]
pub struct SimFeedController {
    faults: Arc<FaultSwitches>,
}

impl FeedController for SimFeedController {
    fn drop_connection(&self) {
        self.faults.drop_pending.store(true, Ordering::SeqCst);
    }

    fn refuse_connections(&self, refuse: bool) {
        self.faults.refusing.store(refuse, Ordering::SeqCst);
    }

    fn set_loss_rate(&self, loss_rate: f64) {
        self.faults
            .loss_rate
            .store(loss_rate.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<FeedEvent> {
        (0..n).map(|i| FeedEvent::Frame(format!("[{}]", i))).collect()
    }

    fn feed(script: Vec<FeedEvent>) -> SimFeed {
        SimFeed::new(SimContext::shared(1), 1, script)
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let feed = feed(frames(3));
        let conn = feed.connect().await.unwrap();

        for i in 0..3 {
            let frame = feed.recv().await.unwrap();
            assert_eq!(frame.connection, conn);
            assert_eq!(frame.payload, format!("[{}]", i));
        }
        assert_eq!(feed.recv().await, Err(EnvError::Shutdown));
    }

    #[tokio::test]
    async fn test_scripted_disconnect_and_refusal() {
        let mut script = frames(1);
        script.push(FeedEvent::Disconnect { refuse_next: 2 });
        script.extend(frames(1));
        let feed = feed(script);

        let first = feed.connect().await.unwrap();
        feed.recv().await.unwrap();
        assert!(matches!(feed.recv().await, Err(EnvError::ConnectionClosed(_))));

        assert!(matches!(feed.connect().await, Err(EnvError::ConnectionFailed(_))));
        assert!(matches!(feed.connect().await, Err(EnvError::ConnectionFailed(_))));
        let second = feed.connect().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(feed.recv().await.unwrap().payload, "[0]");

        let stats = feed.stats().await;
        assert_eq!(stats.refused, 2);
        assert_eq!(stats.connects, 2);
        assert_eq!(stats.disconnects, 1);
    }

    #[tokio::test]
    async fn test_controller_faults() {
        let feed = feed(frames(4));
        let controller = feed.controller();

        controller.refuse_connections(true);
        assert!(feed.connect().await.is_err());
        controller.refuse_connections(false);
        feed.connect().await.unwrap();

        controller.drop_connection();
        assert!(matches!(feed.recv().await, Err(EnvError::ConnectionClosed(_))));
        assert!(matches!(feed.recv().await, Err(EnvError::ConnectionClosed(_))));
        assert_eq!(feed.remaining().await, 4);
    }

    #[tokio::test]
    async fn test_full_loss_drains_script() {
        let feed = feed(frames(10));
        feed.controller().set_loss_rate(1.0);
        feed.connect().await.unwrap();

        assert_eq!(feed.recv().await, Err(EnvError::Shutdown));
        assert_eq!(feed.stats().await.lost, 10);
    }

    #[tokio::test]
    async fn test_connect_after_script_end_is_shutdown() {
        let feed = feed(Vec::new());
        assert_eq!(feed.connect().await, Err(EnvError::Shutdown));
    }
}
