//! FleetView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the FleetView live
//! view to run against a **Production** feed (tokio) or a **Simulated** feed
//! with a virtual clock.
//!
//! # Core Concept: The Reactor Pattern
//!
//! Everything the live view needs from the outside world is intercepted:
//! - Time (`now()`, `system_time()`, `sleep()`, `sleep_until()`)
//! - The position feed (`connect()`, `recv()`)
//!
//! With a virtual clock the fixed reconnect delay and the debounce timers
//! become instantaneous and reproducible in tests.
//!
//! # Example
//!
//! ```ignore
//! use fleetview_env::{FleetViewContext, FeedTransport};
//!
//! async fn consume<Ctx: FleetViewContext, T: FeedTransport>(ctx: &Ctx, feed: &T) {
//!     loop {
//!         match feed.connect().await {
//!             Ok(_) => while let Ok(frame) = feed.recv().await { handle(frame) },
//!             Err(_) => {}
//!         }
//!         ctx.sleep(Duration::from_secs(5)).await;
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::FleetViewContext;
pub use transport::{FeedTransport, FeedController};
pub use types::{ConnectionId, FeedFrame};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
