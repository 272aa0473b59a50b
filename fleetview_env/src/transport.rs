//! Feed transport abstraction for FleetView consumers.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ConnectionId, FeedFrame};

/// Abstraction over the persistent connection that delivers position updates.
///
/// # Implementations
///
/// - **Production**: a WebSocket client (outside this workspace)
/// - **Simulation**: channel-based with configurable loss and disconnects
///
/// # Frame Flow
///
/// ```text
/// Publisher                  Transport                  Consumer
///   |                           |                          |
///   |-- batch k/N ------------->|                          |
///   |                           |-- [loss/disconnect] ---->|
///   |                           |                          |-- recv() -> frame
/// ```
///
/// Frames of one connection are delivered in FIFO order. A connection never
/// outlives a `recv()` error: the consumer must `connect()` again.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Opens a new connection, replacing any previous one.
    ///
    /// # Returns
    /// * `Ok(id)` - The connection is open
    /// * `Err(EnvError::ConnectionFailed)` - Retry later
    /// * `Err(EnvError::Shutdown)` - Never retry
    async fn connect(&self) -> Result<ConnectionId, EnvError>;
    
    /// Receives the next text frame of the current connection.
    ///
    /// # Returns
    /// * `Ok(frame)` - A frame arrived
    /// * `Err(EnvError::ConnectionClosed)` - The connection dropped
    /// * `Err(EnvError::Shutdown)` - The feed ended for good
    async fn recv(&self) -> Result<FeedFrame, EnvError>;
    
    /// Human readable endpoint description (for logging).
    fn endpoint(&self) -> String;
}

/// Marker trait for feed controllers in simulation.
///
/// Allows injecting faults like part loss and forced disconnects.
pub trait FeedController: Send + Sync {
    /// Drops the current connection; the next `recv()` fails.
    fn drop_connection(&self);
    
    /// Makes subsequent `connect()` calls fail until cleared.
    fn refuse_connections(&self, refuse: bool);
    
    /// Sets the probability (0.0 - 1.0) that a frame is silently lost.
    fn set_loss_rate(&self, loss_rate: f64);
}
