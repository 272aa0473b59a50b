//! Common types for the FleetView environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one feed connection.
///
/// Every successful `connect()` yields a fresh id so that log lines and
/// status reports can tell reconnects apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Derives the id of the `seed`-th connection a transport opened.
    ///
    /// Transports count their connections, so ids are reproducible across
    /// runs and still distinct within one session.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// One text frame received over a feed connection.
///
/// The payload is opaque JSON at this layer; it is decoded into a wire
/// message by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFrame {
    /// Connection the frame arrived on
    pub connection: ConnectionId,
    
    /// Raw frame text
    pub payload: String,
    
    /// Receive timestamp (consumer clock, milliseconds)
    pub received_at_ms: u64,
}

impl FeedFrame {
    /// Creates a new frame from payload text.
    pub fn new(connection: ConnectionId, payload: impl Into<String>, received_at_ms: u64) -> Self {
        Self {
            connection,
            payload: payload.into(),
            received_at_ms,
        }
    }
    
    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
