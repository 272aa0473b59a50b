//! Error types for the FleetView environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Opening the feed connection failed (refused, unreachable, ...)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    
    /// An established connection was closed by the peer or the network
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
    
    /// The transport was shut down for good; consumers must stop retrying
    #[error("Transport shut down")]
    Shutdown,
}

impl EnvError {
    /// Creates a connection-failed error.
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }
    
    /// Creates a connection-closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::ConnectionClosed(msg.into())
    }
    
    /// True when the error ends the consumer loop instead of triggering a retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
