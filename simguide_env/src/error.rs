//! Error types for the SimGuide simulator environment.

use thiserror::Error;

/// Errors raised by a simulator environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Could not establish a session (simulator not listening, handshake refused)
    #[error("Connection error: {0}")]
    ConnectionError(String),
    
    /// Simulator replied with something that does not fit the protocol
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    
    /// Message serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
    
    /// Operation attempted on a session that is not open
    #[error("Environment closed")]
    Closed,
    
    /// Round trip timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }
    
    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}
