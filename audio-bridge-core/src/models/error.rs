use thiserror::Error;

/// Errors reported by the audio bridge.
///
/// Buffer underrun and overflow are not errors: an empty read and the
/// overflow counters in [`BufferStatus`](super::status::BufferStatus) carry them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("encoder failed: {0}")]
    EncoderFailed(String),

    #[error("client transport closed")]
    TransportClosed,

    #[error("stream source failed: {0}")]
    SourceFailed(String),

    #[error("recovery exhausted: {0}")]
    RecoveryExhausted(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(e.to_string())
    }
}
