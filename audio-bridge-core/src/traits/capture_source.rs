use crate::models::error::BridgeError;

/// Producer of raw interleaved PCM (e.g. the Bluetooth A2DP sink's monitor).
///
/// Implemented by:
/// - `ParecCapture` (audio-bridge-linux)
/// - In-memory test doubles
pub trait CaptureSource: Send {
    /// Start producing audio.
    fn start(&mut self) -> Result<(), BridgeError>;

    /// Return whatever PCM has arrived since the last call. Never blocks; an
    /// empty vector means nothing is available yet.
    fn pull_available_bytes(&mut self) -> Result<Vec<u8>, BridgeError>;

    /// Stop producing and release resources.
    fn stop(&mut self) -> Result<(), BridgeError>;

    fn is_healthy(&self) -> bool;

    fn last_error(&self) -> Option<String>;

    /// Try to bring the source back after a failure.
    fn attempt_recovery(&mut self) -> Result<(), BridgeError>;

    /// Human-readable description of the backing device.
    fn describe(&self) -> String;
}

/// Capture source shared between the capture pump and the supervisor.
pub type SharedCapture = std::sync::Arc<parking_lot::Mutex<Box<dyn CaptureSource>>>;
