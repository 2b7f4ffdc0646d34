use crate::models::error::BridgeError;

/// Opaque PCM → MP3 byte transformer with a mutable bitrate knob.
///
/// The core never looks inside the encoded bytes. A subprocess adapter
/// (`GstEncoder`) implements this in the full system.
pub trait AudioEncoder: Send {
    fn set_bitrate(&mut self, kbps: u32) -> Result<(), BridgeError>;

    fn bitrate(&self) -> u32;

    /// Encode one chunk of PCM. The result may be empty while the encoder
    /// accumulates a full frame.
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Vec<u8>, BridgeError>;

    fn is_healthy(&self) -> bool;

    fn last_error(&self) -> Option<String>;

    /// Restart the encoder after a failure.
    fn attempt_recovery(&mut self) -> Result<(), BridgeError>;

    /// Release resources. Called once on bridge shutdown.
    fn shutdown(&mut self) {}
}

/// Encoder shared between the encode pump, the quality monitor and the supervisor.
pub type SharedEncoder = std::sync::Arc<parking_lot::Mutex<Box<dyn AudioEncoder>>>;
