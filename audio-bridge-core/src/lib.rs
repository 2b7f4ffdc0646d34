//! # audio-bridge-core
//!
//! Platform-agnostic core of the Bluetooth-to-HTTP audio bridge.
//!
//! Buffers raw PCM from a [`CaptureSource`], hands it to an [`AudioEncoder`],
//! and fans the encoded MP3 stream out to any number of HTTP clients. A
//! quality monitor adapts the encoder bitrate to buffer pressure and a health
//! supervisor restarts failing components. Platform backends (PulseAudio /
//! GStreamer on Linux) implement the source and encoder traits.
//!
//! ## Architecture
//!
//! ```text
//! audio-bridge-core (this crate)
//! ├── traits/       ← CaptureSource, AudioEncoder, ClientSink, BridgeDelegate
//! ├── models/       ← BridgeError, BridgeState, BridgeConfig, status snapshots
//! ├── processing/   ← CircularAudioBuffer, QualityMonitor, MP3 silence
//! ├── streaming/    ← StreamTee, StreamDistributor (per-client sessions)
//! ├── health/       ← HealthSupervisor (recovery with backoff)
//! └── session/      ← AudioBridge (pipeline orchestrator)
//! ```

pub mod health;
pub mod models;
pub mod processing;
pub mod session;
pub mod streaming;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use health::component::ManagedComponent;
pub use health::supervisor::{HealthSupervisor, HealthTransition};
pub use models::config::BridgeConfig;
pub use models::error::BridgeError;
pub use models::state::{BridgeState, ComponentHealth, ComponentKind};
pub use models::status::{BitrateStatus, BridgeStatus, BufferStatus, ComponentStatus, QualityMetrics, SessionSnapshot};
pub use processing::quality::{BitrateController, LoadCondition, QualityMonitor, QualityReport};
pub use processing::ring_buffer::{CircularAudioBuffer, RingBuffer};
pub use session::bridge::AudioBridge;
pub use session::stop_signal::StopSignal;
pub use streaming::distributor::{SessionEnd, StreamDistributor};
pub use streaming::tee::StreamTee;
pub use traits::bridge_delegate::{BridgeDelegate, HealthObserver};
pub use traits::capture_source::{CaptureSource, SharedCapture};
pub use traits::client_sink::{ClientSink, Delivery};
pub use traits::encoder::{AudioEncoder, SharedEncoder};
