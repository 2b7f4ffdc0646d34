//! # audio-bridge-linux
//!
//! Linux subprocess backend for audio-bridge.
//!
//! Provides:
//! - `ParecCapture`: PCM from the Bluetooth A2DP sink's PulseAudio monitor (`parec`)
//! - `GstEncoder`: PCM → MP3 through a GStreamer `lamemp3enc` pipeline
//! - `sink_discovery`: Bluetooth sink lookup via `pactl`
//!
//! ## Platform Requirements
//! - PulseAudio (or PipeWire's pulse server) with `pactl` and `parec`
//! - GStreamer 1.x with the `lame` plugin (`gst-plugins-good`)
//!
//! ## Usage
//! ```ignore
//! use audio_bridge_core::{AudioBridge, BridgeConfig};
//! use audio_bridge_linux::{GstEncoder, ParecCapture};
//!
//! let config = BridgeConfig::default();
//! let capture = ParecCapture::new(config.sample_rate, config.channels);
//! let encoder = GstEncoder::new(config.sample_rate, config.channels, config.target_bitrate_kbps);
//! let mut bridge = AudioBridge::new(config, Box::new(capture), Box::new(encoder)).unwrap();
//! bridge.start().unwrap();
//! ```

pub mod gst_encoder;
pub mod parec_capture;
pub mod process;
pub mod sink_discovery;

pub use gst_encoder::GstEncoder;
pub use parec_capture::ParecCapture;
pub use sink_discovery::find_bluetooth_sink;
