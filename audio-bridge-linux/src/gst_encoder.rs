//! MP3 encoding through a `gst-launch-1.0` filter process.
//!
//! PCM goes in on stdin, MP3 comes out on stdout:
//! ```text
//! fdsrc fd=0 ! rawaudioparse ! audioconvert ! lamemp3enc bitrate=N cbr=true ! fdsink fd=1
//! ```
//! The encoder has latency, so a chunk's MP3 bytes usually come back with a
//! later `encode_chunk` call.

use audio_bridge_core::models::error::BridgeError;
use audio_bridge_core::traits::encoder::AudioEncoder;

use crate::process::PipedChild;

const GST_LAUNCH: &str = "gst-launch-1.0";

/// `gst-launch-1.0` arguments for an s16le → CBR MP3 filter.
pub fn gst_pipeline_args(sample_rate: u32, channels: u16, bitrate_kbps: u32) -> Vec<String> {
    let pipeline = format!(
        "fdsrc fd=0 ! rawaudioparse use-sink-caps=false format=pcm pcm-format=s16le \
         sample-rate={} num-channels={} ! audioconvert ! lamemp3enc bitrate={} cbr=true ! fdsink fd=1",
        sample_rate, channels, bitrate_kbps
    );
    std::iter::once("-q".to_string())
        .chain(pipeline.split_whitespace().map(str::to_string))
        .collect()
}

pub struct GstEncoder {
    sample_rate: u32,
    channels: u16,
    bitrate_kbps: u32,
    child: Option<PipedChild>,
    /// Set when the bitrate changed; the process restarts before the next chunk.
    restart_pending: bool,
    last_error: Option<String>,
}

impl GstEncoder {
    pub fn new(sample_rate: u32, channels: u16, bitrate_kbps: u32) -> Self {
        Self {
            sample_rate,
            channels,
            bitrate_kbps,
            child: None,
            restart_pending: false,
            last_error: None,
        }
    }

    fn spawn(&mut self) -> Result<(), BridgeError> {
        let args = gst_pipeline_args(self.sample_rate, self.channels, self.bitrate_kbps);
        let child = PipedChild::spawn(GST_LAUNCH, &args, true)?;
        log::info!("[ENCODER] MP3 encoder started at {} kbps", self.bitrate_kbps);
        self.child = Some(child);
        self.restart_pending = false;
        self.last_error = None;
        Ok(())
    }

    /// Stop the process, keeping whatever it already produced.
    fn kill(&mut self) -> Vec<u8> {
        match self.child.take() {
            Some(child) => {
                let tail = child.take_pending();
                child.kill();
                tail
            }
            None => Vec::new(),
        }
    }

    fn fail(&mut self, reason: String) -> BridgeError {
        log::error!("[ENCODER] {}", reason);
        self.last_error = Some(reason.clone());
        BridgeError::EncoderFailed(reason)
    }
}

impl AudioEncoder for GstEncoder {
    /// The first call starts the encoder process; later changes restart it
    /// before the next chunk.
    fn set_bitrate(&mut self, kbps: u32) -> Result<(), BridgeError> {
        if self.child.is_none() && self.last_error.is_none() {
            self.bitrate_kbps = kbps;
            return self.spawn();
        }
        if kbps != self.bitrate_kbps {
            log::info!("[ENCODER] Bitrate {} → {} kbps", self.bitrate_kbps, kbps);
            self.bitrate_kbps = kbps;
            self.restart_pending = true;
        }
        Ok(())
    }

    fn bitrate(&self) -> u32 {
        self.bitrate_kbps
    }

    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let mut out = Vec::new();
        if self.restart_pending {
            out = self.kill();
            self.spawn()?;
        }

        let Some(child) = self.child.as_mut() else {
            return Err(BridgeError::EncoderFailed("encoder process not running".into()));
        };
        if let Some(reason) = child.exit_reason() {
            return Err(self.fail(reason));
        }
        if let Err(e) = child.write_stdin(pcm) {
            return Err(self.fail(format!("failed to feed encoder: {}", e)));
        }

        out.extend(child.take_pending());
        Ok(out)
    }

    fn is_healthy(&self) -> bool {
        self.child.is_some() && self.last_error.is_none()
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn attempt_recovery(&mut self) -> Result<(), BridgeError> {
        self.kill();
        self.spawn()
    }

    fn shutdown(&mut self) {
        self.kill();
        log::info!("[ENCODER] Stopped");
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        self.kill();
    }
}
