//! PulseAudio monitor capture of the Bluetooth A2DP sink.
//!
//! Runs `parec` against `<sink>.monitor` and exposes its raw s16le stdout as a
//! [`CaptureSource`]. No sink at start-up is not fatal: the source reports
//! unhealthy, the distributor serves silence, and the supervisor keeps trying
//! to find the phone through [`CaptureSource::attempt_recovery`].

use audio_bridge_core::models::error::BridgeError;
use audio_bridge_core::traits::capture_source::CaptureSource;

use crate::process::PipedChild;
use crate::sink_discovery::find_bluetooth_sink;

const PAREC: &str = "parec";

/// `parec` command line for raw PCM from a sink's monitor source.
pub fn parec_args(sink: &str, sample_rate: u32, channels: u16) -> Vec<String> {
    vec![
        format!("--device={}.monitor", sink),
        "--format=s16le".into(),
        format!("--rate={}", sample_rate),
        format!("--channels={}", channels),
        "--raw".into(),
    ]
}

pub struct ParecCapture {
    sample_rate: u32,
    channels: u16,
    /// Fixed sink name; when `None` the sink is discovered with `pactl`.
    sink_override: Option<String>,
    sink: Option<String>,
    child: Option<PipedChild>,
    last_error: Option<String>,
}

impl ParecCapture {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sink_override: None,
            sink: None,
            child: None,
            last_error: None,
        }
    }

    /// Capture from a named sink instead of discovering one.
    pub fn with_sink(mut self, sink: impl Into<String>) -> Self {
        self.sink_override = Some(sink.into());
        self
    }

    fn resolve_sink(&self) -> Result<Option<String>, BridgeError> {
        match &self.sink_override {
            Some(sink) => Ok(Some(sink.clone())),
            None => find_bluetooth_sink(),
        }
    }

    fn spawn(&mut self) -> Result<(), BridgeError> {
        let Some(sink) = self.resolve_sink()? else {
            self.sink = None;
            self.last_error = Some("no Bluetooth sink connected".into());
            return Ok(());
        };

        let args = parec_args(&sink, self.sample_rate, self.channels);
        let child = PipedChild::spawn(PAREC, &args, false)?;
        log::info!("[CAPTURE] Recording from {}.monitor", sink);
        self.sink = Some(sink);
        self.child = Some(child);
        self.last_error = None;
        Ok(())
    }

    fn kill(&mut self) {
        if let Some(child) = self.child.take() {
            child.kill();
        }
    }
}

impl CaptureSource for ParecCapture {
    fn start(&mut self) -> Result<(), BridgeError> {
        if self.child.is_some() {
            return Err(BridgeError::InvalidState("parec capture already running".into()));
        }
        // Probe the binary so a missing PulseAudio install fails start-up.
        PipedChild::spawn(PAREC, &["--version".to_string()], false)?.kill();
        self.spawn()
    }

    fn pull_available_bytes(&mut self) -> Result<Vec<u8>, BridgeError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(Vec::new());
        };
        let data = child.take_pending();
        if data.is_empty() {
            if let Some(reason) = child.exit_reason() {
                self.last_error = Some(reason.clone());
                return Err(BridgeError::CaptureFailed(reason));
            }
        }
        Ok(data)
    }

    fn stop(&mut self) -> Result<(), BridgeError> {
        self.kill();
        log::info!("[CAPTURE] Stopped");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.child.is_some() && self.last_error.is_none()
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn attempt_recovery(&mut self) -> Result<(), BridgeError> {
        self.kill();
        self.spawn()?;
        match &self.last_error {
            Some(e) => Err(BridgeError::CaptureFailed(e.clone())),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        match &self.sink {
            Some(sink) => format!("{}.monitor", sink),
            None => "no Bluetooth sink".into(),
        }
    }
}

impl Drop for ParecCapture {
    fn drop(&mut self) {
        self.kill();
    }
}
