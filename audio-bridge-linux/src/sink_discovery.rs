//! Bluetooth A2DP sink discovery via `pactl`.

use std::process::Command;

use audio_bridge_core::models::error::BridgeError;

const BLUETOOTH_SINK_MARKER: &str = "bluez_sink";

/// Pick the first Bluetooth sink from `pactl list sinks short` output.
///
/// Each line is tab separated: `index  name  driver  sample-spec  state`.
pub fn parse_bluetooth_sink(pactl_output: &str) -> Option<String> {
    pactl_output
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(str::trim)
        .find(|name| name.contains(BLUETOOTH_SINK_MARKER))
        .map(str::to_string)
}

/// Ask PulseAudio for the connected Bluetooth sink, if any.
pub fn find_bluetooth_sink() -> Result<Option<String>, BridgeError> {
    let output = Command::new("pactl")
        .args(["list", "sinks", "short"])
        .output()
        .map_err(|e| BridgeError::CaptureFailed(format!("failed to run pactl: {}", e)))?;

    if !output.status.success() {
        return Err(BridgeError::CaptureFailed(format!(
            "pactl exited with {}",
            output.status
        )));
    }

    let sink = parse_bluetooth_sink(&String::from_utf8_lossy(&output.stdout));
    match &sink {
        Some(name) => log::info!("[CAPTURE] Found Bluetooth sink: {}", name),
        None => log::warn!("[CAPTURE] No Bluetooth sink found"),
    }
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_PHONE: &str = "\
0\talsa_output.platform-bcm2835_audio.analog-stereo\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tSUSPENDED
1\tbluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink\tmodule-bluez5-device.c\ts16le 2ch 44100Hz\tRUNNING
";

    #[test]
    fn finds_bluez_sink() {
        assert_eq!(
            parse_bluetooth_sink(WITH_PHONE).as_deref(),
            Some("bluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink")
        );
    }

    #[test]
    fn first_bluetooth_sink_wins() {
        let output = "3\tbluez_sink.11_22.a2dp_sink\tm\ts\tIDLE\n4\tbluez_sink.33_44.a2dp_sink\tm\ts\tIDLE\n";
        assert_eq!(parse_bluetooth_sink(output).as_deref(), Some("bluez_sink.11_22.a2dp_sink"));
    }

    #[test]
    fn none_without_bluetooth() {
        let output = "0\talsa_output.pci-0000_00_1f.3.analog-stereo\tmodule-alsa-card.c\ts16le 2ch 48000Hz\tIDLE\n";
        assert_eq!(parse_bluetooth_sink(output), None);
        assert_eq!(parse_bluetooth_sink(""), None);
    }

    #[test]
    fn marker_only_matches_name_column() {
        let output = "0\talsa_output.usb\tbluez_sink-driver\ts16le 2ch 44100Hz\tIDLE\n";
        assert_eq!(parse_bluetooth_sink(output), None);
    }
}
