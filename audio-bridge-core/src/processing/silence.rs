use std::time::Duration;

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, joint stereo, no CRC, no padding.
const SILENT_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];

/// 144 * 128000 / 44100, rounded down.
pub const SILENT_FRAME_LEN: usize = 417;

/// Samples per MPEG-1 Layer III frame.
const SAMPLES_PER_FRAME: u64 = 1152;
const FRAME_SAMPLE_RATE: u64 = 44_100;

/// One decodable MP3 frame of digital silence.
///
/// Zeroed side info means zero-length main data, which decoders render as
/// silence while keeping the stream well-formed.
pub fn silent_frame() -> Vec<u8> {
    let mut frame = vec![0u8; SILENT_FRAME_LEN];
    frame[..4].copy_from_slice(&SILENT_FRAME_HEADER);
    frame
}

/// Whole silent frames covering at least `min_bytes`, plus their playback duration.
pub fn silence_chunk(min_bytes: usize) -> (Vec<u8>, Duration) {
    let frames = min_bytes.div_ceil(SILENT_FRAME_LEN).max(1);
    let frame = silent_frame();
    let mut chunk = Vec::with_capacity(frames * SILENT_FRAME_LEN);
    for _ in 0..frames {
        chunk.extend_from_slice(&frame);
    }
    let micros = frames as u64 * SAMPLES_PER_FRAME * 1_000_000 / FRAME_SAMPLE_RATE;
    (chunk, Duration::from_micros(micros))
}

/// Whether `data` starts with the fallback silence frame header.
pub fn is_silence(data: &[u8]) -> bool {
    data.starts_with(&SILENT_FRAME_HEADER)
}

const MPEG1_L3_KBPS: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const MPEG2_L3_KBPS: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];
const MPEG1_RATES: [u32; 3] = [44_100, 48_000, 32_000];

/// Length in bytes of the Layer III frame that starts with `header`, or
/// `None` if the header is not a usable Layer III header.
pub fn frame_len(header: [u8; 4]) -> Option<usize> {
    if header[0] != 0xFF || header[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version = (header[1] >> 3) & 0b11;
    let layer = (header[1] >> 1) & 0b11;
    if version == 0b01 || layer != 0b01 {
        return None;
    }
    let bitrate_index = (header[2] >> 4) as usize;
    let rate_index = ((header[2] >> 2) & 0b11) as usize;
    if bitrate_index == 0 || bitrate_index == 15 || rate_index == 3 {
        return None;
    }
    let padding = ((header[2] >> 1) & 1) as u32;

    // 0b11 = MPEG-1, 0b10 = MPEG-2, 0b00 = MPEG-2.5
    let (kbps, rate, coefficient) = match version {
        0b11 => (MPEG1_L3_KBPS[bitrate_index], MPEG1_RATES[rate_index], 144),
        0b10 => (MPEG2_L3_KBPS[bitrate_index], MPEG1_RATES[rate_index] / 2, 72),
        _ => (MPEG2_L3_KBPS[bitrate_index], MPEG1_RATES[rate_index] / 4, 72),
    };
    Some((coefficient * kbps * 1000 / rate + padding) as usize)
}

/// Follows MP3 frame boundaries across the chunks sent to one client, so
/// fallback silence can start on a frame boundary instead of right after a
/// truncated frame.
#[derive(Debug, Default)]
pub struct FrameTracker {
    remaining: usize,
    header: Vec<u8>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for bytes that were sent to the client.
    pub fn observe(&mut self, data: &[u8]) {
        let mut rest = data;
        while !rest.is_empty() {
            if self.remaining > 0 {
                let n = self.remaining.min(rest.len());
                self.remaining -= n;
                rest = &rest[n..];
                continue;
            }
            self.header.push(rest[0]);
            rest = &rest[1..];
            if self.header.len() == 4 {
                let header = [self.header[0], self.header[1], self.header[2], self.header[3]];
                match frame_len(header) {
                    Some(len) => {
                        self.remaining = len.saturating_sub(4);
                        self.header.clear();
                    }
                    // Lost sync: slide forward one byte.
                    None => {
                        self.header.remove(0);
                    }
                }
            }
        }
    }

    /// Bytes still owed to the frame in progress.
    pub fn unfinished(&self) -> usize {
        self.remaining
    }

    /// Zero bytes that close the frame in progress, followed by whole silent
    /// frames covering at least `min_bytes`.
    pub fn aligned_silence(&self, min_bytes: usize) -> (Vec<u8>, Duration) {
        let (frames, duration) = silence_chunk(min_bytes);
        if self.remaining == 0 {
            return (frames, duration);
        }
        let mut chunk = vec![0u8; self.remaining];
        chunk.extend_from_slice(&frames);
        (chunk, duration)
    }
}
