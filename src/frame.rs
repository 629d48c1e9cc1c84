//! Camera frames.
//!
//! - `Frame`: one decoded RGB24 frame pulled from the live stream.
//!
//! Frames are handed to the detector by reference and dropped at the end of the
//! detection cycle. Nothing in the pipeline retains them; the recording path
//! works on encoded `MediaSegment`s instead.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes per pixel for RGB24.
pub const RGB_CHANNELS: usize = 3;

/// One RGB24 frame from the camera stream.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic frame counter assigned by the source.
    pub seq: u64,
    /// Capture wall-clock time in milliseconds since the epoch.
    pub captured_at_ms: u64,
}

impl Frame {
    /// Build a frame from packed RGB24 pixels. The length must match the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            seq,
            captured_at_ms: now_ms(),
        })
    }

    /// Solid-colour frame, mostly useful for tests.
    pub fn filled(width: u32, height: u32, seq: u64, rgb: [u8; 3]) -> Result<Self> {
        let len = expected_len(width, height)?;
        let pixels = rgb.iter().copied().cycle().take(len).collect();
        Self::new(pixels, width, height, seq)
    }

    /// Read-only pixel access for detector backends.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

/// Wall-clock milliseconds since the epoch (0 if the clock is before 1970).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_length_mismatch() {
        let err = Frame::new(vec![0u8; 10], 2, 2, 0).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn frame_rejects_zero_dimensions() {
        assert!(Frame::new(Vec::new(), 0, 4, 0).is_err());
    }

    #[test]
    fn filled_frame_repeats_colour() -> Result<()> {
        let frame = Frame::filled(2, 1, 7, [1, 2, 3])?;
        assert_eq!(frame.pixels(), &[1, 2, 3, 1, 2, 3]);
        assert_eq!(frame.seq, 7);
        assert_eq!(frame.byte_len(), 6);
        Ok(())
    }
}
