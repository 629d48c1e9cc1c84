use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectorBackend, RawDetections};
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

const CLASSES: [&str; 8] = [
    "person", "cat", "dog", "car", "bicycle", "cup", "bottle", "chair",
];

/// Maximum detections a single frame can produce.
const MAX_PER_FRAME: usize = 3;

/// Stub backend for testing and demos.
///
/// Hashes the frame pixels and derives pseudo-detections from the digest, so
/// identical frames always produce identical output and boxes stay inside the
/// frame. Scores span the whole 0..=1 range, so some fall under the threshold.
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect<'a>(&'a mut self, frame: &Frame) -> Result<RawDetections<'a>> {
        self.frames_seen += 1;
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let count = digest[0] as usize % (MAX_PER_FRAME + 1);
        let (width, height) = (frame.width as f32, frame.height as f32);

        Ok(Box::new((0..count).map(move |i| {
            let chunk = &digest[1 + i * 8..1 + (i + 1) * 8];
            let class = CLASSES[chunk[0] as usize % CLASSES.len()];
            let score = chunk[1] as f32 / 255.0;
            let x = (chunk[2] as f32 / 255.0 * width * 0.75).floor();
            let y = (chunk[3] as f32 / 255.0 * height * 0.75).floor();
            let w = ((chunk[4] as f32 / 255.0) * (width - x)).floor().max(1.0);
            let h = ((chunk[5] as f32 / 255.0) * (height - y)).floor().max(1.0);
            RawDetection::new(class, score, BoundingBox::new(x, y, w, h))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seed: u8) -> Frame {
        Frame::filled(64, 48, seed as u64, [seed, seed.wrapping_mul(3), 7]).unwrap()
    }

    #[test]
    fn stub_backend_is_deterministic_per_frame() {
        let mut backend = StubBackend::new();
        let first: Vec<RawDetection> = backend.detect(&frame(1)).unwrap().collect();
        let second: Vec<RawDetection> = backend.detect(&frame(1)).unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(backend.frames_seen(), 2);
    }

    #[test]
    fn stub_boxes_stay_inside_frame() {
        let mut backend = StubBackend::new();
        for seed in 0..=255u8 {
            let f = frame(seed);
            for det in backend.detect(&f).unwrap() {
                assert!(det.bbox.x >= 0.0 && det.bbox.y >= 0.0);
                assert!(det.bbox.x + det.bbox.width <= f.width as f32);
                assert!(det.bbox.y + det.bbox.height <= f.height as f32);
                assert!((0.0..=1.0).contains(&det.score));
                assert!(det.bbox.width >= 1.0 && det.bbox.height >= 1.0);
            }
        }
    }
}
