use serde::Serialize;
use std::sync::Arc;

/// Detections scoring at or below this are discarded. Fixed policy, not configurable.
pub const CONFIDENCE_THRESHOLD: f32 = 0.66;

/// Axis-aligned box in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Unfiltered backend output for one object in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class: String,
    /// Backend score in 0..=1.
    pub score: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(class: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            score,
            bbox,
        }
    }

    /// True when the score clears `CONFIDENCE_THRESHOLD` (strictly greater).
    pub fn passes_threshold(&self) -> bool {
        self.score > CONFIDENCE_THRESHOLD
    }
}

/// A detection that survived the confidence filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }

    /// Confidence as a whole percentage, rounded to nearest.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        Self {
            class: raw.class,
            confidence: raw.score,
            bbox: raw.bbox,
        }
    }
}

/// All detections surviving the filter for one detection cycle.
///
/// A set is built completely before it is published and is never mutated
/// afterwards; clones share the same `Arc` slice.
#[derive(Clone, Debug, Default)]
pub struct DetectionSet {
    cycle: u64,
    captured_at_ms: u64,
    detections: Arc<[Detection]>,
}

impl DetectionSet {
    /// Filter raw detections into a complete set. Input order is preserved.
    pub fn from_raw<I>(cycle: u64, captured_at_ms: u64, raw: I) -> Self
    where
        I: IntoIterator<Item = RawDetection>,
    {
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(RawDetection::passes_threshold)
            .map(Detection::from)
            .collect();
        Self {
            cycle,
            captured_at_ms,
            detections: detections.into(),
        }
    }

    /// Set before the first cycle completes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Detection cycle that produced this set (0 = no cycle yet).
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
