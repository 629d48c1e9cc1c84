//! Encoded media segments and the stream encoders that emit them.
//!
//! The recorder arms an encoder with a `SegmentSink` when recording starts and
//! disarms it on stop. Segments are pushed in production order; the sink is an
//! ordered queue into the capture pipeline.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::annotate::encode_png;
use crate::frame::now_ms;

pub const MIME_PNG: &str = "image/png";
pub const MIME_WEBM: &str = "video/webm";

/// One encoded chunk of captured video.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaSegment {
    data: Arc<[u8]>,
    pub mime: String,
    /// Producer timestamp in milliseconds since the epoch.
    pub captured_at_ms: u64,
    /// True when the overlay was composited onto this segment.
    pub annotated: bool,
}

impl MediaSegment {
    pub fn new(data: Vec<u8>, mime: impl Into<String>, captured_at_ms: u64) -> Self {
        Self {
            data: data.into(),
            mime: mime.into(),
            captured_at_ms,
            annotated: false,
        }
    }

    /// Replacement segment carrying composited media for the same capture time.
    pub fn annotated_from(original: &MediaSegment, data: Vec<u8>, mime: &str) -> Self {
        Self {
            data: data.into(),
            mime: mime.to_string(),
            captured_at_ms: original.captured_at_ms,
            annotated: true,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered queue handed to an armed encoder.
#[derive(Clone, Debug)]
pub struct SegmentSink {
    tx: mpsc::Sender<MediaSegment>,
}

impl SegmentSink {
    pub fn new(tx: mpsc::Sender<MediaSegment>) -> Self {
        Self { tx }
    }

    /// Push a segment. Returns false once the recorder stopped accepting segments.
    pub async fn push(&self, segment: MediaSegment) -> bool {
        self.tx.send(segment).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Stream encoder started and stopped by the recorder.
pub trait SegmentEncoder: Send {
    fn name(&self) -> &'static str;

    /// Begin emitting segments into `sink`.
    fn arm(&mut self, sink: SegmentSink) -> Result<()>;

    /// Stop emitting. Segments already pushed stay queued.
    fn disarm(&mut self);

    fn is_armed(&self) -> bool;
}

// ----------------------------------------------------------------------------
// External encoder bridge
// ----------------------------------------------------------------------------

/// Bridge for a recorder that lives outside the crate.
///
/// Clones share state: the recorder holds one clone (as its `SegmentEncoder`),
/// the external producer holds another and calls `emit` for each chunk.
#[derive(Clone, Default)]
pub struct ExternalEncoder {
    sink: Arc<Mutex<Option<SegmentSink>>>,
}

impl ExternalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a segment. Returns false when not armed or the recorder is stopping.
    pub async fn emit(&self, segment: MediaSegment) -> bool {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match sink {
            Some(sink) => sink.push(segment).await,
            None => false,
        }
    }
}

impl SegmentEncoder for ExternalEncoder {
    fn name(&self) -> &'static str {
        "external"
    }

    fn arm(&mut self, sink: SegmentSink) -> Result<()> {
        let mut guard = self
            .sink
            .lock()
            .map_err(|_| anyhow!("external encoder lock poisoned"))?;
        *guard = Some(sink);
        Ok(())
    }

    fn disarm(&mut self) {
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    fn is_armed(&self) -> bool {
        self.sink
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

// ----------------------------------------------------------------------------
// Synthetic encoder
// ----------------------------------------------------------------------------

/// Configuration for the synthetic encoder.
#[derive(Clone, Debug)]
pub struct SyntheticEncoderConfig {
    pub width: u32,
    pub height: u32,
    /// Time between emitted segments.
    pub segment_interval: Duration,
}

impl Default for SyntheticEncoderConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            segment_interval: Duration::from_millis(250),
        }
    }
}

/// Emits one PNG still per interval while armed.
///
/// Runs as its own task. Must be armed from inside a tokio runtime.
pub struct SyntheticEncoder {
    config: SyntheticEncoderConfig,
    running: Option<(watch::Sender<bool>, JoinHandle<u64>)>,
}

impl SyntheticEncoder {
    pub fn new(config: SyntheticEncoderConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("encoder dimensions must be non-zero"));
        }
        if config.segment_interval.is_zero() {
            return Err(anyhow!("encoder segment interval must be > 0"));
        }
        Ok(Self {
            config,
            running: None,
        })
    }
}

impl SegmentEncoder for SyntheticEncoder {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn arm(&mut self, sink: SegmentSink) -> Result<()> {
        if self.running.is_some() {
            return Err(anyhow!("synthetic encoder already armed"));
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.segment_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so segments span an interval.
            interval.tick().await;
            let mut emitted = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {}
                }
                if sink.is_closed() {
                    break;
                }
                let segment = match render_segment(&config, emitted) {
                    Ok(segment) => segment,
                    Err(e) => {
                        log::warn!("synthetic encoder failed to render segment: {}", e);
                        break;
                    }
                };
                if !sink.push(segment).await {
                    break;
                }
                emitted += 1;
            }
            emitted
        });
        self.running = Some((stop_tx, handle));
        Ok(())
    }

    fn disarm(&mut self) {
        if let Some((stop_tx, _handle)) = self.running.take() {
            let _ = stop_tx.send(true);
        }
    }

    fn is_armed(&self) -> bool {
        self.running.is_some()
    }
}

fn render_segment(config: &SyntheticEncoderConfig, index: u64) -> Result<MediaSegment> {
    let (w, h) = (config.width, config.height);
    let shift = (index.wrapping_mul(7) % w as u64) as u32;
    let image = RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (((x + shift) % w) * 255 / w) as u8,
            (y * 255 / h) as u8,
            96,
        ])
    });
    Ok(MediaSegment::new(encode_png(image)?, MIME_PNG, now_ms()))
}
