//! Live camera streams.
//!
//! A `CameraStream` is the pull side of the camera: the detection loop awaits
//! `next_frame` once per cycle. Whether the stream is *active* is tracked
//! separately by a `StreamHandle`, which the session flips when the camera is
//! disabled.
//!
//! - `SyntheticCamera`: generated frames for `stub://` URLs (tests, demos)
//! - `ChannelCamera`: frames pushed by an external capture task

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::frame::{Frame, RGB_CHANNELS};

/// Frame source for the detection loop.
#[async_trait]
pub trait CameraStream: Send {
    /// Next frame, or `Ok(None)` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Active/inactive flag for a camera stream.
///
/// Cloning shares the flag. Once stopped a handle never becomes active again;
/// re-enabling the camera creates a new handle.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    active: Arc<watch::Sender<bool>>,
}

impl StreamHandle {
    pub fn new() -> Self {
        let (active, _) = watch::channel(true);
        Self {
            active: Arc::new(active),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Mark the stream inactive. Returns false if it already was.
    pub fn stop(&self) -> bool {
        self.active.send_if_modified(|active| std::mem::replace(active, false))
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Camera URL. Only `stub://` is handled in-crate.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// End the stream after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// Generated scene: a gradient background with a bright square drifting across it.
pub struct SyntheticCamera {
    config: CameraConfig,
    interval: tokio::time::Interval,
    frame_count: u64,
    square: (u32, u32),
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "camera url '{}' is not supported (only stub:// sources are built in)",
                config.url
            ));
        }
        if config.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be > 0"));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        let period = Duration::from_millis(1000 / config.target_fps.max(1) as u64);
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        log::info!("SyntheticCamera: connected to {}", config.url);
        Ok(Self {
            config,
            interval,
            frame_count: 0,
            square: (0, 0),
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let (w, h) = (self.config.width, self.config.height);
        let side = (w.min(h) / 4).max(1);
        let mut rng = rand::thread_rng();
        self.square.0 = (self.square.0 + rng.gen_range(1..=4)) % w.saturating_sub(side).max(1);
        self.square.1 = (self.square.1 + rng.gen_range(0..=2)) % h.saturating_sub(side).max(1);
        let (sx, sy) = self.square;

        let mut pixels = vec![0u8; (w as usize) * (h as usize) * RGB_CHANNELS];
        for y in 0..h {
            for x in 0..w {
                let offset = ((y * w + x) as usize) * RGB_CHANNELS;
                let inside = x >= sx && x < sx + side && y >= sy && y < sy + side;
                let px = if inside {
                    [250, 250, 240]
                } else {
                    [(x * 255 / w) as u8, (y * 255 / h) as u8, 64]
                };
                pixels[offset..offset + RGB_CHANNELS].copy_from_slice(&px);
            }
        }
        pixels
    }
}

#[async_trait]
impl CameraStream for SyntheticCamera {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.interval.tick().await;
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.config.width, self.config.height, self.frame_count).map(Some)
    }
}

// ----------------------------------------------------------------------------
// Channel source
// ----------------------------------------------------------------------------

/// Camera fed through an mpsc channel. The stream ends when every sender is dropped.
pub struct ChannelCamera {
    frames: mpsc::Receiver<Frame>,
}

impl ChannelCamera {
    pub fn new(frames: mpsc::Receiver<Frame>) -> Self {
        Self { frames }
    }

    /// Create a camera together with the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl CameraStream for ChannelCamera {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.recv().await)
    }
}
