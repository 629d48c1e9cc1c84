use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Lazy, unordered sequence of raw detections for one frame. May be empty.
pub type RawDetections<'a> = Box<dyn Iterator<Item = RawDetection> + Send + 'a>;

/// Detector backend trait.
///
/// Backends are stateful and not reentrant: `detect` takes `&mut self`, and the
/// detection loop owns its instance by value, so two cycles never overlap on the
/// same model.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An `Err` is an unrecoverable backend failure. Callers do not retry.
    fn detect<'a>(&'a mut self, frame: &Frame) -> Result<RawDetections<'a>>;

    /// Optional warm-up hook, run once before the first cycle.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
