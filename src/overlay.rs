//! On-screen annotation layer.
//!
//! The renderer follows the current-set slot and rebuilds the whole element
//! list for each new publication. The viewport is swapped with one
//! `send_replace`, so a viewer sees either the previous frame's elements or the
//! new ones, never a mix.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::detect::{Detection, DetectionSet};

/// Vertical offset of a label above its box, in pixels.
pub const LABEL_OFFSET_Y: f32 = 10.0;
/// Labels are this much narrower than their box.
pub const LABEL_WIDTH_INSET: f32 = 10.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayElement {
    /// Box outline over the detected object.
    Highlight {
        left: f32,
        top: f32,
        width: f32,
        height: f32,
    },
    /// Caption just above the box.
    Label {
        text: String,
        left: f32,
        top: f32,
        width: f32,
    },
}

impl OverlayElement {
    pub fn highlight(detection: &Detection) -> Self {
        let b = &detection.bbox;
        Self::Highlight {
            left: b.x,
            top: b.y,
            width: b.width,
            height: b.height,
        }
    }

    pub fn label(detection: &Detection) -> Self {
        let b = &detection.bbox;
        Self::Label {
            text: label_text(detection),
            left: b.x,
            top: b.y - LABEL_OFFSET_Y,
            width: b.width - LABEL_WIDTH_INSET,
        }
    }
}

/// `"<class> - with <pct>% confidence."`
pub fn label_text(detection: &Detection) -> String {
    format!(
        "{} - with {}% confidence.",
        detection.class,
        detection.confidence_percent()
    )
}

/// Everything drawn over the video for one detection cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OverlayFrame {
    /// Cycle of the `DetectionSet` this frame was built from.
    pub cycle: u64,
    pub elements: Vec<OverlayElement>,
}

impl OverlayFrame {
    /// Highlight then label for each detection, in set order.
    pub fn from_set(set: &DetectionSet) -> Self {
        let elements = set
            .iter()
            .flat_map(|d| [OverlayElement::highlight(d), OverlayElement::label(d)])
            .collect();
        Self {
            cycle: set.cycle(),
            elements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Read side of the annotation layer.
#[derive(Clone, Debug)]
pub struct Viewport {
    rx: watch::Receiver<Arc<OverlayFrame>>,
}

impl Viewport {
    /// Elements currently on screen.
    pub fn current(&self) -> Arc<OverlayFrame> {
        self.rx.borrow().clone()
    }

    /// Wait for the next redraw. Returns `None` once the renderer is gone.
    pub async fn changed(&mut self) -> Option<Arc<OverlayFrame>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Redraws the viewport on every published `DetectionSet`.
pub struct OverlayRenderer {
    sets: watch::Receiver<DetectionSet>,
    screen: watch::Sender<Arc<OverlayFrame>>,
}

impl OverlayRenderer {
    pub fn new(sets: watch::Receiver<DetectionSet>) -> (Self, Viewport) {
        let (screen, rx) = watch::channel(Arc::new(OverlayFrame::default()));
        (Self { sets, screen }, Viewport { rx })
    }

    /// Render one set. Old elements are dropped, not reused.
    pub fn render(&self, set: &DetectionSet) {
        self.screen.send_replace(Arc::new(OverlayFrame::from_set(set)));
    }

    /// Run until the detection loop drops its publisher. Returns the number of redraws.
    pub async fn run(mut self) -> u64 {
        let mut redraws = 0u64;
        while self.sets.changed().await.is_ok() {
            let set = self.sets.borrow_and_update().clone();
            self.render(&set);
            redraws += 1;
        }
        // Stream gone: clear the layer.
        self.screen.send_replace(Arc::new(OverlayFrame::default()));
        redraws
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, RawDetection};

    fn set(cycle: u64, items: &[(&str, f32)]) -> DetectionSet {
        DetectionSet::from_raw(
            cycle,
            0,
            items.iter().map(|(class, score)| {
                RawDetection::new(*class, *score, BoundingBox::new(50.0, 40.0, 120.0, 80.0))
            }),
        )
    }

    #[test]
    fn overlay_frame_places_label_above_box() {
        let frame = OverlayFrame::from_set(&set(4, &[("person", 0.876)]));
        assert_eq!(frame.cycle, 4);
        assert_eq!(
            frame.elements,
            vec![
                OverlayElement::Highlight {
                    left: 50.0,
                    top: 40.0,
                    width: 120.0,
                    height: 80.0,
                },
                OverlayElement::Label {
                    text: "person - with 88% confidence.".to_string(),
                    left: 50.0,
                    top: 30.0,
                    width: 110.0,
                },
            ]
        );
    }

    #[test]
    fn empty_set_renders_nothing() {
        assert!(OverlayFrame::from_set(&DetectionSet::empty()).is_empty());
    }

    #[tokio::test]
    async fn renderer_replaces_whole_frames_and_clears_on_shutdown() {
        let (publisher, sets) = watch::channel(DetectionSet::empty());
        let (renderer, mut viewport) = OverlayRenderer::new(sets);
        let handle = renderer.spawn();

        publisher.send_replace(set(1, &[("cat", 0.9), ("dog", 0.8)]));
        let first = viewport.changed().await.expect("first redraw");
        assert_eq!(first.cycle, 1);
        assert_eq!(first.elements.len(), 4);

        publisher.send_replace(set(2, &[("cup", 0.7)]));
        let second = viewport.changed().await.expect("second redraw");
        assert_eq!(second.cycle, 2);
        assert_eq!(second.elements.len(), 2);

        drop(publisher);
        assert!(handle.await.unwrap() >= 2);
        assert!(viewport.current().is_empty());
    }
}
