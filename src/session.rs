//! Camera session context.
//!
//! Created when the camera stream starts and consumed when it is disabled. It
//! owns the shared state the components exchange (current-set slot, detection
//! log, viewport) and the task handles for the detection loop and overlay
//! renderer, plus the recorder.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::detect::{DetectionSet, DetectorBackend};
use crate::detection_log::SharedDetectionLog;
use crate::detection_loop::{DetectionLoop, LoopReport};
use crate::export::{ExportReport, ExportSink};
use crate::ingest::camera::{CameraStream, StreamHandle};
use crate::ingest::encoder::SegmentEncoder;
use crate::overlay::{OverlayFrame, OverlayRenderer, Viewport};
use crate::recorder::{Recorder, RecorderSettings, RecordingState};

/// What happened during a camera session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    /// `None` when no detector was ready and the loop never started.
    pub detection: Option<LoopReport>,
    pub redraws: u64,
    /// Report of the last recording exported in this session, if not yet collected.
    pub export: Option<ExportReport>,
}

pub struct AnnotationSession {
    stream: StreamHandle,
    current: watch::Receiver<DetectionSet>,
    viewport: Viewport,
    log: SharedDetectionLog,
    recorder: Recorder,
    detection: Option<JoinHandle<LoopReport>>,
    renderer: Option<JoinHandle<u64>>,
}

impl AnnotationSession {
    /// Start a session on a freshly enabled camera.
    ///
    /// With `detector == None` (model not loaded) the detection loop and overlay
    /// stay dormant; recording still works, without boxes.
    /// Must be called from inside a tokio runtime.
    pub fn enable_camera<C>(
        camera: C,
        detector: Option<Box<dyn DetectorBackend>>,
        encoder: Box<dyn SegmentEncoder>,
        exporter: Arc<dyn ExportSink>,
        settings: RecorderSettings,
    ) -> Self
    where
        C: CameraStream + 'static,
    {
        let stream = StreamHandle::new();
        let log = SharedDetectionLog::new();
        let (publisher, current) = watch::channel(DetectionSet::empty());
        let (renderer, viewport) = OverlayRenderer::new(current.clone());

        let (detection, renderer) = match detector {
            Some(detector) => {
                let detection = DetectionLoop::new(
                    camera,
                    detector,
                    publisher,
                    log.clone(),
                    stream.subscribe(),
                )
                .spawn();
                (Some(detection), Some(renderer.spawn()))
            }
            None => {
                log::warn!("detector not ready, detection loop stays dormant");
                (None, None)
            }
        };

        let recorder = Recorder::new(encoder, exporter, current.clone(), log.clone(), settings);
        Self {
            stream,
            current,
            viewport,
            log,
            recorder,
            detection,
            renderer,
        }
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    pub fn is_detecting(&self) -> bool {
        self.detection
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Latest published set.
    pub fn current_detections(&self) -> DetectionSet {
        self.current.borrow().clone()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport.clone()
    }

    pub fn overlay(&self) -> Arc<OverlayFrame> {
        self.viewport.current()
    }

    pub fn logged_detections(&self) -> usize {
        self.log.len()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn start_recording(&mut self) -> Result<bool> {
        self.recorder.start()
    }

    pub fn stop_recording(&mut self) -> bool {
        self.recorder.stop()
    }

    pub fn toggle_recording(&mut self) -> Result<bool> {
        self.recorder.toggle()
    }

    /// See `Recorder::wait_idle`.
    pub async fn wait_recording_idle(&mut self) -> Result<Option<ExportReport>> {
        self.recorder.wait_idle().await
    }

    /// Tear the session down.
    ///
    /// An active recording is stopped first and still drained and exported.
    pub async fn disable_camera(mut self) -> Result<SessionSummary> {
        if self.recorder.stop() {
            log::info!("camera disabled while recording, stopping recording");
        }
        self.stream.stop();

        let detection = match self.detection.take() {
            Some(handle) => Some(
                handle
                    .await
                    .map_err(|e| anyhow!("detection loop task failed: {}", e))?,
            ),
            None => None,
        };
        let redraws = match self.renderer.take() {
            Some(handle) => handle
                .await
                .map_err(|e| anyhow!("overlay renderer task failed: {}", e))?,
            None => 0,
        };
        let export = self.recorder.wait_idle().await?;
        log::info!("camera session closed");
        Ok(SessionSummary {
            detection,
            redraws,
            export,
        })
    }
}

impl Drop for AnnotationSession {
    fn drop(&mut self) {
        self.stream.stop();
    }
}
