//! Live Annotation Pipeline
//!
//! This crate annotates a live camera stream with object detections and, on
//! request, records the stream and exports it together with a text manifest
//! of everything detected while recording.
//!
//! # Architecture
//!
//! Two loops share one camera:
//!
//! 1. **Detection loop**: sample a frame, run the detector, keep detections with
//!    confidence above 0.66, publish them as the current set and append them to
//!    the detection log.
//! 2. **Capture pipeline**: while recording, buffer encoded segments in arrival
//!    order, burn the current set's boxes into each segment, and export the
//!    session once the queue has drained after a stop.
//!
//! The overlay renderer follows the current set and redraws the on-screen
//! annotation layer on every publication.
//!
//! # Module Structure
//!
//! - `frame`: decoded camera frames
//! - `ingest`: camera frame streams and segment encoders
//! - `detect`: detector backends, registry, detection types
//! - `detection_loop`: the detect/filter/publish/log cycle
//! - `detection_log`: session-scoped detection log
//! - `overlay`: annotation layer over the live view
//! - `annotate`: burning boxes into recorded segments
//! - `recorder`: recording state machine and session buffer
//! - `export`: video and manifest downloads
//! - `session`: the per-camera context tying the above together
//! - `config`: runtime configuration

pub mod annotate;
pub mod config;
pub mod detect;
pub mod detection_log;
pub mod detection_loop;
pub mod export;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod recorder;
pub mod session;

pub use annotate::annotate_segment;
pub use config::AnnotatorConfig;
pub use detect::{
    BoundingBox, Detection, DetectionSet, DetectorBackend, DetectorRegistry, RawDetection,
    ScriptedBackend, StubBackend, CONFIDENCE_THRESHOLD,
};
pub use detection_log::{DetectionLog, LogPolicy, SharedDetectionLog};
pub use detection_loop::{DetectionLoop, LoopExit, LoopReport};
pub use export::{
    export_session, render_manifest, DirectorySink, Download, ExportNames, ExportReport,
    ExportSink, MemorySink,
};
pub use frame::Frame;
pub use ingest::{
    CameraConfig, CameraStream, ChannelCamera, ExternalEncoder, MediaSegment, SegmentEncoder,
    StreamHandle, SyntheticCamera, SyntheticEncoder, SyntheticEncoderConfig,
};
pub use overlay::{OverlayElement, OverlayFrame, OverlayRenderer, Viewport};
pub use recorder::{Recorder, RecorderSettings, RecordingState, SessionBuffer};
pub use session::{AnnotationSession, SessionSummary};
