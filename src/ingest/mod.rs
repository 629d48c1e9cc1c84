//! Media ingestion.
//!
//! Two sides of the same camera:
//! - `camera`: the frame stream the detection loop samples
//! - `encoder`: the segment stream the recorder buffers while recording
//!
//! Frames are never written anywhere by this layer. Segments only leave the
//! process through an export.

pub mod camera;
pub mod encoder;

pub use camera::{CameraConfig, CameraStream, ChannelCamera, StreamHandle, SyntheticCamera};
pub use encoder::{
    ExternalEncoder, MediaSegment, SegmentEncoder, SegmentSink, SyntheticEncoder,
    SyntheticEncoderConfig,
};
