mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectorBackend, RawDetections};
pub use backends::{ScriptedBackend, StubBackend};
pub use registry::DetectorRegistry;
pub use result::{BoundingBox, Detection, DetectionSet, RawDetection, CONFIDENCE_THRESHOLD};
