//! Object detection.
//!
//! The detector is an external collaborator: the loop hands it one frame and
//! keeps only the distinct labels it reports. Geometry is used for annotation.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{MotionBackend, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{Detection, DetectionResult, DetectionSet};
