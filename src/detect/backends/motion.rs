use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Frame-difference backend. Reports a whole-frame `motion` detection whenever
/// the frame content changes from the previous one.
#[derive(Default)]
pub struct MotionBackend {
    last_hash: Option<[u8; 32]>,
}

impl MotionBackend {
    pub const LABEL: &'static str = "motion";

    pub fn new() -> Self {
        Self::default()
    }
}

impl DetectorBackend for MotionBackend {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let current_hash: [u8; 32] = Sha256::digest(frame.pixels()).into();

        let motion = self.last_hash.is_some_and(|prev| prev != current_hash);

        self.last_hash = Some(current_hash);

        if motion {
            Ok(DetectionResult::new(vec![Detection::whole_frame(
                Self::LABEL,
                0.85,
            )]))
        } else {
            Ok(DetectionResult::default())
        }
    }
}
