use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Replays a fixed list of per-frame label sets.
///
/// Step `n` of the script is returned for the `n`-th call. Once the script is
/// exhausted the backend reports nothing, unless it was built with `looping`.
pub struct ScriptedBackend {
    script: Vec<Vec<String>>,
    position: usize,
    looping: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<String>>) -> Self {
        Self {
            script,
            position: 0,
            looping: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Convenience for tests: `ScriptedBackend::from_steps(&[&[], &["fire"]])`.
    pub fn from_steps(steps: &[&[&str]]) -> Self {
        Self::new(
            steps
                .iter()
                .map(|step| step.iter().map(|label| label.to_string()).collect())
                .collect(),
        )
    }

    fn next_step(&mut self) -> Option<&[String]> {
        if self.script.is_empty() {
            return None;
        }
        if self.position >= self.script.len() {
            if !self.looping {
                return None;
            }
            self.position = 0;
        }
        let step = &self.script[self.position];
        self.position += 1;
        Some(step)
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult> {
        let Some(labels) = self.next_step() else {
            return Ok(DetectionResult::default());
        };
        let count = labels.len().max(1) as f32;
        // Lay boxes out side by side so annotations stay readable.
        let detections = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                Detection::new(label.clone(), i as f32 / count, 0.25, 1.0 / count, 0.5, 0.9)
            })
            .collect();
        Ok(DetectionResult::new(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_steps_then_goes_quiet() -> Result<()> {
        let frame = Frame::filled(2, 2, 1, [0, 0, 0])?;
        let mut backend = ScriptedBackend::from_steps(&[&["fire"], &["fire", "smoke"]]);

        assert_eq!(backend.detect(&frame)?.label_set().summary(), "fire");
        assert_eq!(backend.detect(&frame)?.label_set().summary(), "fire, smoke");
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn looping_script_wraps_around() -> Result<()> {
        let frame = Frame::filled(2, 2, 1, [0, 0, 0])?;
        let mut backend = ScriptedBackend::from_steps(&[&["boat"], &[]]).looping();

        assert_eq!(backend.detect(&frame)?.label_set().summary(), "boat");
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.detect(&frame)?.label_set().summary(), "boat");
        Ok(())
    }
}
