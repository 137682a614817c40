use std::collections::BTreeSet;

/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Distinct labels observed in this frame.
    pub fn label_set(&self) -> DetectionSet {
        self.detections
            .iter()
            .map(|detection| detection.label.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// One labeled box. Coordinates are normalized to 0..1 of the frame size,
/// `x`/`y` being the top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            w,
            h,
            confidence,
        }
    }

    /// Detection covering the whole frame.
    pub fn whole_frame(label: impl Into<String>, confidence: f32) -> Self {
        Self::new(label, 0.0, 0.0, 1.0, 1.0, confidence)
    }
}

/// The distinct labels found in one frame.
///
/// Ordering is by label so that the same set always yields the same summary,
/// whatever order the detector reported boxes in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionSet {
    labels: BTreeSet<String>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Joined, order-insensitive label string, e.g. `"fire, smoke"`.
    pub fn summary(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|label| label.as_ref().trim().to_string())
                .filter(|label| !label.is_empty())
                .collect(),
        }
    }
}
