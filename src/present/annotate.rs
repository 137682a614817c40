//! Box drawing on RGB frames.

use sha2::{Digest, Sha256};

use crate::detect::{Detection, DetectionResult};
use crate::frame::Frame;

const LINE_WIDTH: u32 = 2;

const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 178, 29],
    [72, 249, 10],
    [0, 194, 255],
    [255, 55, 199],
];

/// Stable colour for a label, so the same class keeps its colour across frames.
pub fn label_color(label: &str) -> [u8; 3] {
    let digest = Sha256::digest(label.as_bytes());
    PALETTE[digest[0] as usize % PALETTE.len()]
}

/// Copy of `frame` with an outline drawn around every detection.
pub fn annotate(frame: &Frame, result: &DetectionResult) -> Frame {
    let mut annotated = frame.clone();
    for detection in &result.detections {
        draw_box(&mut annotated, detection);
    }
    annotated
}

fn draw_box(frame: &mut Frame, detection: &Detection) {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return;
    }
    let to_px = |v: f32, extent: u32| -> u32 {
        ((v.clamp(0.0, 1.0) * extent as f32) as u32).min(extent - 1)
    };
    let x0 = to_px(detection.x, width);
    let y0 = to_px(detection.y, height);
    let x1 = to_px(detection.x + detection.w, width);
    let y1 = to_px(detection.y + detection.h, height);
    let color = label_color(&detection.label);
    let pixels = frame.pixels_mut();

    for y in y0..=y1 {
        for x in x0..=x1 {
            let on_edge = x < x0 + LINE_WIDTH
                || x + LINE_WIDTH > x1
                || y < y0 + LINE_WIDTH
                || y + LINE_WIDTH > y1;
            if on_edge {
                let offset = (y as usize * width as usize + x as usize) * 3;
                pixels[offset..offset + 3].copy_from_slice(&color);
            }
        }
    }
}
