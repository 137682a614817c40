//! Frame ingestion.
//!
//! A frame source is opened once per run and then polled by the detection loop:
//! - `connect` opens the capture device; failure is terminal for the run
//! - `next_frame` reads one frame; failure is terminal for the run
//! - `release` closes the device and is safe to call more than once
//!
//! There is no retry or reconnect logic at this layer. The loop decides what a
//! failure means for the run.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;

use anyhow::Result;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource, CameraStats, MAX_CAMERA_INDEX, MAX_FRAME_DIMENSION};

/// Something the detection loop can pull frames from.
pub trait FrameSource {
    /// Human readable name of the device, used in status messages.
    fn describe(&self) -> String;

    /// Open the device.
    fn connect(&mut self) -> Result<()>;

    /// Read the next frame. Blocks until one is available.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Release the device. Idempotent.
    fn release(&mut self);

    fn is_healthy(&self) -> bool {
        true
    }
}
