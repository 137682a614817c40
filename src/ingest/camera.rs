//! Camera frame source.
//!
//! `CameraSource` maps a numeric camera index onto a capture device:
//! - `/dev/video{index}` by default, read through libv4l (feature: ingest-v4l2)
//! - `stub://<name>` for a synthetic scene used by tests and demos
//!
//! Synthetic devices accept query options to script failures:
//! - `stub://front?fail_open=1` refuses to open
//! - `stub://front?frames=3` fails the fourth read, as if the camera was unplugged

use anyhow::{anyhow, Context, Result};
#[cfg(feature = "ingest-v4l2")]
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::frame::Frame;

/// Highest camera index accepted from the user.
pub const MAX_CAMERA_INDEX: u32 = 10;

/// Largest frame width or height a source will be configured with.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Camera index (0 = default webcam, 1 = first external camera, ...).
    pub index: u32,
    /// Explicit device path, overriding the one derived from `index`.
    pub device: Option<String>,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested capture rate. The loop's own sleep still throttles polling.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            device: None,
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

impl CameraConfig {
    pub fn device_path(&self) -> String {
        self.device
            .clone()
            .unwrap_or_else(|| format!("/dev/video{}", self.index))
    }
}

/// Camera frame source.
pub struct CameraSource {
    index: u32,
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported(String),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.index > MAX_CAMERA_INDEX {
            return Err(anyhow!(
                "camera index {} out of range (0..={})",
                config.index,
                MAX_CAMERA_INDEX
            ));
        }
        if config.width == 0
            || config.height == 0
            || config.width > MAX_FRAME_DIMENSION
            || config.height > MAX_FRAME_DIMENSION
        {
            return Err(anyhow!(
                "frame size {}x{} out of range (1..={} per side)",
                config.width,
                config.height,
                MAX_FRAME_DIMENSION
            ));
        }
        let index = config.index;
        let device = config.device_path();
        let backend = if device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(config)?)
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(DeviceCamera::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                CameraBackend::Unsupported(device)
            }
        };
        Ok(Self { index, backend })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(device) => CameraStats {
                frames_captured: 0,
                device: device.clone(),
            },
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera {} ({})", self.index, self.stats().device)
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(device) => Err(anyhow!(
                "capturing from {} requires the ingest-v4l2 feature",
                device
            )),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => Err(anyhow!("camera not connected")),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.release(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => {}
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.connected,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => false,
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    device: String,
    fail_open: bool,
    frame_limit: Option<u64>,
    connected: bool,
    frame_count: u64,
    /// Changes every 50 frames so motion-based detectors see something.
    scene_state: u8,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Result<Self> {
        let device = config.device_path();
        let mut fail_open = false;
        let mut frame_limit = None;
        if let Some((_, query)) = device.split_once('?') {
            for pair in query.split('&').filter(|pair| !pair.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                match key {
                    "fail_open" => fail_open = matches!(value, "1" | "true" | ""),
                    "frames" => {
                        let limit = value
                            .parse::<u64>()
                            .with_context(|| format!("invalid frames option in {}", device))?;
                        frame_limit = Some(limit);
                    }
                    other => {
                        return Err(anyhow!("unknown stub camera option '{}'", other));
                    }
                }
            }
        }
        Ok(Self {
            config,
            device,
            fail_open,
            frame_limit,
            connected: false,
            frame_count: 0,
            scene_state: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(anyhow!("synthetic camera {} refused to open", self.device));
        }
        self.connected = true;
        log::info!("CameraSource: connected to {} (synthetic)", self.device);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic camera {} not connected", self.device));
        }
        if self
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            self.connected = false;
            return Err(anyhow!("synthetic camera {} disconnected", self.device));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels()?;
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    fn generate_pixels(&mut self) -> Result<Vec<u8>> {
        let pixel_count = crate::frame::rgb_len(self.config.width, self.config.height)?;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.scene_state as u64 * 37) % 256) as u8;
        }
        Ok(pixels)
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("CameraSource: released {} (synthetic)", self.device);
        }
        self.connected = false;
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 device camera
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    config: CameraConfig,
    device: String,
    state: Option<DeviceState>,
    format: super::normalize::PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "ingest-v4l2")]
#[ouroboros::self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            device: config.device_path(),
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: super::normalize::PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use super::normalize::PixelFormat;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported pixel format {} on {}",
                String::from_utf8_lossy(&format.fourcc.repr),
                self.device
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{}, {:?})",
            self.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;

        let pixels = super::normalize::normalize_to_rgb(
            buf,
            self.active_width,
            self.active_height,
            self.format,
        )?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(
            pixels,
            self.active_width,
            self.active_height,
            self.frame_count,
        )
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.device);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}
