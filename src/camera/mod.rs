//! Image sources.
//!
//! This module provides the camera side of a capture cycle:
//! - Stub camera (`stub://`, synthesized JPEG stills)
//! - Local files (a single JPEG or a directory of JPEGs, replayed in order)
//! - HTTP snapshot cameras (`http(s)://`, e.g. an ESP32-CAM `/capture` endpoint)
//! - V4L2 devices (`v4l2:///dev/videoN`, feature: camera-v4l2)
//!
//! Every source hands out `Frame`s from its own `FramePool`. Sensor setup
//! (resolution, quality, buffer count, orientation) happens once in `init`;
//! after that, each cycle calls `acquire` and then `release` exactly once.
//!
//! Sources MUST NOT:
//! - Store captured frames to disk
//! - Retain frames after release

pub mod file;
pub mod http;
pub mod stub;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::fmt;

use crate::frame::Frame;

pub use file::FileCamera;
pub use http::HttpSnapshotCamera;
pub use stub::StubCamera;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 4096;

/// One-time camera configuration applied at boot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1 (smallest) to 100 (best).
    pub jpeg_quality: u8,
    /// Number of capture buffers.
    pub frame_buffers: usize,
    pub vflip: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            jpeg_quality: 80,
            frame_buffers: 1,
            vflip: false,
        }
    }
}

/// Why a single acquisition produced no frame.
#[derive(Debug)]
pub enum AcquireError {
    /// `acquire` called before a successful `init`.
    NotReady,
    /// Every capture buffer is still held by the caller.
    NoFreeBuffer,
    /// The camera returned zero bytes.
    Empty,
    /// The buffer does not start with a JPEG SOI marker.
    NotJpeg,
    TooLarge(usize),
    Capture(String),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::NotReady => write!(f, "camera not initialized"),
            AcquireError::NoFreeBuffer => write!(f, "no free frame buffer"),
            AcquireError::Empty => write!(f, "empty frame"),
            AcquireError::NotJpeg => write!(f, "frame is not a jpeg image"),
            AcquireError::TooLarge(len) => write!(f, "frame too large ({} bytes)", len),
            AcquireError::Capture(msg) => write!(f, "capture failed: {}", msg),
        }
    }
}

impl std::error::Error for AcquireError {}

/// A camera the control loop can pull stills from.
pub trait ImageSource {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Apply the one-time configuration. Failure is fatal at boot.
    fn init(&mut self, settings: &CameraSettings) -> Result<()>;

    /// Capture one JPEG still.
    ///
    /// On error no frame exists and nothing must be released.
    fn acquire(&mut self) -> Result<Frame, AcquireError>;

    /// Hand a frame back to the source. Called exactly once per acquired frame.
    fn release(&mut self, frame: Frame);
}

/// Open an image source from a camera URI.
pub fn open(uri: &str) -> Result<Box<dyn ImageSource>> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("camera source must not be empty"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(StubCamera::new(uri)?));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Box::new(HttpSnapshotCamera::new(uri)?));
    }
    if let Some(device) = uri.strip_prefix("v4l2://") {
        #[cfg(feature = "camera-v4l2")]
        {
            return Ok(Box::new(V4l2Camera::new(device)));
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            return Err(anyhow!(
                "camera {} requires the camera-v4l2 feature",
                device
            ));
        }
    }
    if uri.contains("://") {
        return Err(anyhow!(
            "unsupported camera source '{}'; expected stub://, http(s)://, v4l2:// or a local path",
            uri
        ));
    }
    Ok(Box::new(FileCamera::new(uri)))
}
