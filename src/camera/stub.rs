//! Synthetic camera (`stub://`) for tests and bench runs.
//!
//! Produces real JPEG stills encoded from a moving gradient, so everything
//! downstream (multipart encoding, the server's decoder) sees valid images.
//! `stub://name?fail_every=N` makes every Nth acquisition fail, which is handy
//! for exercising the failure streak on a bench.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use url::Url;

use super::{AcquireError, CameraSettings, ImageSource, MAX_DIMENSION};
use crate::frame::{Frame, FramePool};

pub struct StubCamera {
    uri: String,
    fail_every: Option<u64>,
    settings: CameraSettings,
    pool: Option<FramePool>,
    attempts: u64,
}

impl StubCamera {
    pub fn new(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).with_context(|| format!("parse stub camera uri {}", uri))?;
        let mut fail_every = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "fail_every" => {
                    let n: u64 = value
                        .parse()
                        .map_err(|_| anyhow!("fail_every must be a positive integer"))?;
                    if n == 0 {
                        return Err(anyhow!("fail_every must be a positive integer"));
                    }
                    fail_every = Some(n);
                }
                other => log::warn!("StubCamera: ignoring unknown option '{}'", other),
            }
        }
        Ok(Self {
            uri: uri.to_string(),
            fail_every,
            settings: CameraSettings::default(),
            pool: None,
            attempts: 0,
        })
    }

    fn synthesize(&self, out: &mut Vec<u8>) -> Result<(), AcquireError> {
        let width = self.settings.width;
        let height = self.settings.height;
        let shift = (self.attempts % 256) as u32;
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(3))
            .ok_or_else(|| AcquireError::Capture(format!("{}x{} frame too large", width, height)))?;
        let mut pixels = Vec::with_capacity(len);
        for row in 0..height {
            let y = if self.settings.vflip { height - 1 - row } else { row };
            for x in 0..width {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y * 255) / height.max(1)) as u8);
                pixels.push(((x ^ y) % 256) as u8);
            }
        }
        JpegEncoder::new_with_quality(out, self.settings.jpeg_quality)
            .encode(&pixels, width, height, ExtendedColorType::Rgb8)
            .map_err(|err| AcquireError::Capture(format!("jpeg encode: {}", err)))
    }
}

impl ImageSource for StubCamera {
    fn name(&self) -> &str {
        &self.uri
    }

    fn init(&mut self, settings: &CameraSettings) -> Result<()> {
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!("stub camera resolution must be non-zero"));
        }
        if settings.width > MAX_DIMENSION || settings.height > MAX_DIMENSION {
            return Err(anyhow!(
                "stub camera resolution {}x{} exceeds {}x{}",
                settings.width,
                settings.height,
                MAX_DIMENSION,
                MAX_DIMENSION
            ));
        }
        self.settings = settings.clone();
        self.pool = Some(FramePool::new(settings.frame_buffers));
        log::info!(
            "StubCamera: {} ready ({}x{}, quality {}, {} buffer(s))",
            self.uri,
            settings.width,
            settings.height,
            settings.jpeg_quality,
            settings.frame_buffers
        );
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError> {
        self.attempts += 1;
        if let Some(n) = self.fail_every {
            if self.attempts % n == 0 {
                return Err(AcquireError::Capture("simulated capture miss".into()));
            }
        }
        let mut pool = self.pool.take().ok_or(AcquireError::NotReady)?;
        let result = pool.fill(|buf| self.synthesize(buf));
        self.pool = Some(pool);
        result
    }

    fn release(&mut self, frame: Frame) {
        if let Some(pool) = self.pool.as_mut() {
            pool.reclaim(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::JPEG_SOI;

    fn small_settings() -> CameraSettings {
        CameraSettings {
            width: 32,
            height: 24,
            jpeg_quality: 60,
            frame_buffers: 1,
            vflip: true,
        }
    }

    #[test]
    fn stub_camera_produces_jpeg_stills() -> Result<()> {
        let mut camera = StubCamera::new("stub://bench")?;
        camera.init(&small_settings())?;

        let frame = camera.acquire().expect("frame");
        assert!(frame.as_jpeg().starts_with(&JPEG_SOI));
        assert!(frame.as_jpeg().ends_with(&[0xFF, 0xD9]));
        camera.release(frame);
        Ok(())
    }

    #[test]
    fn stub_camera_requires_init() -> Result<()> {
        let mut camera = StubCamera::new("stub://bench")?;
        assert!(matches!(camera.acquire(), Err(AcquireError::NotReady)));
        Ok(())
    }

    #[test]
    fn stub_camera_blocks_when_frame_not_released() -> Result<()> {
        let mut camera = StubCamera::new("stub://bench")?;
        camera.init(&small_settings())?;
        let held = camera.acquire().expect("frame");
        assert!(matches!(camera.acquire(), Err(AcquireError::NoFreeBuffer)));
        camera.release(held);
        assert!(camera.acquire().is_ok());
        Ok(())
    }

    #[test]
    fn oversized_resolution_is_rejected_at_init() -> Result<()> {
        let mut camera = StubCamera::new("stub://bench")?;
        let huge = CameraSettings {
            width: 40_000,
            height: 40_000,
            ..small_settings()
        };
        assert!(camera.init(&huge).is_err());
        assert!(matches!(camera.acquire(), Err(AcquireError::NotReady)));
        Ok(())
    }

    #[test]
    fn pixel_buffer_size_overflow_is_a_capture_error() -> Result<()> {
        let mut camera = StubCamera::new("stub://bench")?;
        camera.settings.width = u32::MAX;
        camera.settings.height = u32::MAX;
        let mut out = Vec::new();
        assert!(matches!(
            camera.synthesize(&mut out),
            Err(AcquireError::Capture(_))
        ));
        Ok(())
    }

    #[test]
    fn fail_every_injects_capture_misses() -> Result<()> {
        let mut camera = StubCamera::new("stub://bench?fail_every=2")?;
        camera.init(&small_settings())?;
        let frame = camera.acquire().expect("first capture succeeds");
        camera.release(frame);
        assert!(matches!(camera.acquire(), Err(AcquireError::Capture(_))));
        assert!(StubCamera::new("stub://bench?fail_every=0").is_err());
        Ok(())
    }
}
