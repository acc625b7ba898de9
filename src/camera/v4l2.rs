//! V4L2 camera (feature: camera-v4l2).
//!
//! Captures MJPEG stills from a local device node (e.g. `/dev/video0`). The
//! device is asked for the `MJPG` pixel format, so each dequeued buffer is
//! already a complete JPEG image and is copied straight into a pool buffer.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::{AcquireError, CameraSettings, ImageSource};
use crate::frame::{Frame, FramePool};

/// V4L2_CID_VFLIP
const CID_VFLIP: u32 = 0x0098_0915;

pub struct V4l2Camera {
    device: String,
    state: Option<V4l2State>,
    pool: Option<FramePool>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            state: None,
            pool: None,
        }
    }
}

impl ImageSource for V4l2Camera {
    fn name(&self) -> &str {
        &self.device
    }

    fn init(&mut self, settings: &CameraSettings) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");
        let format = device
            .set_format(&format)
            .with_context(|| format!("set MJPG format on {}", self.device))?;
        if format.fourcc != v4l::FourCC::new(b"MJPG") {
            return Err(anyhow!(
                "{} does not support MJPG capture (got {})",
                self.device,
                format.fourcc
            ));
        }

        if settings.vflip {
            let control = v4l::control::Control {
                id: CID_VFLIP,
                value: v4l::control::Value::Boolean(true),
            };
            if let Err(err) = device.set_control(control) {
                log::warn!("V4l2Camera: vflip not supported on {}: {}", self.device, err);
            }
        }

        let buffers = settings.frame_buffers.max(1) as u32;
        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, buffers)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        self.state = Some(state);
        self.pool = Some(FramePool::new(settings.frame_buffers));
        log::info!(
            "V4l2Camera: {} ready ({}x{} MJPG, {} buffer(s))",
            self.device,
            format.width,
            format.height,
            settings.frame_buffers
        );
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().ok_or(AcquireError::NotReady)?;
        let pool = self.pool.as_mut().ok_or(AcquireError::NotReady)?;
        pool.fill(|buf| {
            state.with_mut(|fields| {
                let (data, meta) = fields
                    .stream
                    .next()
                    .map_err(|err| AcquireError::Capture(format!("dequeue v4l2 buffer: {}", err)))?;
                let used = match meta.bytesused as usize {
                    0 => data.len(),
                    n => n.min(data.len()),
                };
                buf.extend_from_slice(&data[..used]);
                Ok(())
            })
        })
    }

    fn release(&mut self, frame: Frame) {
        if let Some(pool) = self.pool.as_mut() {
            pool.reclaim(frame);
        }
    }
}
