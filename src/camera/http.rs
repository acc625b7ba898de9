//! HTTP snapshot camera.
//!
//! Fetches one JPEG per acquisition from a snapshot endpoint, such as the
//! `/capture` handler of an ESP32-CAM web server. Each fetch is bounded by
//! `SNAPSHOT_TIMEOUT`, so a stalled camera shows up as a capture miss instead
//! of blocking the cycle indefinitely.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::{AcquireError, CameraSettings, ImageSource};
use crate::frame::{Frame, FramePool, MAX_FRAME_BYTES};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSnapshotCamera {
    url: String,
    agent: ureq::Agent,
    pool: Option<FramePool>,
}

impl HttpSnapshotCamera {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).context("parse snapshot camera url")?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported snapshot scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(SNAPSHOT_TIMEOUT).build(),
            pool: None,
        })
    }
}

impl ImageSource for HttpSnapshotCamera {
    fn name(&self) -> &str {
        &self.url
    }

    fn init(&mut self, settings: &CameraSettings) -> Result<()> {
        // Sensor configuration lives on the camera board; verify it answers
        // with a JPEG before the loop starts.
        let mut probe = Vec::new();
        fetch_snapshot(&self.agent, &self.url, &mut probe)
            .map_err(|err| anyhow!("snapshot camera {} not ready: {}", self.url, err))?;
        crate::frame::jpeg_len(&probe)
            .map_err(|err| anyhow!("snapshot camera {} returned bad data: {}", self.url, err))?;

        self.pool = Some(FramePool::new(settings.frame_buffers));
        log::info!(
            "HttpSnapshotCamera: {} ready (probe {} bytes, {} buffer(s))",
            self.url,
            probe.len(),
            settings.frame_buffers
        );
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError> {
        let pool = self.pool.as_mut().ok_or(AcquireError::NotReady)?;
        let agent = &self.agent;
        let url = &self.url;
        pool.fill(|buf| fetch_snapshot(agent, url, buf))
    }

    fn release(&mut self, frame: Frame) {
        if let Some(pool) = self.pool.as_mut() {
            pool.reclaim(frame);
        }
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str, buf: &mut Vec<u8>) -> Result<(), AcquireError> {
    let response = agent
        .get(url)
        .call()
        .map_err(|err| AcquireError::Capture(format!("fetch snapshot from {}: {}", url, err)))?;
    response
        .into_reader()
        .take(MAX_FRAME_BYTES as u64 + 1)
        .read_to_end(buf)
        .map_err(|err| AcquireError::Capture(format!("read snapshot: {}", err)))?;
    Ok(())
}
