//! Blocking HTTP uplink built on `ureq`.
//!
//! Besides the per-cycle `POST` of a still, the server exposes two routes the
//! node uses at boot only:
//! - `GET /` health check (reports status and how many images it processed)
//! - `POST /reset` clears the server's decision smoothing history

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{build_multipart_body, Uplink, UploadError, CONTENT_TYPE};

/// Reply of the server's health route. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub images_processed: Option<u64>,
}

pub struct HttpUplink {
    agent: ureq::Agent,
    url: Url,
    timeout: Duration,
}

impl HttpUplink {
    /// `url` is the analyze endpoint, e.g. `http://192.168.1.100:5000/analyze`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).context("parse server url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported server scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if timeout.is_zero() {
            return Err(anyhow!("http timeout must be greater than zero"));
        }
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query the server's health route.
    pub fn probe_health(&self) -> Result<ServerStatus> {
        let root = self.url.join("/").context("derive server root url")?;
        let response = self
            .agent
            .get(root.as_str())
            .call()
            .with_context(|| format!("health check {}", root))?;
        let body = response.into_string().context("read health reply")?;
        serde_json::from_str(&body).map_err(|e| anyhow!("invalid health reply: {}", e))
    }

    /// Clear the server's decision history.
    pub fn reset_history(&self) -> Result<()> {
        let reset = self.url.join("/reset").context("derive reset url")?;
        self.agent
            .post(reset.as_str())
            .call()
            .with_context(|| format!("reset history {}", reset))?;
        Ok(())
    }
}

impl Uplink for HttpUplink {
    fn upload(&mut self, jpeg: &[u8]) -> Result<String, UploadError> {
        let body = build_multipart_body(jpeg)?;
        let response = match self
            .agent
            .post(self.url.as_str())
            .set("Content-Type", CONTENT_TYPE)
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(UploadError::Status { code }),
            Err(ureq::Error::Transport(transport)) => {
                return Err(UploadError::Transport(transport.to_string()))
            }
        };
        if response.status() != 200 {
            return Err(UploadError::Status {
                code: response.status(),
            });
        }
        response
            .into_string()
            .map_err(|err| UploadError::Body(err.to_string()))
    }
}
