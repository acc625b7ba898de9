//! Uplink to the inference server.
//!
//! - `multipart`: the fixed-layout multipart/form-data encoder
//! - `http`: blocking HTTP client (`ureq`) plus the server's health/reset routes
//!
//! An upload either yields the full response body of an HTTP 200 reply or a
//! named `UploadError`. Nothing is retried here; retry policy belongs to the
//! control loop.

pub mod http;
pub mod multipart;

use std::fmt;

pub use http::{HttpUplink, ServerStatus};
pub use multipart::{build_multipart_body, MultipartLayout, BOUNDARY, CONTENT_TYPE};

/// Why an upload produced no usable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The request body could not be allocated. No network call was made.
    Allocation { requested: usize },
    /// Connection failure, timeout, or other transport-level error.
    Transport(String),
    /// The server answered with a status other than 200.
    Status { code: u16 },
    /// HTTP 200, but the body could not be read as text.
    Body(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Allocation { requested } => {
                write!(f, "could not allocate {} byte request body", requested)
            }
            UploadError::Transport(msg) => write!(f, "transport error: {}", msg),
            UploadError::Status { code } => write!(f, "server returned HTTP {}", code),
            UploadError::Body(msg) => write!(f, "unreadable response body: {}", msg),
        }
    }
}

impl std::error::Error for UploadError {}

/// Sends one JPEG still to the inference server.
pub trait Uplink {
    /// Blocking upload. Returns the response body text on HTTP 200.
    fn upload(&mut self, jpeg: &[u8]) -> Result<String, UploadError>;
}
