//! Single-part multipart/form-data encoder.
//!
//! The body always has the same shape: one file part named `image`, filename
//! `capture.jpg`, type `image/jpeg`, wrapped in a fixed boundary. Head and tail
//! are compile-time constants, so the total length is known before anything
//! is allocated.

use std::ops::Range;

use super::UploadError;

macro_rules! boundary_token {
    () => {
        "----TrafficBeaconBoundary7MA4YWxk"
    };
}

/// Boundary token shared by the body and the request header.
pub const BOUNDARY: &str = boundary_token!();

/// Value of the request `Content-Type` header.
pub const CONTENT_TYPE: &str = concat!("multipart/form-data; boundary=", boundary_token!());

const HEAD: &str = concat!(
    "--",
    boundary_token!(),
    "\r\n",
    "Content-Disposition: form-data; name=\"image\"; filename=\"capture.jpg\"\r\n",
    "Content-Type: image/jpeg\r\n",
    "\r\n"
);

const TAIL: &str = concat!("\r\n--", boundary_token!(), "--\r\n");

/// Byte layout of an encoded body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultipartLayout {
    pub head_len: usize,
    pub image_len: usize,
    pub tail_len: usize,
}

impl MultipartLayout {
    pub fn for_len(image_len: usize) -> Self {
        Self {
            head_len: HEAD.len(),
            image_len,
            tail_len: TAIL.len(),
        }
    }

    /// Total body length, or `None` if it does not fit in `usize`.
    pub fn total(&self) -> Option<usize> {
        self.head_len
            .checked_add(self.image_len)?
            .checked_add(self.tail_len)
    }

    /// Where the image bytes sit inside the body.
    pub fn image_range(&self) -> Range<usize> {
        self.head_len..self.head_len + self.image_len
    }
}

/// Encode `jpeg` as the request body.
///
/// Allocates exactly `head + jpeg.len() + tail` bytes up front; allocation
/// failure is reported as `UploadError::Allocation`.
pub fn build_multipart_body(jpeg: &[u8]) -> Result<Vec<u8>, UploadError> {
    let layout = MultipartLayout::for_len(jpeg.len());
    let total = layout.total().ok_or(UploadError::Allocation {
        requested: usize::MAX,
    })?;

    let mut body = Vec::new();
    body.try_reserve_exact(total)
        .map_err(|_| UploadError::Allocation { requested: total })?;
    body.extend_from_slice(HEAD.as_bytes());
    body.extend_from_slice(jpeg);
    body.extend_from_slice(TAIL.as_bytes());
    debug_assert_eq!(body.len(), total);
    Ok(body)
}
