//! Captured frame ownership.
//!
//! - `Frame`: one JPEG still, exclusively owned by the cycle that acquired it.
//! - `FramePool`: the fixed set of capture buffers configured at camera init.
//!
//! A `Frame` is carved out of a pool buffer on acquire and the buffer goes back
//! to the pool on release. `Frame` is deliberately not `Clone`, and release
//! takes it by value, so a frame can be handed back at most once and cannot be
//! read after it was handed back.

use crate::camera::AcquireError;

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound for a single captured still.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

// Explicitly NOT implementing Clone or Copy.
pub struct Frame {
    data: Vec<u8>,
    len: usize,
    sequence: u64,
}

impl Frame {
    /// The JPEG bytes, trimmed to the end-of-image marker.
    pub fn as_jpeg(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Monotonic capture number assigned by the pool.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Fixed-capacity pool of capture buffers.
#[derive(Debug)]
pub struct FramePool {
    free: Vec<Vec<u8>>,
    capacity: usize,
    sequence: u64,
}

impl FramePool {
    pub fn new(buffers: usize) -> Self {
        Self {
            free: (0..buffers).map(|_| Vec::new()).collect(),
            capacity: buffers,
            sequence: 0,
        }
    }

    /// Buffers currently available for capture.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Frames handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.free.len()
    }

    /// Take a free buffer, let `fill` write one JPEG image into it, and wrap
    /// the result as a `Frame`.
    ///
    /// On any failure the buffer goes straight back to the pool, so a failed
    /// acquisition never leaves anything for the caller to release.
    pub fn fill<F>(&mut self, fill: F) -> Result<Frame, AcquireError>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), AcquireError>,
    {
        let mut buffer = self.free.pop().ok_or(AcquireError::NoFreeBuffer)?;
        buffer.clear();

        let len = match fill(&mut buffer).and_then(|()| jpeg_len(&buffer)) {
            Ok(len) => len,
            Err(err) => {
                buffer.clear();
                self.free.push(buffer);
                return Err(err);
            }
        };

        self.sequence += 1;
        Ok(Frame {
            data: buffer,
            len,
            sequence: self.sequence,
        })
    }

    /// Return a frame's buffer to the pool.
    pub fn reclaim(&mut self, frame: Frame) {
        if self.free.len() >= self.capacity {
            log::warn!(
                "frame pool: frame #{} does not belong to this pool; dropping buffer",
                frame.sequence
            );
            return;
        }
        let mut buffer = frame.data;
        buffer.clear();
        self.free.push(buffer);
    }
}

/// Validate a captured JPEG buffer and return its effective length.
///
/// The buffer must begin with the SOI marker. Sensors commonly pad the DMA
/// buffer past the image, so the length is cut at the last EOI marker; a
/// buffer without one is taken whole.
pub fn jpeg_len(buffer: &[u8]) -> Result<usize, AcquireError> {
    if buffer.is_empty() {
        return Err(AcquireError::Empty);
    }
    if buffer.len() > MAX_FRAME_BYTES {
        return Err(AcquireError::TooLarge(buffer.len()));
    }
    if !buffer.starts_with(&JPEG_SOI) {
        return Err(AcquireError::NotJpeg);
    }
    for i in (1..buffer.len()).rev() {
        if buffer[i - 1] == JPEG_EOI[0] && buffer[i] == JPEG_EOI[1] {
            return Ok(i + 1);
        }
    }
    Ok(buffer.len())
}
