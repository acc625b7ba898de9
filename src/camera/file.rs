//! Local file camera.
//!
//! Replays JPEG stills from disk: either a single `.jpg` file (the same still
//! every cycle) or a directory of `.jpg`/`.jpeg` files cycled in name order.
//! Useful for bench testing the server with recorded intersection images.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{AcquireError, CameraSettings, ImageSource};
use crate::frame::{Frame, FramePool, MAX_FRAME_BYTES};

pub struct FileCamera {
    path: String,
    stills: Vec<PathBuf>,
    next: usize,
    pool: Option<FramePool>,
}

impl FileCamera {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            stills: Vec::new(),
            next: 0,
            pool: None,
        }
    }

    /// Number of stills found at init.
    pub fn still_count(&self) -> usize {
        self.stills.len()
    }
}

impl ImageSource for FileCamera {
    fn name(&self) -> &str {
        &self.path
    }

    fn init(&mut self, settings: &CameraSettings) -> Result<()> {
        let stills = list_stills(Path::new(&self.path))?;
        if stills.is_empty() {
            return Err(anyhow!("no .jpg/.jpeg stills found at {}", self.path));
        }
        log::info!(
            "FileCamera: {} still(s) from {} ({} buffer(s); resolution and quality are fixed by the files)",
            stills.len(),
            self.path,
            settings.frame_buffers
        );
        self.stills = stills;
        self.next = 0;
        self.pool = Some(FramePool::new(settings.frame_buffers));
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError> {
        let pool = self.pool.as_mut().ok_or(AcquireError::NotReady)?;
        let path = &self.stills[self.next];
        self.next = (self.next + 1) % self.stills.len();
        pool.fill(|buf| read_still(path, buf))
    }

    fn release(&mut self, frame: Frame) {
        if let Some(pool) = self.pool.as_mut() {
            pool.reclaim(frame);
        }
    }
}

fn list_stills(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("camera path {} is not accessible", path.display()))?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut stills = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("read camera directory {}", path.display()))?
    {
        let entry = entry?;
        let candidate = entry.path();
        let is_jpeg = candidate
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
            .unwrap_or(false);
        if is_jpeg && candidate.is_file() {
            stills.push(candidate);
        }
    }
    stills.sort();
    Ok(stills)
}

fn read_still(path: &Path, buf: &mut Vec<u8>) -> Result<(), AcquireError> {
    let file = std::fs::File::open(path)
        .map_err(|err| AcquireError::Capture(format!("open {}: {}", path.display(), err)))?;
    file.take(MAX_FRAME_BYTES as u64 + 1)
        .read_to_end(buf)
        .map_err(|err| AcquireError::Capture(format!("read {}: {}", path.display(), err)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_still(dir: &Path, name: &str, payload: u8) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, [0xFF, 0xD8, payload, 0xFF, 0xD9]).unwrap();
        path
    }

    #[test]
    fn directory_stills_are_replayed_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_still(dir.path(), "b.jpg", 2);
        write_still(dir.path(), "a.JPEG", 1);
        std::fs::write(dir.path().join("notes.txt"), b"ignored")?;

        let mut camera = FileCamera::new(dir.path().to_str().unwrap());
        camera.init(&CameraSettings::default())?;
        assert_eq!(camera.still_count(), 2);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let frame = camera.acquire().expect("frame");
            seen.push(frame.as_jpeg()[2]);
            camera.release(frame);
        }
        assert_eq!(seen, vec![1, 2, 1]);
        Ok(())
    }

    #[test]
    fn single_file_is_returned_every_cycle() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_still(dir.path(), "road.jpg", 7);

        let mut camera = FileCamera::new(path.to_str().unwrap());
        camera.init(&CameraSettings::default())?;
        for _ in 0..2 {
            let frame = camera.acquire().expect("frame");
            assert_eq!(frame.len(), 5);
            camera.release(frame);
        }
        Ok(())
    }

    #[test]
    fn empty_directory_fails_init() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut camera = FileCamera::new(dir.path().to_str().unwrap());
        assert!(camera.init(&CameraSettings::default()).is_err());
        Ok(())
    }

    #[test]
    fn still_removed_after_init_is_a_capture_miss() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_still(dir.path(), "road.jpg", 7);
        let mut camera = FileCamera::new(dir.path().to_str().unwrap());
        camera.init(&CameraSettings::default())?;
        std::fs::remove_file(path)?;
        assert!(matches!(camera.acquire(), Err(AcquireError::Capture(_))));
        Ok(())
    }
}
