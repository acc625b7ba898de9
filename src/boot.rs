//! Node bring-up.
//!
//! Startup runs once, in order: power rail, camera configuration, network.
//! Power and camera failures are fatal (`BootError`); the node then sits in
//! `halt_with_fault_blink` with no recovery path. The network is retried
//! until it comes up, because losing it later is an ordinary runtime event.

use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::camera::{CameraSettings, ImageSource};
use crate::clock::Clock;
use crate::indicator::{IndicatorDriver, Pattern, SysfsLine};
use crate::network::Network;

/// Half period of the fatal fault blink.
pub const FATAL_BLINK: Duration = Duration::from_millis(250);

/// Supplies power to the camera and radio.
pub trait PowerRail {
    fn power_up(&mut self) -> Result<()>;
}

/// Boards whose rails are always on.
#[derive(Debug, Default)]
pub struct NoPowerRail;

impl PowerRail for NoPowerRail {
    fn power_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Camera power switched by a GPIO enable line.
#[derive(Debug)]
pub struct SysfsPowerRail {
    root: std::path::PathBuf,
    pin: u32,
    settle: Duration,
}

impl SysfsPowerRail {
    pub fn new(root: &Path, pin: u32, settle: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            pin,
            settle,
        }
    }
}

impl PowerRail for SysfsPowerRail {
    fn power_up(&mut self) -> Result<()> {
        let line = SysfsLine::open_output(&self.root, self.pin)?;
        line.set(true)?;
        std::thread::sleep(self.settle);
        log::info!("power: enable line gpio {} high", self.pin);
        Ok(())
    }
}

/// Fatal bring-up failure.
#[derive(Debug)]
pub enum BootError {
    Power(anyhow::Error),
    Camera(anyhow::Error),
}

impl std::fmt::Display for BootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootError::Power(err) => write!(f, "power sequencing failed: {:#}", err),
            BootError::Camera(err) => write!(f, "camera init failed: {:#}", err),
        }
    }
}

impl std::error::Error for BootError {}

/// Power up, then configure the camera. Must succeed before anything else.
pub fn bring_up(
    power: &mut dyn PowerRail,
    camera: &mut dyn ImageSource,
    settings: &CameraSettings,
) -> Result<(), BootError> {
    power.power_up().map_err(BootError::Power)?;
    log::info!("power rail up");
    camera.init(settings).map_err(BootError::Camera)?;
    log::info!("camera {} configured", camera.name());
    Ok(())
}

/// Wait until the network is up. Returns false if shutdown was requested first.
pub fn join_network(
    network: &mut dyn Network,
    attempt_timeout: Duration,
    shutdown: &AtomicBool,
) -> bool {
    let mut attempt = 0u32;
    while !shutdown.load(Ordering::SeqCst) {
        if network.is_connected() {
            return true;
        }
        attempt = attempt.saturating_add(1);
        match network.reconnect(attempt_timeout) {
            Ok(()) => {
                log::info!("network up after {} attempt(s)", attempt);
                return true;
            }
            Err(err) => log::warn!("network attempt {} failed: {:#}", attempt, err),
        }
    }
    false
}

/// Fatal state: blink both lamps until shutdown is requested.
pub fn halt_with_fault_blink(indicator: &mut IndicatorDriver, clock: &dyn Clock, shutdown: &AtomicBool) {
    log::error!("node halted; blinking fault pattern");
    while !shutdown.load(Ordering::SeqCst) {
        indicator.set(Pattern::BothOn);
        clock.sleep(FATAL_BLINK);
        indicator.set(Pattern::Off);
        clock.sleep(FATAL_BLINK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AcquireError, StubCamera};
    use crate::frame::Frame;
    use anyhow::anyhow;

    struct DeadRail;

    impl PowerRail for DeadRail {
        fn power_up(&mut self) -> Result<()> {
            Err(anyhow!("pmu did not acknowledge"))
        }
    }

    struct BrokenCamera;

    impl ImageSource for BrokenCamera {
        fn name(&self) -> &str {
            "broken"
        }

        fn init(&mut self, _settings: &CameraSettings) -> Result<()> {
            Err(anyhow!("sensor id mismatch"))
        }

        fn acquire(&mut self) -> Result<Frame, AcquireError> {
            Err(AcquireError::NotReady)
        }

        fn release(&mut self, _frame: Frame) {}
    }

    struct FlakyNetwork {
        failures_left: u32,
        up: bool,
    }

    impl Network for FlakyNetwork {
        fn is_connected(&mut self) -> bool {
            self.up
        }

        fn reconnect(&mut self, _timeout: Duration) -> Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(anyhow!("no ap"));
            }
            self.up = true;
            Ok(())
        }
    }

    fn small_settings() -> CameraSettings {
        CameraSettings {
            width: 16,
            height: 16,
            ..CameraSettings::default()
        }
    }

    #[test]
    fn power_failure_is_fatal_before_camera_init() {
        let mut camera = BrokenCamera;
        let err = bring_up(&mut DeadRail, &mut camera, &small_settings()).unwrap_err();
        assert!(matches!(err, BootError::Power(_)));
        assert!(err.to_string().contains("pmu did not acknowledge"));
    }

    #[test]
    fn camera_failure_is_fatal() {
        let mut camera = BrokenCamera;
        let err = bring_up(&mut NoPowerRail, &mut camera, &small_settings()).unwrap_err();
        assert!(matches!(err, BootError::Camera(_)));
    }

    #[test]
    fn healthy_bring_up_leaves_camera_ready() -> Result<()> {
        let mut camera = StubCamera::new("stub://boot")?;
        bring_up(&mut NoPowerRail, &mut camera, &small_settings())?;
        let frame = camera.acquire().expect("frame after bring-up");
        camera.release(frame);
        Ok(())
    }

    #[test]
    fn join_network_retries_until_connected() {
        let mut network = FlakyNetwork {
            failures_left: 3,
            up: false,
        };
        let shutdown = AtomicBool::new(false);
        assert!(join_network(&mut network, Duration::from_millis(1), &shutdown));
        assert!(network.up);
    }

    #[test]
    fn join_network_stops_on_shutdown() {
        let mut network = FlakyNetwork {
            failures_left: u32::MAX,
            up: false,
        };
        let shutdown = AtomicBool::new(true);
        assert!(!join_network(&mut network, Duration::from_millis(1), &shutdown));
    }

    #[test]
    fn sysfs_power_rail_drives_enable_line() -> Result<()> {
        let root = tempfile::tempdir()?;
        let line = root.path().join("gpio4");
        std::fs::create_dir(&line)?;
        std::fs::write(line.join("direction"), "in")?;
        std::fs::write(line.join("value"), "0")?;

        let mut rail = SysfsPowerRail::new(root.path(), 4, Duration::from_millis(1));
        rail.power_up()?;
        assert_eq!(std::fs::read_to_string(line.join("value"))?, "1");
        Ok(())
    }
}
