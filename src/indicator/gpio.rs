//! Linux sysfs GPIO lines (`/sys/class/gpio`).
//!
//! Used for the indicator lamps and the optional camera power-enable line on
//! single-board computers. Lines are exported and configured as outputs once,
//! at open time; afterwards each write is a single `value` file write.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::SignalOutput;

const EXPORT_ATTEMPTS: u32 = 10;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// One exported output line.
#[derive(Debug)]
pub struct SysfsLine {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsLine {
    pub fn open_output(root: &Path, pin: u32) -> Result<Self> {
        let line_dir = root.join(format!("gpio{}", pin));
        if !line_dir.exists() {
            std::fs::write(root.join("export"), pin.to_string())
                .with_context(|| format!("export gpio {} via {}", pin, root.display()))?;
        }

        // The direction file shows up asynchronously after export.
        let direction = line_dir.join("direction");
        let mut attempts = 0;
        while !direction.exists() {
            attempts += 1;
            if attempts >= EXPORT_ATTEMPTS {
                return Err(anyhow!(
                    "gpio {} did not appear at {}",
                    pin,
                    line_dir.display()
                ));
            }
            std::thread::sleep(EXPORT_RETRY_DELAY);
        }
        std::fs::write(&direction, "out")
            .with_context(|| format!("set gpio {} direction", pin))?;

        Ok(Self {
            pin,
            value_path: line_dir.join("value"),
        })
    }

    pub fn set(&self, high: bool) -> Result<()> {
        std::fs::write(&self.value_path, if high { "1" } else { "0" })
            .with_context(|| format!("write gpio {}", self.pin))
    }
}

/// RED/GREEN lamps on two sysfs lines.
#[derive(Debug)]
pub struct SysfsGpioOutput {
    name: String,
    red: SysfsLine,
    green: SysfsLine,
}

impl SysfsGpioOutput {
    pub fn open(root: &Path, red_pin: u32, green_pin: u32) -> Result<Self> {
        let red = SysfsLine::open_output(root, red_pin)?;
        let green = SysfsLine::open_output(root, green_pin)?;
        log::info!(
            "indicator: sysfs gpio red={} green={} under {}",
            red_pin,
            green_pin,
            root.display()
        );
        Ok(Self {
            name: format!("gpio:{},{}", red_pin, green_pin),
            red,
            green,
        })
    }
}

impl SignalOutput for SysfsGpioOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, red: bool, green: bool) -> Result<()> {
        self.red.set(red)?;
        self.green.set(green)
    }
}
