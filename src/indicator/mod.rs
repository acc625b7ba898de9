//! RED/GREEN indicator outputs.
//!
//! `IndicatorDriver` owns the two output lines and the pattern currently
//! shown on them. Writes cannot be retried in any useful way, so output
//! errors are logged and otherwise ignored.

pub mod gpio;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;

use crate::clock::Clock;
use crate::verdict::Decision;

pub use gpio::{SysfsGpioOutput, SysfsLine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    Off,
    RedOn,
    GreenOn,
    BothOn,
}

impl Pattern {
    /// Line levels as `(red, green)`.
    pub fn lines(self) -> (bool, bool) {
        match self {
            Pattern::Off => (false, false),
            Pattern::RedOn => (true, false),
            Pattern::GreenOn => (false, true),
            Pattern::BothOn => (true, true),
        }
    }

    /// Pattern showing a definite decision.
    pub fn for_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Red => Some(Pattern::RedOn),
            Decision::Green => Some(Pattern::GreenOn),
            Decision::Unknown => None,
        }
    }
}

/// Two binary output lines.
pub trait SignalOutput {
    fn name(&self) -> &str;

    fn write(&mut self, red: bool, green: bool) -> Result<()>;
}

pub struct IndicatorDriver {
    output: Box<dyn SignalOutput>,
    current: Pattern,
}

impl IndicatorDriver {
    /// Wrap an output. Lines are driven to `Off` immediately.
    pub fn new(output: Box<dyn SignalOutput>) -> Self {
        let mut driver = Self {
            output,
            current: Pattern::Off,
        };
        driver.write(Pattern::Off);
        driver
    }

    pub fn current(&self) -> Pattern {
        self.current
    }

    pub fn set(&mut self, pattern: Pattern) {
        self.write(pattern);
        self.current = pattern;
    }

    /// Flash both lines for `duration`, then restore the pattern shown
    /// before the blink.
    pub fn fault_blink(&mut self, duration: Duration, clock: &dyn Clock) {
        let previous = self.current;
        self.write(Pattern::BothOn);
        clock.sleep(duration);
        self.write(previous);
    }

    fn write(&mut self, pattern: Pattern) {
        let (red, green) = pattern.lines();
        if let Err(err) = self.output.write(red, green) {
            log::error!(
                "indicator {}: failed to write {:?}: {:#}",
                self.output.name(),
                pattern,
                err
            );
        }
    }
}

/// Indicator that only reports level changes in the log.
#[derive(Debug, Default)]
pub struct LogOutput {
    last: Option<(bool, bool)>,
}

impl LogOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalOutput for LogOutput {
    fn name(&self) -> &str {
        "log"
    }

    fn write(&mut self, red: bool, green: bool) -> Result<()> {
        if self.last != Some((red, green)) {
            log::info!(
                "indicator: RED={} GREEN={}",
                if red { "on" } else { "off" },
                if green { "on" } else { "off" }
            );
            self.last = Some((red, green));
        }
        Ok(())
    }
}

/// Open an output from its config value: `log` or `gpio:<red>,<green>`.
pub fn open(output: &str, gpio_root: &Path) -> Result<Box<dyn SignalOutput>> {
    let output = output.trim();
    if output == "log" {
        return Ok(Box::new(LogOutput::new()));
    }
    if let Some(pins) = output.strip_prefix("gpio:") {
        let (red, green) = parse_pin_pair(pins)?;
        return Ok(Box::new(SysfsGpioOutput::open(gpio_root, red, green)?));
    }
    Err(anyhow!(
        "unsupported indicator output '{}'; expected 'log' or 'gpio:<red>,<green>'",
        output
    ))
}

pub(crate) fn parse_pin_pair(pins: &str) -> Result<(u32, u32)> {
    let mut parts = pins.split(',').map(str::trim);
    let (Some(red), Some(green), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(anyhow!("gpio indicator needs exactly two pins, got '{}'", pins));
    };
    let red: u32 = red
        .parse()
        .map_err(|_| anyhow!("invalid red gpio pin '{}'", red))?;
    let green: u32 = green
        .parse()
        .map_err(|_| anyhow!("invalid green gpio pin '{}'", green))?;
    if red == green {
        return Err(anyhow!("red and green indicators must use different pins"));
    }
    Ok((red, green))
}
