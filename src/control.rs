//! Capture → upload → decide → indicate control loop.
//!
//! One iteration (`ControlLoop::tick`) is:
//!
//! 1. Connectivity pre-check. Link down: attempt a bounded reconnect and
//!    return. Neither the failure streak nor the cycle timer are touched.
//! 2. Timer gate. Less than one capture period since the last cycle: return.
//! 3. One cycle: ACQUIRE → UPLOAD → INTERPRET → APPLY.
//!
//! Any cycle without a definite RED/GREEN verdict counts as a failure. Below
//! the threshold a failure only blinks the fault pattern over whatever the
//! lamps showed before; at or above the threshold the node fails open and
//! shows GREEN until the server produces a definite verdict again.
//!
//! Cycles never overlap. An upload stuck inside its timeout blocks the whole
//! loop for that long; there is no cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::camera::{AcquireError, ImageSource};
use crate::clock::Clock;
use crate::indicator::{IndicatorDriver, Pattern};
use crate::network::Network;
use crate::uplink::{UploadError, Uplink};
use crate::verdict::{interpret, Decision};

pub const DEFAULT_CAPTURE_PERIOD: Duration = Duration::from_millis(3_000);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_FAULT_BLINK: Duration = Duration::from_millis(200);
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

const STATS_LOG_INTERVAL_MS: u64 = 60_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlSettings {
    pub capture_period: Duration,
    pub failure_threshold: u32,
    pub fault_blink: Duration,
    pub reconnect_timeout: Duration,
    /// Yield between iterations of `run`.
    pub poll_interval: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            capture_period: DEFAULT_CAPTURE_PERIOD,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            fault_blink: DEFAULT_FAULT_BLINK,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Consecutive cycles without a definite verdict. Saturates, never wraps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureStreak(u32);

impl FailureStreak {
    pub fn count(self) -> u32 {
        self.0
    }

    pub fn record_failure(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn reached(self, threshold: u32) -> bool {
        self.0 >= threshold
    }
}

/// Why a cycle ended without a definite verdict.
#[derive(Debug)]
pub enum CycleFailure {
    Acquire(AcquireError),
    Upload(UploadError),
    /// HTTP 200, but the reply carried no RED/GREEN decision.
    Interpret,
}

impl std::fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleFailure::Acquire(err) => write!(f, "acquire: {}", err),
            CycleFailure::Upload(err) => write!(f, "upload: {}", err),
            CycleFailure::Interpret => write!(f, "interpret: no usable decision in reply"),
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Decided(Decision),
    Failed(CycleFailure),
}

/// What a single cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Streak after the cycle.
    pub streak: u32,
    /// Pattern shown after the cycle.
    pub pattern: Pattern,
    /// The fail-open default was applied this cycle.
    pub failed_open: bool,
    pub elapsed_ms: u64,
}

/// What a single loop iteration did.
#[derive(Debug)]
pub enum Tick {
    /// Link was down; a reconnect was attempted.
    Offline { reconnected: bool },
    /// Capture period not yet elapsed.
    Waiting,
    Cycle(CycleReport),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub red: u64,
    pub green: u64,
    pub failures: u64,
    pub failed_open: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
}

pub struct ControlLoop {
    camera: Box<dyn ImageSource>,
    uplink: Box<dyn Uplink>,
    network: Box<dyn Network>,
    indicator: IndicatorDriver,
    clock: Box<dyn Clock>,
    settings: ControlSettings,
    streak: FailureStreak,
    last_cycle_ms: Option<u64>,
    stats: LoopStats,
}

impl ControlLoop {
    pub fn new(
        camera: Box<dyn ImageSource>,
        uplink: Box<dyn Uplink>,
        network: Box<dyn Network>,
        indicator: IndicatorDriver,
        clock: Box<dyn Clock>,
        settings: ControlSettings,
    ) -> Self {
        Self {
            camera,
            uplink,
            network,
            indicator,
            clock,
            settings,
            streak: FailureStreak::default(),
            last_cycle_ms: None,
            stats: LoopStats::default(),
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak.count()
    }

    pub fn pattern(&self) -> Pattern {
        self.indicator.current()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run iterations until `shutdown` is set, then turn the lamps off.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "control loop running: period={}ms threshold={} camera={}",
            self.settings.capture_period.as_millis(),
            self.settings.failure_threshold,
            self.camera.name()
        );
        let mut last_stats_log = self.clock.now_ms();
        while !shutdown.load(Ordering::SeqCst) {
            self.tick();

            let now = self.clock.now_ms();
            if now.saturating_sub(last_stats_log) >= STATS_LOG_INTERVAL_MS {
                self.log_stats();
                last_stats_log = now;
            }
            self.clock.sleep(self.settings.poll_interval);
        }
        self.indicator.set(Pattern::Off);
        self.log_stats();
        log::info!("control loop stopped");
    }

    /// One iteration: connectivity pre-check, timer gate, and possibly a cycle.
    pub fn tick(&mut self) -> Tick {
        if !self.network.is_connected() {
            return Tick::Offline {
                reconnected: self.try_reconnect(),
            };
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.last_cycle_ms {
            if now.saturating_sub(last) < self.settings.capture_period.as_millis() as u64 {
                return Tick::Waiting;
            }
        }
        self.last_cycle_ms = Some(now);
        Tick::Cycle(self.run_cycle())
    }

    fn try_reconnect(&mut self) -> bool {
        self.stats.reconnect_attempts += 1;
        log::warn!("network down; skipping capture and reconnecting");
        match self.network.reconnect(self.settings.reconnect_timeout) {
            Ok(()) => {
                log::info!("network reconnected");
                true
            }
            Err(err) => {
                self.stats.reconnect_failures += 1;
                log::warn!("reconnect failed: {:#}", err);
                false
            }
        }
    }

    fn run_cycle(&mut self) -> CycleReport {
        let started = self.clock.now_ms();
        self.stats.cycles += 1;

        let outcome = self.capture_and_decide();
        let mut failed_open = false;
        match &outcome {
            CycleOutcome::Decided(decision) => {
                self.streak.reset();
                match decision {
                    Decision::Red => self.stats.red += 1,
                    _ => self.stats.green += 1,
                }
                if let Some(pattern) = Pattern::for_decision(*decision) {
                    self.indicator.set(pattern);
                }
            }
            CycleOutcome::Failed(failure) => {
                self.stats.failures += 1;
                let streak = self.streak.record_failure();
                log::warn!(
                    "cycle failed ({}); streak {}/{}",
                    failure,
                    streak,
                    self.settings.failure_threshold
                );
                failed_open = self.on_failure();
            }
        }

        let report = CycleReport {
            outcome,
            streak: self.streak.count(),
            pattern: self.indicator.current(),
            failed_open,
            elapsed_ms: self.clock.now_ms().saturating_sub(started),
        };
        log::debug!(
            "cycle #{} done in {}ms: {:?} streak={} lamps={:?}",
            self.stats.cycles,
            report.elapsed_ms,
            report.outcome,
            report.streak,
            report.pattern
        );
        report
    }

    /// ACQUIRE → UPLOAD → INTERPRET. The frame is released on every path.
    fn capture_and_decide(&mut self) -> CycleOutcome {
        let frame = match self.camera.acquire() {
            Ok(frame) => frame,
            Err(err) => return CycleOutcome::Failed(CycleFailure::Acquire(err)),
        };
        log::debug!("frame #{}: {} bytes", frame.sequence(), frame.len());

        let reply = self.uplink.upload(frame.as_jpeg());
        self.camera.release(frame);

        let body = match reply {
            Ok(body) => body,
            Err(err) => return CycleOutcome::Failed(CycleFailure::Upload(err)),
        };

        let verdict = interpret(&body);
        if !verdict.decision.is_definite() {
            log::debug!("unusable reply: {}", truncate(&body, 200));
            return CycleOutcome::Failed(CycleFailure::Interpret);
        }
        log::info!(
            "decision={} cars={} raw={}",
            verdict.decision,
            verdict
                .cars
                .map(|cars| cars.to_string())
                .unwrap_or_else(|| "?".to_string()),
            verdict.raw_decision.as_deref().unwrap_or("-")
        );
        CycleOutcome::Decided(verdict.decision)
    }

    /// Apply the failure policy. Returns true when the node failed open.
    fn on_failure(&mut self) -> bool {
        if self.streak.reached(self.settings.failure_threshold) {
            if self.indicator.current() != Pattern::GreenOn {
                log::warn!(
                    "{} consecutive failures; failing open to GREEN",
                    self.streak.count()
                );
            }
            self.indicator.set(Pattern::GreenOn);
            self.stats.failed_open += 1;
            true
        } else {
            self.indicator
                .fault_blink(self.settings.fault_blink, self.clock.as_ref());
            false
        }
    }

    fn log_stats(&self) {
        let s = self.stats;
        log::info!(
            "stats: cycles={} red={} green={} failures={} failed_open={} reconnects={}/{} streak={}",
            s.cycles,
            s.red,
            s.green,
            s.failures,
            s.failed_open,
            s.reconnect_attempts - s.reconnect_failures,
            s.reconnect_attempts,
            self.streak.count()
        );
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
