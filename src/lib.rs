//! Traffic beacon node.
//!
//! This crate implements a camera node that periodically photographs an
//! intersection, asks a remote inference server for a verdict, and shows the
//! verdict on two lamps (RED/GREEN).
//!
//! # Architecture
//!
//! Every capture period the control loop runs one cycle:
//!
//! 1. **Acquire**: pull one JPEG still from the camera (`camera`).
//! 2. **Upload**: POST it as multipart/form-data to the server (`uplink`).
//! 3. **Interpret**: read `{"cars": n, "decision": "RED"|"GREEN"}` (`verdict`).
//! 4. **Apply**: drive the lamps (`indicator`).
//!
//! The server is the only decision authority. The node adds one policy of
//! its own: after too many consecutive cycles without a verdict it fails open
//! to GREEN (`control`).
//!
//! # Module Structure
//!
//! - `boot`: power, camera, and network bring-up; fatal halt
//! - `camera`: image sources (stub, files, HTTP snapshot, V4L2)
//! - `clock`: monotonic time for the gate and blinks
//! - `config`: file + environment configuration
//! - `control`: the control loop and failure streak
//! - `frame`: frame ownership and the capture buffer pool
//! - `indicator`: lamp patterns and outputs (log, sysfs GPIO)
//! - `network`: connectivity check and reconnect
//! - `uplink`: multipart encoder and HTTP client
//! - `verdict`: server reply interpretation

pub mod boot;
pub mod camera;
pub mod clock;
pub mod config;
pub mod control;
pub mod frame;
pub mod indicator;
pub mod network;
pub mod uplink;
pub mod verdict;

pub use boot::{BootError, NoPowerRail, PowerRail, SysfsPowerRail};
pub use camera::{AcquireError, CameraSettings, ImageSource};
pub use clock::{Clock, SystemClock};
pub use config::BeaconConfig;
pub use control::{
    ControlLoop, ControlSettings, CycleFailure, CycleOutcome, CycleReport, FailureStreak,
    LoopStats, Tick,
};
pub use frame::{Frame, FramePool};
pub use indicator::{IndicatorDriver, LogOutput, Pattern, SignalOutput};
pub use network::{Network, RouteNetwork, WifiCredentials};
pub use uplink::{build_multipart_body, HttpUplink, MultipartLayout, UploadError, Uplink};
pub use verdict::{interpret, parse_decision, Decision, Verdict};
