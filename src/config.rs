use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::camera::{CameraSettings, MAX_DIMENSION};
use crate::control::ControlSettings;
use crate::network::WifiCredentials;

const DEFAULT_SERVER_URL: &str = "http://192.168.1.100:5000/analyze";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_CAMERA_SOURCE: &str = "stub://camera0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_FRAME_BUFFERS: usize = 1;
const DEFAULT_CAPTURE_PERIOD_MS: u64 = 3_000;
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_FAULT_BLINK_MS: u64 = 200;
const DEFAULT_POLL_INTERVAL_MS: u64 = 20;
const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_INDICATOR_OUTPUT: &str = "log";
const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
const DEFAULT_POWER_SETTLE_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct BeaconConfigFile {
    network: Option<NetworkConfigFile>,
    server: Option<ServerConfigFile>,
    camera: Option<CameraConfigFile>,
    control: Option<ControlConfigFile>,
    indicator: Option<IndicatorConfigFile>,
    power: Option<PowerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkConfigFile {
    ssid: Option<String>,
    passphrase: Option<String>,
    reconnect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
    reset_history_on_boot: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    jpeg_quality: Option<u8>,
    frame_buffers: Option<usize>,
    vflip: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    capture_period_ms: Option<u64>,
    failure_threshold: Option<u32>,
    fault_blink_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct IndicatorConfigFile {
    output: Option<String>,
    gpio_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PowerConfigFile {
    enable_gpio: Option<u32>,
    settle_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub network: NetworkSettings,
    pub server: ServerSettings,
    pub camera: CameraSource,
    pub control: ControlSettings,
    pub indicator: IndicatorSettings,
    pub power: PowerSettings,
}

#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub credentials: WifiCredentials,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub url: String,
    pub timeout: Duration,
    pub reset_history_on_boot: bool,
}

#[derive(Debug, Clone)]
pub struct CameraSource {
    pub source: String,
    pub settings: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct IndicatorSettings {
    pub output: String,
    pub gpio_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PowerSettings {
    pub enable_gpio: Option<u32>,
    pub settle: Duration,
}

impl BeaconConfig {
    /// Load from `BEACON_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BEACON_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BeaconConfigFile) -> Self {
        let network = file.network.unwrap_or_default();
        let server = file.server.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let control = file.control.unwrap_or_default();
        let indicator = file.indicator.unwrap_or_default();
        let power = file.power.unwrap_or_default();

        Self {
            network: NetworkSettings {
                credentials: WifiCredentials {
                    ssid: network.ssid.unwrap_or_default(),
                    passphrase: network.passphrase.unwrap_or_default(),
                },
            },
            server: ServerSettings {
                url: server
                    .url
                    .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
                timeout: Duration::from_millis(
                    server.timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
                ),
                reset_history_on_boot: server.reset_history_on_boot.unwrap_or(false),
            },
            camera: CameraSource {
                source: camera
                    .source
                    .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
                settings: CameraSettings {
                    width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                    height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                    jpeg_quality: camera.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                    frame_buffers: camera.frame_buffers.unwrap_or(DEFAULT_FRAME_BUFFERS),
                    vflip: camera.vflip.unwrap_or(false),
                },
            },
            control: ControlSettings {
                capture_period: Duration::from_millis(
                    control
                        .capture_period_ms
                        .unwrap_or(DEFAULT_CAPTURE_PERIOD_MS),
                ),
                failure_threshold: control
                    .failure_threshold
                    .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
                fault_blink: Duration::from_millis(
                    control.fault_blink_ms.unwrap_or(DEFAULT_FAULT_BLINK_MS),
                ),
                reconnect_timeout: Duration::from_millis(
                    network
                        .reconnect_timeout_ms
                        .unwrap_or(DEFAULT_RECONNECT_TIMEOUT_MS),
                ),
                poll_interval: Duration::from_millis(
                    control.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
            },
            indicator: IndicatorSettings {
                output: indicator
                    .output
                    .unwrap_or_else(|| DEFAULT_INDICATOR_OUTPUT.to_string()),
                gpio_root: indicator
                    .gpio_root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_GPIO_ROOT)),
            },
            power: PowerSettings {
                enable_gpio: power.enable_gpio,
                settle: Duration::from_millis(power.settle_ms.unwrap_or(DEFAULT_POWER_SETTLE_MS)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ssid) = std::env::var("BEACON_WIFI_SSID") {
            if !ssid.trim().is_empty() {
                self.network.credentials.ssid = ssid;
            }
        }
        if let Ok(pass) = std::env::var("BEACON_WIFI_PASS") {
            self.network.credentials.passphrase = pass;
        }
        if let Ok(url) = std::env::var("BEACON_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server.url = url;
            }
        }
        if let Ok(source) = std::env::var("BEACON_CAMERA") {
            if !source.trim().is_empty() {
                self.camera.source = source;
            }
        }
        if let Ok(output) = std::env::var("BEACON_INDICATOR") {
            if !output.trim().is_empty() {
                self.indicator.output = output;
            }
        }
        if let Some(ms) = env_millis("BEACON_CAPTURE_PERIOD_MS")? {
            self.control.capture_period = ms;
        }
        if let Some(ms) = env_millis("BEACON_HTTP_TIMEOUT_MS")? {
            self.server.timeout = ms;
        }
        if let Some(ms) = env_millis("BEACON_RECONNECT_TIMEOUT_MS")? {
            self.control.reconnect_timeout = ms;
        }
        if let Ok(threshold) = std::env::var("BEACON_FAILURE_THRESHOLD") {
            self.control.failure_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("BEACON_FAILURE_THRESHOLD must be a non-negative integer")
            })?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let url = Url::parse(&self.server.url)
            .map_err(|e| anyhow!("invalid server url '{}': {}", self.server.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("server url must use http or https"));
        }
        if url.host_str().is_none() {
            return Err(anyhow!("server url must include a host"));
        }
        if self.server.timeout.is_zero() {
            return Err(anyhow!("server timeout must be greater than zero"));
        }
        if self.control.capture_period.is_zero() {
            return Err(anyhow!("capture period must be greater than zero"));
        }
        if self.control.failure_threshold == 0 {
            return Err(anyhow!("failure threshold must be at least 1"));
        }
        if self.control.reconnect_timeout.is_zero() {
            return Err(anyhow!("reconnect timeout must be greater than zero"));
        }
        let camera = &self.camera.settings;
        if camera.frame_buffers == 0 {
            return Err(anyhow!("camera needs at least one frame buffer"));
        }
        if !(1..=100).contains(&camera.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be between 1 and 100"));
        }
        if camera.width == 0 || camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if camera.width > MAX_DIMENSION || camera.height > MAX_DIMENSION {
            return Err(anyhow!(
                "camera resolution {}x{} exceeds {}x{}",
                camera.width,
                camera.height,
                MAX_DIMENSION,
                MAX_DIMENSION
            ));
        }
        self.camera.source = self.camera.source.trim().to_string();
        self.indicator.output = self.indicator.output.trim().to_string();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<BeaconConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}
