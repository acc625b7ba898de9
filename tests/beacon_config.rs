use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use traffic_beacon::config::BeaconConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BEACON_CONFIG",
        "BEACON_WIFI_SSID",
        "BEACON_WIFI_PASS",
        "BEACON_SERVER_URL",
        "BEACON_CAMERA",
        "BEACON_CAPTURE_PERIOD_MS",
        "BEACON_HTTP_TIMEOUT_MS",
        "BEACON_FAILURE_THRESHOLD",
        "BEACON_RECONNECT_TIMEOUT_MS",
        "BEACON_INDICATOR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = BeaconConfig::load().expect("load defaults");

    assert_eq!(cfg.server.url, "http://192.168.1.100:5000/analyze");
    assert_eq!(cfg.server.timeout, Duration::from_millis(15_000));
    assert!(!cfg.server.reset_history_on_boot);
    assert_eq!(cfg.camera.source, "stub://camera0");
    assert_eq!(cfg.camera.settings.width, 640);
    assert_eq!(cfg.camera.settings.height, 480);
    assert_eq!(cfg.camera.settings.frame_buffers, 1);
    assert_eq!(cfg.control.capture_period, Duration::from_millis(3_000));
    assert_eq!(cfg.control.failure_threshold, 5);
    assert_eq!(cfg.control.reconnect_timeout, Duration::from_millis(10_000));
    assert_eq!(cfg.indicator.output, "log");
    assert_eq!(cfg.indicator.gpio_root, PathBuf::from("/sys/class/gpio"));
    assert_eq!(cfg.power.enable_gpio, None);
}

#[test]
fn loads_json_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "network": {
                "ssid": "intersection-7",
                "passphrase": "hunter22",
                "reconnect_timeout_ms": 4000
            },
            "server": {
                "url": "http://10.0.0.5:5000/analyze",
                "timeout_ms": 8000,
                "reset_history_on_boot": true
            },
            "camera": {
                "source": "/var/lib/beacon/stills",
                "width": 320,
                "height": 240,
                "jpeg_quality": 60,
                "frame_buffers": 2,
                "vflip": true
            },
            "control": {
                "capture_period_ms": 5000,
                "failure_threshold": 3,
                "fault_blink_ms": 100
            },
            "indicator": {
                "output": "gpio:17,27",
                "gpio_root": "/tmp/gpio"
            },
            "power": {
                "enable_gpio": 4,
                "settle_ms": 50
            }
        }"#,
    );

    std::env::set_var("BEACON_CONFIG", file.path());
    std::env::set_var("BEACON_WIFI_SSID", "intersection-8");
    std::env::set_var("BEACON_FAILURE_THRESHOLD", "7");
    std::env::set_var("BEACON_CAPTURE_PERIOD_MS", "2500");

    let cfg = BeaconConfig::load().expect("load config");

    assert_eq!(cfg.network.credentials.ssid, "intersection-8");
    assert_eq!(cfg.network.credentials.passphrase, "hunter22");
    assert_eq!(cfg.server.url, "http://10.0.0.5:5000/analyze");
    assert_eq!(cfg.server.timeout, Duration::from_millis(8000));
    assert!(cfg.server.reset_history_on_boot);
    assert_eq!(cfg.camera.source, "/var/lib/beacon/stills");
    assert_eq!(cfg.camera.settings.width, 320);
    assert_eq!(cfg.camera.settings.jpeg_quality, 60);
    assert_eq!(cfg.camera.settings.frame_buffers, 2);
    assert!(cfg.camera.settings.vflip);
    assert_eq!(cfg.control.capture_period, Duration::from_millis(2500));
    assert_eq!(cfg.control.failure_threshold, 7);
    assert_eq!(cfg.control.fault_blink, Duration::from_millis(100));
    assert_eq!(cfg.control.reconnect_timeout, Duration::from_millis(4000));
    assert_eq!(cfg.indicator.output, "gpio:17,27");
    assert_eq!(cfg.indicator.gpio_root, PathBuf::from("/tmp/gpio"));
    assert_eq!(cfg.power.enable_gpio, Some(4));
    assert_eq!(cfg.power.settle, Duration::from_millis(50));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[server]
url = "https://beacon.example.net/analyze"
timeout_ms = 20000

[camera]
source = "stub://bench?fail_every=4"

[control]
failure_threshold = 2
"#,
    );

    let cfg = BeaconConfig::load_from(Some(file.path())).expect("load toml");

    assert_eq!(cfg.server.url, "https://beacon.example.net/analyze");
    assert_eq!(cfg.server.timeout, Duration::from_millis(20_000));
    assert_eq!(cfg.camera.source, "stub://bench?fail_every=4");
    assert_eq!(cfg.control.failure_threshold, 2);
    assert_eq!(cfg.control.capture_period, Duration::from_millis(3_000));
}

#[test]
fn env_server_url_and_camera_override_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{"server": {"url": "http://10.0.0.5:5000/analyze"}, "camera": {"source": "stub://a"}}"#,
    );
    std::env::set_var("BEACON_SERVER_URL", "http://10.0.0.9:5000/analyze");
    std::env::set_var("BEACON_CAMERA", "http://10.0.0.20/capture");
    std::env::set_var("BEACON_HTTP_TIMEOUT_MS", "3000");
    std::env::set_var("BEACON_INDICATOR", "log");

    let cfg = BeaconConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(cfg.server.url, "http://10.0.0.9:5000/analyze");
    assert_eq!(cfg.camera.source, "http://10.0.0.20/capture");
    assert_eq!(cfg.server.timeout, Duration::from_millis(3000));
    assert_eq!(cfg.indicator.output, "log");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for contents in [
        r#"{"server": {"url": "ftp://10.0.0.5/analyze"}}"#,
        r#"{"server": {"timeout_ms": 0}}"#,
        r#"{"control": {"failure_threshold": 0}}"#,
        r#"{"control": {"capture_period_ms": 0}}"#,
        r#"{"camera": {"frame_buffers": 0}}"#,
        r#"{"camera": {"jpeg_quality": 0}}"#,
        r#"{"camera": {"width": 0}}"#,
        r#"{"camera": {"width": 40000, "height": 40000}}"#,
        r#"{"camera": {"height": 4097}}"#,
        r#"{"server": "#,
    ] {
        let file = write_config(".json", contents);
        assert!(
            BeaconConfig::load_from(Some(file.path())).is_err(),
            "accepted {}",
            contents
        );
    }

    std::env::set_var("BEACON_CAPTURE_PERIOD_MS", "soon");
    assert!(BeaconConfig::load_from(None).is_err());
    clear_env();

    std::env::set_var("BEACON_FAILURE_THRESHOLD", "-1");
    assert!(BeaconConfig::load_from(None).is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let err = BeaconConfig::load_from(Some(missing.as_path())).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
