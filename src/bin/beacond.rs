//! beacond - traffic beacon node daemon
//!
//! This daemon:
//! 1. Loads configuration (file from --config / BEACON_CONFIG, then BEACON_* env)
//! 2. Powers up and configures the camera (fatal on failure: fault blink)
//! 3. Waits for the network
//! 4. Checks the inference server and optionally resets its history
//! 5. Runs the capture/upload/decide/indicate loop until Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use traffic_beacon::{
    boot, camera, indicator, BeaconConfig, ControlLoop, HttpUplink, IndicatorDriver,
    NoPowerRail, PowerRail, RouteNetwork, SysfsPowerRail, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Traffic beacon node: camera to inference server to lamps")]
struct Args {
    /// Configuration file (.toml or .json).
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = BeaconConfig::load_from(args.config.as_deref())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    log::info!("beacond {} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "server={} camera={} indicator={}",
        cfg.server.url,
        cfg.camera.source,
        cfg.indicator.output
    );

    let clock = SystemClock::new();
    let mut lamps = IndicatorDriver::new(indicator::open(
        &cfg.indicator.output,
        &cfg.indicator.gpio_root,
    )?);

    let mut power: Box<dyn PowerRail> = match cfg.power.enable_gpio {
        Some(pin) => Box::new(SysfsPowerRail::new(
            &cfg.indicator.gpio_root,
            pin,
            cfg.power.settle,
        )),
        None => Box::new(NoPowerRail),
    };
    let mut source = camera::open(&cfg.camera.source)?;
    if let Err(err) = boot::bring_up(power.as_mut(), source.as_mut(), &cfg.camera.settings) {
        log::error!("{}", err);
        boot::halt_with_fault_blink(&mut lamps, &clock, &shutdown);
        return Err(anyhow!(err));
    }

    let mut network = RouteNetwork::new(&cfg.server.url, cfg.network.credentials.clone())?;
    if !boot::join_network(&mut network, cfg.control.reconnect_timeout, &shutdown) {
        log::info!("shutdown requested before network came up");
        return Ok(());
    }

    let uplink = HttpUplink::new(&cfg.server.url, cfg.server.timeout)?;
    log::info!(
        "uplink: POST {} (timeout {}ms)",
        uplink.url(),
        uplink.timeout().as_millis()
    );
    match uplink.probe_health() {
        Ok(status) => log::info!(
            "server status={} images_processed={} ({})",
            status.status.as_deref().unwrap_or("?"),
            status
                .images_processed
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
            status.message.as_deref().unwrap_or("")
        ),
        Err(err) => log::warn!("server health check failed: {:#}", err),
    }
    if cfg.server.reset_history_on_boot {
        match uplink.reset_history() {
            Ok(()) => log::info!("server decision history cleared"),
            Err(err) => log::warn!("server history reset failed: {:#}", err),
        }
    }

    let mut control = ControlLoop::new(
        source,
        Box::new(uplink),
        Box::new(network),
        lamps,
        Box::new(clock),
        cfg.control.clone(),
    );
    control.run(&shutdown);
    Ok(())
}
