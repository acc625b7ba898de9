//! analyze_once - send one JPEG to the inference server and print the verdict.
//!
//! Uses the same encoder and interpreter as the node, so it doubles as a
//! bench check of a server before a node is pointed at it.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use traffic_beacon::frame::jpeg_len;
use traffic_beacon::{interpret, Decision, HttpUplink, UploadError, Uplink};

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload a single JPEG and print the server's verdict")]
struct Args {
    /// JPEG image to upload.
    image: PathBuf,

    /// Analyze endpoint.
    #[arg(
        long,
        env = "BEACON_SERVER_URL",
        default_value = "http://127.0.0.1:5000/analyze"
    )]
    url: String,

    /// Request timeout in milliseconds.
    #[arg(long, env = "BEACON_HTTP_TIMEOUT_MS", default_value_t = 15_000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("read {}", args.image.display()))?;
    let len = jpeg_len(&bytes).map_err(|e| anyhow!("{}: {}", args.image.display(), e))?;

    let mut uplink = HttpUplink::new(&args.url, Duration::from_millis(args.timeout_ms))?;
    let body = match uplink.upload(&bytes[..len]) {
        Ok(body) => body,
        Err(UploadError::Status { code }) => {
            return Err(anyhow!("server at {} returned HTTP {}", args.url, code))
        }
        Err(err) => return Err(anyhow!("upload to {} failed: {}", args.url, err)),
    };

    let verdict = interpret(&body);
    println!(
        "cars:     {}",
        verdict
            .cars
            .map(|n| n.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    );
    println!("decision: {}", verdict.decision);
    println!(
        "raw:      {}",
        verdict.raw_decision.as_deref().unwrap_or("N/A")
    );
    if verdict.decision == Decision::Unknown {
        return Err(anyhow!("server reply carried no usable decision: {}", body));
    }
    Ok(())
}
