//! Network connectivity.
//!
//! On the node the network is an external collaborator: association and DHCP
//! are handled by the operating system (or the radio firmware). The control
//! loop only needs to ask "is the link up?" before every iteration and to
//! trigger a bounded reconnect attempt when it is not.
//!
//! `RouteNetwork` answers that question for a hosted node by resolving the
//! server host and asking the kernel for a route to it. Connecting a UDP
//! socket performs the route lookup without sending any packets, so the
//! check is cheap enough to run every iteration.

use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use url::Url;

const RECONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Credentials handed to the association layer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub passphrase: String,
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

pub trait Network {
    /// Current link state. Not cached between calls.
    fn is_connected(&mut self) -> bool;

    /// Try to bring the link back, waiting at most `timeout`.
    fn reconnect(&mut self, timeout: Duration) -> Result<()>;
}

pub struct RouteNetwork {
    host: String,
    port: u16,
    credentials: WifiCredentials,
    resolved: Option<SocketAddr>,
}

impl RouteNetwork {
    /// Track reachability of the host serving `server_url`.
    pub fn new(server_url: &str, credentials: WifiCredentials) -> Result<Self> {
        let url = Url::parse(server_url).context("parse server url")?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("server url missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("server url missing port"))?;
        Ok(Self {
            host,
            port,
            credentials,
            resolved: None,
        })
    }

    pub fn target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    fn resolve(&mut self) -> Result<SocketAddr> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {}:{}", self.host, self.port))?
            .next()
            .ok_or_else(|| anyhow!("{} resolved to no addresses", self.host))?;
        self.resolved = Some(addr);
        Ok(addr)
    }
}

impl Network for RouteNetwork {
    fn is_connected(&mut self) -> bool {
        match self.resolved {
            Some(addr) => has_route(addr),
            None => false,
        }
    }

    fn reconnect(&mut self, timeout: Duration) -> Result<()> {
        if !self.credentials.ssid.is_empty() {
            log::info!(
                "network: waiting for '{}' (association handled by the host)",
                self.credentials.ssid
            );
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.resolve() {
                Ok(addr) if has_route(addr) => {
                    log::info!("network: route to {} available", addr);
                    return Ok(());
                }
                Ok(addr) => log::debug!("network: no route to {} yet", addr),
                Err(err) => log::debug!("network: {:#}", err),
            }
            let now = Instant::now();
            if now >= deadline {
                self.resolved = None;
                return Err(anyhow!(
                    "no route to {}:{} within {}ms",
                    self.host,
                    self.port,
                    timeout.as_millis()
                ));
            }
            std::thread::sleep(RECONNECT_RETRY_DELAY.min(deadline - now));
        }
    }
}

fn has_route(addr: SocketAddr) -> bool {
    let bind: SocketAddr = match addr {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    };
    UdpSocket::bind(bind)
        .and_then(|socket| socket.connect(addr))
        .is_ok()
}
