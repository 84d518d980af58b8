//! Device discovery via multicast scan requests.
//!
//! Devices answer a `scan` request sent to `239.255.255.250:4001` with a
//! unicast or multicast datagram to port 4002. Every datagram that reaches the
//! listener is logged to the registry; well-formed scan responses also create
//! or refresh the device they describe.

use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use crate::config::DiscoveryConfig;
use crate::errors::Error;
use crate::neighbor::{NeighborLookup, NoLookup};
use crate::net::{self, MULTICAST_GROUP, RECV_BUFFER, SCAN_PORT};
use crate::payload::{Payload, cmd};
use crate::registry::{Registry, ScanEvent, ScanObservation, now_ms};
use crate::response::{self, Inbound};
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

/// Characters of an undecodable datagram shown in debug logs.
const RAW_PREVIEW: usize = 160;

/// What a scan response announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub src: SocketAddr,
    pub device_id: Option<String>,
    pub ip: Option<String>,
    pub sku: Option<String>,
    pub mac: Option<String>,
}

/// How one datagram was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Not a JSON object.
    Undecodable,
    /// JSON, but not a scan response. `cmd` is the command seen, if any.
    Ignored { cmd: Option<String> },
    /// A scan response.
    Announced(ScanReport),
}

/// Counters for one discovery run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanTally {
    pub datagrams: u64,
    pub undecodable: u64,
    pub ignored: u64,
    pub announced: u64,
    /// Datagrams that filled the receive buffer and may have been cut short.
    pub truncated: u64,
}

impl ScanTally {
    fn count(&mut self, outcome: &ScanOutcome) {
        self.datagrams += 1;
        match outcome {
            ScanOutcome::Undecodable => self.undecodable += 1,
            ScanOutcome::Ignored { .. } => self.ignored += 1,
            ScanOutcome::Announced(_) => self.announced += 1,
        }
    }
}

/// Discovery engine writing into a [`Registry`].
///
/// # Examples
///
/// ```
/// use govee_lan_rs::{Discovery, DiscoveryConfig, Registry, ScanOutcome};
///
/// let registry = Registry::open_in_memory().unwrap();
/// let discovery = Discovery::new(&registry, DiscoveryConfig::default());
///
/// let datagram = br#"{"msg":{"cmd":"scan","data":{"ip":"192.168.1.50","device":"AB:CD","sku":"H6159"}}}"#;
/// let outcome = discovery.handle_datagram(datagram, "192.168.1.50:4001".parse().unwrap());
/// assert!(matches!(outcome, ScanOutcome::Announced(_)));
/// assert_eq!(registry.devices().unwrap().len(), 1);
/// ```
pub struct Discovery<'a, L = NoLookup> {
    registry: &'a Registry,
    config: DiscoveryConfig,
    lookup: L,
}

impl<'a> Discovery<'a, NoLookup> {
    pub fn new(registry: &'a Registry, config: DiscoveryConfig) -> Self {
        Discovery {
            registry,
            config,
            lookup: NoLookup,
        }
    }
}

impl<'a, L: NeighborLookup> Discovery<'a, L> {
    /// Use `lookup` to resolve MAC addresses when `resolve_mac` is set.
    pub fn with_lookup<M: NeighborLookup>(self, lookup: M) -> Discovery<'a, M> {
        Discovery {
            registry: self.registry,
            config: self.config,
            lookup,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Process one received datagram.
    pub fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) -> ScanOutcome {
        self.handle_datagram_at(bytes, src, now_ms())
    }

    /// Process one datagram received at `received_at_ms`.
    ///
    /// Registry errors are logged and do not change the classification.
    pub fn handle_datagram_at(
        &self,
        bytes: &[u8],
        src: SocketAddr,
        received_at_ms: i64,
    ) -> ScanOutcome {
        let event = ScanEvent::new(received_at_ms, src, bytes);
        if let Err(e) = self.registry.record_scan_event(&event) {
            warn!("failed to record scan event from {src}: {e}");
        }

        let inbound = response::decode(bytes);
        if inbound == Inbound::Undecodable {
            let preview: String = event.payload_raw.chars().take(RAW_PREVIEW).collect();
            debug!("[scan] {src} unparsed: {preview:?}");
            return ScanOutcome::Undecodable;
        }

        let Some(data) = inbound.data_for(cmd::SCAN) else {
            let cmd = inbound.cmd().map(str::to_string);
            debug!("[scan] {src} ignored cmd={cmd:?}");
            return ScanOutcome::Ignored { cmd };
        };

        let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        let ip = text("ip");
        let device_id = text("device").filter(|id| !id.is_empty());
        let sku = text("sku");
        let mac = if self.config.resolve_mac {
            ip.as_deref()
                .and_then(|ip| ip.parse().ok())
                .and_then(|ip| self.lookup.lookup(ip))
        } else {
            None
        };

        if let Some(device_id) = &device_id {
            let observation = ScanObservation {
                device_id: device_id.clone(),
                ip: ip.clone(),
                sku: sku.clone(),
                ble_version_hard: text("bleVersionHard"),
                ble_version_soft: text("bleVersionSoft"),
                wifi_version_hard: text("wifiVersionHard"),
                wifi_version_soft: text("wifiVersionSoft"),
                mac: mac.clone(),
                scan_payload: inbound.json().map(Value::to_string).unwrap_or_default(),
                seen_ms: received_at_ms,
            };
            if let Err(e) = self.registry.upsert_device_from_scan(&observation) {
                warn!("failed to store device {device_id}: {e}");
            }
        }

        info!(
            "[scan] ip={} device={} sku={} mac={}",
            ip.as_deref().unwrap_or("-"),
            device_id.as_deref().unwrap_or("-"),
            sku.as_deref().unwrap_or("-"),
            mac.as_deref().unwrap_or("-"),
        );

        ScanOutcome::Announced(ScanReport {
            src,
            device_id,
            ip,
            sku,
            mac,
        })
    }

    /// Receive and process datagrams until the future is dropped.
    ///
    /// Receive errors are logged; the loop keeps going.
    pub async fn listen(&self, socket: &UdpSocket, tally: &mut ScanTally) {
        let mut buffer = vec![0u8; RECV_BUFFER];
        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((size, src)) => {
                    if size == buffer.len() {
                        warn!("datagram from {src} filled the {size}-byte buffer, may be truncated");
                        tally.truncated += 1;
                    }
                    let outcome = self.handle_datagram(&buffer[..size], src);
                    tally.count(&outcome);
                }
                Err(e) => {
                    warn!("scan listener receive failed: {e}");
                    runtime::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Send `scan_repeat` scan requests (at least one), `scan_interval` apart.
    pub async fn send_scan_requests(&self, socket: &UdpSocket) -> Result<()> {
        let blob = Payload::scan().to_bytes()?;
        let target = SocketAddr::from((MULTICAST_GROUP, SCAN_PORT));
        let repeat = self.config.scan_repeat.max(1);

        for i in 0..repeat {
            socket
                .send_to(&blob, target)
                .await
                .map_err(|e| Error::socket("send_to", e))?;
            debug!("sent scan request {}/{repeat} to {target}", i + 1);
            if i + 1 < repeat {
                runtime::sleep(self.config.scan_interval).await;
            }
        }
        Ok(())
    }

    /// Listen for scan responses, optionally broadcasting scan requests first.
    ///
    /// The listener is bound and joined before any request is sent. With
    /// `duration` of `None` the run never ends on its own.
    pub async fn run(&self, duration: Option<Duration>, broadcast: bool) -> Result<ScanTally> {
        let listener = net::listener_socket(self.config.bind_ip)?;
        let sender = if broadcast {
            Some(net::multicast_sender_socket(self.config.bind_ip)?)
        } else {
            None
        };

        let mut tally = ScanTally::default();
        let listen = self.listen(&listener, &mut tally);
        let scan = async {
            if let Some(sender) = &sender
                && let Err(e) = self.send_scan_requests(sender).await
            {
                warn!("scan broadcast failed: {e}");
            }
        };
        let both = futures::future::join(listen, scan);

        match duration {
            Some(duration) => {
                let _ = runtime::timeout(duration, both).await;
            }
            None => {
                both.await;
            }
        }

        info!(
            "discovery finished: {} datagrams, {} announcements, {} truncated",
            tally.datagrams, tally.announced, tally.truncated
        );
        Ok(tally)
    }
}
