//! Unicast control and status interrogation.
//!
//! Every exchange is one request datagram to the device's control port and
//! at most one logical reply. Nothing is retried; timeouts and odd replies
//! are ordinary [`Outcome`]s rather than errors.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ControlConfig;
use crate::errors::Error;
use crate::net::{self, ControlSocket, RECV_BUFFER};
use crate::payload::{Payload, cmd};
use crate::registry::{Interrogation, Registry, Target, now_ms};
use crate::response::{self, Envelope, Inbound};
use crate::runtime::{self, AsyncUdpSocket, Instant};
use crate::status::DeviceStatus;

type Result<T> = std::result::Result<T, Error>;

/// How a single exchange ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Sent without waiting for a reply.
    Sent,
    /// A JSON object answering the request.
    Reply(Value),
    /// A JSON object carrying some other command. Kept for inspection.
    Unexpected(Value),
    /// Nothing arrived before the deadline.
    Timeout,
    /// Only undecodable bytes arrived.
    DecodeFailure,
    /// The local socket failed; the request may not have left the host.
    Transport(String),
}

impl Outcome {
    /// Whether the device answered, or the request was sent fire-and-forget.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Sent | Outcome::Reply(_) | Outcome::Unexpected(_))
    }

    /// Error classification stored with the exchange.
    ///
    /// ```
    /// use govee_lan_rs::Outcome;
    ///
    /// assert_eq!(Outcome::Timeout.error_label().as_deref(), Some("timeout"));
    /// assert_eq!(Outcome::Transport("refused".into()).error_label().as_deref(), Some("oserror:refused"));
    /// assert_eq!(Outcome::Sent.error_label(), None);
    /// ```
    pub fn error_label(&self) -> Option<String> {
        match self {
            Outcome::Sent | Outcome::Reply(_) => None,
            Outcome::Unexpected(_) => Some("unexpected_cmd".to_string()),
            Outcome::Timeout => Some("timeout".to_string()),
            Outcome::DecodeFailure => Some("invalid_json".to_string()),
            Outcome::Transport(detail) => Some(format!("oserror:{detail}")),
        }
    }

    /// The JSON the device sent back, if any.
    pub fn response(&self) -> Option<&Value> {
        match self {
            Outcome::Reply(v) | Outcome::Unexpected(v) => Some(v),
            _ => None,
        }
    }
}

/// One request and how it went.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub cmd: String,
    pub request: Value,
    pub sent_at_ms: i64,
    /// Set when a JSON reply was kept.
    pub received_at_ms: Option<i64>,
    pub outcome: Outcome,
}

impl Exchange {
    fn new(payload: &Payload) -> Self {
        Exchange {
            cmd: payload.cmd().to_string(),
            request: payload.to_value(),
            sent_at_ms: now_ms(),
            received_at_ms: None,
            outcome: Outcome::Sent,
        }
    }

    fn finish(mut self, outcome: Outcome) -> Self {
        if outcome.response().is_some() {
            self.received_at_ms = Some(now_ms());
        }
        self.outcome = outcome;
        self
    }

    /// Registry entry for this exchange against `target`.
    pub fn to_interrogation(&self, target: &Target) -> Interrogation {
        Interrogation {
            device_id: target.device_id.clone(),
            ip: target.ip.to_string(),
            cmd: self.cmd.clone(),
            sent_at_ms: self.sent_at_ms,
            received_at_ms: self.received_at_ms,
            success: self.outcome.is_success(),
            error: self.outcome.error_label(),
            request: self.request.clone(),
            response: self.outcome.response().cloned(),
        }
    }
}

/// Which devices a batch interrogation visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// Registered devices with a known IP, narrowed to `only_ips` when it is
    /// not empty.
    Known { only_ips: Vec<Ipv4Addr> },
    /// These addresses, in order, with registry metadata where the IP matches
    /// a known device.
    Explicit(Vec<Ipv4Addr>),
}

impl TargetSelection {
    /// Every registered device.
    pub fn all() -> Self {
        TargetSelection::Known {
            only_ips: Vec::new(),
        }
    }

    fn resolve(self, registry: &Registry) -> Result<Vec<Target>> {
        let known = registry.list_control_targets()?;
        Ok(match self {
            TargetSelection::Known { only_ips } if only_ips.is_empty() => known,
            TargetSelection::Known { only_ips } => known
                .into_iter()
                .filter(|t| only_ips.contains(&t.ip))
                .collect(),
            TargetSelection::Explicit(ips) => {
                let mut targets: Vec<Target> = Vec::with_capacity(ips.len());
                for ip in ips {
                    if targets.iter().any(|t| t.ip == ip) {
                        continue;
                    }
                    let target = known
                        .iter()
                        .find(|t| t.ip == ip)
                        .cloned()
                        .unwrap_or_else(|| Target::bare(ip));
                    targets.push(target);
                }
                targets
            }
        })
    }
}

/// Store a control exchange as an interrogation.
pub fn record_exchange(registry: &Registry, target: &Target, exchange: &Exchange) -> Result<()> {
    registry.record_interrogation(&exchange.to_interrogation(target))
}

/// Normalize a `devStatus` reply into `status.*` key/values.
///
/// Returns how many keys were written.
pub fn enrich_from_status(registry: &Registry, device_id: &str, reply: &Value) -> Result<usize> {
    let Ok(envelope) = Envelope::deserialize(reply) else {
        return Ok(0);
    };
    let Some(data) = envelope.data().filter(|_| envelope.cmd() == cmd::DEV_STATUS) else {
        return Ok(0);
    };
    let pairs = DeviceStatus::from_data(data).key_values();
    for (key, value) in &pairs {
        registry.set_key_value(device_id, key, value)?;
    }
    Ok(pairs.len())
}

/// Sends commands and status requests from one control socket.
pub struct Controller {
    socket: ControlSocket,
    config: ControlConfig,
}

impl Controller {
    /// Bind the control socket described by `config`.
    pub fn new(config: ControlConfig) -> Result<Self> {
        let socket = net::control_socket(config.bind_ip, config.reply_port, config.timeout)?;
        Ok(Controller { socket, config })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn device_addr(&self, ip: Ipv4Addr) -> SocketAddr {
        SocketAddr::from((ip, self.config.device_port))
    }

    /// Flush replies left over from earlier exchanges, then send.
    async fn send(&self, ip: Ipv4Addr, payload: &Payload) -> std::result::Result<(), Outcome> {
        let bytes = payload
            .to_bytes()
            .map_err(|e| Outcome::Transport(e.to_string()))?;
        let stale = self.socket.discard_pending();
        if stale > 0 {
            debug!("[control] dropped {stale} late datagram(s) before sending to {ip}");
        }
        let to = self.device_addr(ip);
        debug!("[control] -> {to} {payload}");
        self.socket
            .socket()
            .send_to(&bytes, to)
            .await
            .map(|_| ())
            .map_err(|e| Outcome::Transport(e.to_string()))
    }

    /// Send one command, optionally waiting for a single reply.
    ///
    /// Only datagrams from `ip` count as the reply; anything else is skipped
    /// until the timeout passes. Any JSON object from `ip` is a
    /// [`Outcome::Reply`].
    pub async fn send_command(&self, ip: Ipv4Addr, payload: &Payload, wait: bool) -> Exchange {
        let exchange = Exchange::new(payload);
        if let Err(outcome) = self.send(ip, payload).await {
            return exchange.finish(outcome);
        }
        if !wait {
            return exchange.finish(Outcome::Sent);
        }

        let started = Instant::now();
        let mut buffer = vec![0u8; RECV_BUFFER];
        let outcome = loop {
            let Some(remaining) = self.socket.timeout().checked_sub(started.elapsed()) else {
                break Outcome::Timeout;
            };
            match runtime::timeout(remaining, self.socket.socket().recv_from(&mut buffer)).await {
                Err(_) => break Outcome::Timeout,
                Ok(Err(e)) => break Outcome::Transport(e.to_string()),
                Ok(Ok((_, from))) if from.ip() != IpAddr::V4(ip) => {
                    debug!("[control] ignoring datagram from {from} while waiting on {ip}");
                }
                Ok(Ok((size, _))) => {
                    break match response::decode(&buffer[..size]).into_json() {
                        Some(json) => Outcome::Reply(json),
                        None => Outcome::DecodeFailure,
                    };
                }
            }
        };
        exchange.finish(outcome)
    }

    /// Ask one device for its status.
    ///
    /// Receives until a JSON object from `ip` arrives or the timeout passes.
    /// Undecodable datagrams and datagrams from other hosts do not end the
    /// wait.
    pub async fn interrogate_device(
        &self,
        ip: Ipv4Addr,
        device_id: Option<&str>,
        sku: Option<&str>,
    ) -> Exchange {
        let payload = if self.config.scope_status_requests {
            Payload::dev_status(device_id, sku)
        } else {
            Payload::dev_status(None, None)
        };
        let exchange = Exchange::new(&payload);
        if let Err(outcome) = self.send(ip, &payload).await {
            return exchange.finish(outcome);
        }

        let started = Instant::now();
        let mut buffer = vec![0u8; RECV_BUFFER];
        let mut saw_noise = false;

        let outcome = loop {
            let Some(remaining) = self.socket.timeout().checked_sub(started.elapsed()) else {
                break None;
            };
            match runtime::timeout(remaining, self.socket.socket().recv_from(&mut buffer)).await {
                Err(_) => break None,
                Ok(Err(e)) => break Some(Outcome::Transport(e.to_string())),
                Ok(Ok((size, from))) => {
                    if from.ip() != IpAddr::V4(ip) {
                        debug!("[devStatus] ignoring datagram from {from} while waiting on {ip}");
                        continue;
                    }
                    match response::decode(&buffer[..size]) {
                        Inbound::Undecodable => {
                            debug!("[devStatus] undecodable datagram from {from}");
                            saw_noise = true;
                        }
                        inbound if inbound.cmd() == Some(cmd::DEV_STATUS) => {
                            break inbound.into_json().map(Outcome::Reply);
                        }
                        inbound => break inbound.into_json().map(Outcome::Unexpected),
                    }
                }
            }
        };

        let outcome = outcome.unwrap_or(if saw_noise {
            Outcome::DecodeFailure
        } else {
            Outcome::Timeout
        });
        exchange.finish(outcome)
    }

    /// Interrogate a registry target, using its metadata for scoping.
    pub async fn interrogate_target(&self, target: &Target) -> Exchange {
        self.interrogate_device(target.ip, target.device_id.as_deref(), target.sku.as_deref())
            .await
    }

    /// Interrogate every selected target, one at a time.
    ///
    /// Each attempt is recorded. With `enrich`, clean replies from known
    /// devices are also normalized into key/values. Per-target failures are
    /// logged and never stop the batch.
    pub async fn interrogate_all(
        &self,
        registry: &Registry,
        selection: TargetSelection,
        enrich: bool,
    ) -> Result<Vec<(Target, Exchange)>> {
        let targets = selection.resolve(registry)?;
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let exchange = self.interrogate_target(&target).await;
            if let Err(e) = record_exchange(registry, &target, &exchange) {
                warn!("failed to record interrogation of {}: {e}", target.ip);
            }

            if enrich
                && let (Outcome::Reply(reply), Some(device_id)) =
                    (&exchange.outcome, target.device_id.as_deref())
            {
                match enrich_from_status(registry, device_id, reply) {
                    Ok(n) => debug!("[devStatus] stored {n} status fields for {device_id}"),
                    Err(e) => warn!("failed to store status for {device_id}: {e}"),
                }
            }

            info!(
                "[devStatus] ip={} device={} ok={} err={}",
                target.ip,
                target.label(),
                exchange.outcome.is_success(),
                exchange.outcome.error_label().as_deref().unwrap_or("-"),
            );
            results.push((target, exchange));
        }
        Ok(results)
    }
}

#[cfg(all(test, feature = "runtime-tokio"))]
mod tests {
    use super::*;
    use crate::registry::ScanObservation;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::UdpSocket as FakeSocket;
    use tokio::task::JoinHandle;

    /// A loopback "device" that answers the first request with `replies`.
    async fn fake_device(replies: Vec<Vec<u8>>) -> (u16, JoinHandle<Value>) {
        let socket = FakeSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let (n, from) = socket.recv_from(&mut buf).await.unwrap();
            for reply in replies {
                socket.send_to(&reply, from).await.unwrap();
            }
            serde_json::from_slice(&buf[..n]).unwrap()
        });
        (port, handle)
    }

    fn controller(device_port: u16) -> Controller {
        Controller::new(ControlConfig {
            bind_ip: Some(Ipv4Addr::LOCALHOST),
            timeout: Duration::from_millis(300),
            device_port,
            ..ControlConfig::default()
        })
        .unwrap()
    }

    fn registry_with_device(device_id: &str) -> Registry {
        let registry = Registry::open_in_memory().unwrap();
        registry
            .upsert_device_from_scan(&ScanObservation {
                device_id: device_id.to_string(),
                ip: Some("127.0.0.1".into()),
                sku: Some("H6159".into()),
                scan_payload: "{}".into(),
                seen_ms: 1,
                ..Default::default()
            })
            .unwrap();
        registry
    }

    fn status_reply(data: Value) -> Vec<u8> {
        json!({"msg": {"cmd": "devStatus", "data": data}})
            .to_string()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_timeout_is_recorded() {
        let (port, _device) = fake_device(vec![]).await;
        let controller = controller(port);
        let registry = Registry::open_in_memory().unwrap();

        let results = controller
            .interrogate_all(
                &registry,
                TargetSelection::Explicit(vec![Ipv4Addr::LOCALHOST]),
                true,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.outcome, Outcome::Timeout);

        let logged = registry.interrogations(10, None).unwrap();
        assert_eq!(logged.len(), 1);
        assert!(!logged[0].success);
        assert_eq!(logged[0].error.as_deref(), Some("timeout"));
        assert_eq!(logged[0].received_at_ms, None);
        assert_eq!(logged[0].device_id, None);
        assert_eq!(logged[0].request, json!({"msg": {"cmd": "devStatus", "data": {}}}));
    }

    #[tokio::test]
    async fn test_status_reply_is_enriched() {
        let (port, device) = fake_device(vec![status_reply(json!({"onOff": 1, "brightness": 80}))]).await;
        let controller = controller(port);
        let registry = registry_with_device("AB:CD");

        let results = controller
            .interrogate_all(&registry, TargetSelection::all(), true)
            .await
            .unwrap();
        assert!(matches!(results[0].1.outcome, Outcome::Reply(_)));
        assert_eq!(device.await.unwrap()["msg"]["cmd"], json!("devStatus"));

        let kv = registry.key_values(Some("AB:CD"), Some("status."), 100).unwrap();
        let mut pairs: Vec<(String, Value)> = kv.into_iter().map(|kv| (kv.key, kv.value)).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            pairs,
            vec![
                ("status.brightness".to_string(), json!(80)),
                ("status.onOff".to_string(), json!(1)),
            ]
        );

        let logged = registry.interrogations(10, None).unwrap();
        assert!(logged[0].success);
        assert_eq!(logged[0].error, None);
        assert!(logged[0].received_at_ms.is_some());
        assert_eq!(
            registry.device("AB:CD").unwrap().unwrap().last_status_payload,
            Some(json!({"msg": {"cmd": "devStatus", "data": {"onOff": 1, "brightness": 80}}}))
        );
    }

    #[tokio::test]
    async fn test_no_enrich_leaves_key_values_alone() {
        let (port, _device) = fake_device(vec![status_reply(json!({"onOff": 0}))]).await;
        let controller = controller(port);
        let registry = registry_with_device("AB:CD");

        controller
            .interrogate_all(&registry, TargetSelection::all(), false)
            .await
            .unwrap();
        assert!(registry.key_values(None, None, 100).unwrap().is_empty());
        assert_eq!(registry.interrogations(10, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_json_only() {
        let (port, _device) = fake_device(vec![b"\xffnot json".to_vec()]).await;
        let exchange = controller(port)
            .interrogate_device(Ipv4Addr::LOCALHOST, None, None)
            .await;
        assert_eq!(exchange.outcome, Outcome::DecodeFailure);
        assert_eq!(exchange.outcome.error_label().as_deref(), Some("invalid_json"));
        assert_eq!(exchange.received_at_ms, None);
    }

    #[tokio::test]
    async fn test_noise_then_reply() {
        let (port, _device) = fake_device(vec![
            b"garbage".to_vec(),
            status_reply(json!({"onOff": 1})),
        ])
        .await;
        let exchange = controller(port)
            .interrogate_device(Ipv4Addr::LOCALHOST, None, None)
            .await;
        assert_eq!(
            exchange.outcome,
            Outcome::Reply(json!({"msg": {"cmd": "devStatus", "data": {"onOff": 1}}}))
        );
    }

    #[tokio::test]
    async fn test_unexpected_cmd_is_kept_but_not_enriched() {
        let (port, _device) =
            fake_device(vec![br#"{"msg":{"cmd":"turn","data":{"value":1}}}"#.to_vec()]).await;
        let controller = controller(port);
        let registry = registry_with_device("AB:CD");

        let results = controller
            .interrogate_all(&registry, TargetSelection::all(), true)
            .await
            .unwrap();
        assert!(matches!(results[0].1.outcome, Outcome::Unexpected(_)));

        let logged = registry.interrogations(10, None).unwrap();
        assert!(logged[0].success);
        assert_eq!(logged[0].error.as_deref(), Some("unexpected_cmd"));
        assert_eq!(logged[0].response.as_ref().unwrap()["msg"]["cmd"], json!("turn"));
        assert!(registry.key_values(None, None, 100).unwrap().is_empty());
        assert_eq!(
            registry.device("AB:CD").unwrap().unwrap().last_status_payload,
            None
        );
    }

    #[tokio::test]
    async fn test_scoped_status_request() {
        let (port, device) = fake_device(vec![status_reply(json!({}))]).await;
        let controller = Controller::new(ControlConfig {
            bind_ip: Some(Ipv4Addr::LOCALHOST),
            timeout: Duration::from_millis(300),
            device_port: port,
            scope_status_requests: true,
            ..ControlConfig::default()
        })
        .unwrap();

        controller
            .interrogate_device(Ipv4Addr::LOCALHOST, Some("AB:CD"), Some("H6159"))
            .await;
        assert_eq!(
            device.await.unwrap(),
            json!({"msg": {"cmd": "devStatus", "data": {"device": "AB:CD", "sku": "H6159"}}})
        );
    }

    #[tokio::test]
    async fn test_send_command() {
        let (port, device) = fake_device(vec![]).await;
        let exchange = controller(port)
            .send_command(Ipv4Addr::LOCALHOST, &Payload::turn(crate::PowerMode::On), false)
            .await;
        assert_eq!(exchange.outcome, Outcome::Sent);
        assert!(exchange.outcome.is_success());
        assert_eq!(
            device.await.unwrap(),
            json!({"msg": {"cmd": "turn", "data": {"value": 1}}})
        );

        let (port, _device) =
            fake_device(vec![br#"{"msg":{"cmd":"brightness","data":{}}}"#.to_vec()]).await;
        let payload = Payload::brightness(&crate::Brightness::create(40).unwrap());
        let exchange = controller(port)
            .send_command(Ipv4Addr::LOCALHOST, &payload, true)
            .await;
        assert!(matches!(exchange.outcome, Outcome::Reply(_)));
        assert!(exchange.received_at_ms.is_some());

        let target = Target::bare(Ipv4Addr::LOCALHOST);
        let registry = Registry::open_in_memory().unwrap();
        record_exchange(&registry, &target, &exchange).unwrap();
        let logged = registry.interrogations(10, None).unwrap();
        assert_eq!(logged[0].cmd, "brightness");
        assert_eq!(logged[0].ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_explicit_targets_merge_known_metadata() {
        let registry = registry_with_device("AB:CD");
        let targets = TargetSelection::Explicit(vec![
            Ipv4Addr::new(10, 0, 0, 9),
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(10, 0, 0, 9),
        ])
        .resolve(&registry)
        .unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], Target::bare(Ipv4Addr::new(10, 0, 0, 9)));
        assert_eq!(targets[1].device_id.as_deref(), Some("AB:CD"));
        assert_eq!(targets[1].sku.as_deref(), Some("H6159"));

        let filtered = TargetSelection::Known {
            only_ips: vec![Ipv4Addr::new(10, 0, 0, 9)],
        }
        .resolve(&registry)
        .unwrap();
        assert!(filtered.is_empty());
    }
}
