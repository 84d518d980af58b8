//! Color payload probing.
//!
//! Models differ in which color command they accept and whether channels are
//! 0-255 or percentages. The probe walks through the combinations against one
//! device and reports how each attempt went, so the working variant can be
//! read off a table.

use std::time::Duration;

use log::{debug, info, warn};
use strum::IntoEnumIterator;

use crate::control::{Controller, Exchange, Outcome, record_exchange};
use crate::payload::Payload;
use crate::registry::{Registry, Target};
use crate::runtime;
use crate::types::{Color, ColorCommand, ColorScale, Kelvin};

/// Pause before every attempt but the first.
pub const PROBE_PACING: Duration = Duration::from_secs(1);

/// One payload variant to try.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCandidate {
    pub command: ColorCommand,
    pub scale: ColorScale,
    pub kelvin: Option<Kelvin>,
    pub color_name: String,
    pub payload: Payload,
}

/// A candidate and how the device responded to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeAttempt {
    pub candidate: ProbeCandidate,
    pub exchange: Exchange,
}

impl ProbeAttempt {
    /// Short status for tables: `ok`, or the error classification.
    pub fn status(&self) -> String {
        match &self.exchange.outcome {
            Outcome::Reply(_) => "ok".to_string(),
            Outcome::Sent => "sent".to_string(),
            other => other.error_label().unwrap_or_default(),
        }
    }

    pub fn answered(&self) -> bool {
        self.exchange.outcome.response().is_some()
    }
}

/// Build every valid candidate, colors outermost.
///
/// For each color, command variant and scale, the requested Kelvin values are
/// tried first, then no Kelvin when `include_no_kelvin` is set. Combinations
/// the command rejects are skipped.
pub fn candidates(
    colors: &[(String, Color)],
    kelvins: &[Kelvin],
    include_no_kelvin: bool,
) -> Vec<ProbeCandidate> {
    let kelvin_options: Vec<Option<Kelvin>> = kelvins
        .iter()
        .copied()
        .map(Some)
        .chain(include_no_kelvin.then_some(None))
        .collect();

    let mut out = Vec::new();
    for (color_name, color) in colors {
        for command in ColorCommand::iter() {
            for scale in ColorScale::ALL {
                for kelvin in &kelvin_options {
                    match Payload::color(command, Some(*color), *kelvin, scale) {
                        Ok(payload) => out.push(ProbeCandidate {
                            command,
                            scale,
                            kelvin: *kelvin,
                            color_name: color_name.clone(),
                            payload,
                        }),
                        Err(e) => debug!("[probe] skipping {command} scale={scale}: {e}"),
                    }
                }
            }
        }
    }
    out
}

/// Sends probe candidates to one device.
pub struct ColorProbe<'a> {
    controller: &'a Controller,
    registry: Option<&'a Registry>,
    pacing: Duration,
    stop_on_success: bool,
}

impl<'a> ColorProbe<'a> {
    pub fn new(controller: &'a Controller) -> Self {
        ColorProbe {
            controller,
            registry: None,
            pacing: PROBE_PACING,
            stop_on_success: false,
        }
    }

    /// Record every attempt as an interrogation.
    pub fn with_registry(mut self, registry: &'a Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Stop at the first attempt that gets a JSON reply.
    pub fn stop_on_success(mut self, stop: bool) -> Self {
        self.stop_on_success = stop;
        self
    }

    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Try each candidate in order, waiting for a reply every time.
    pub async fn run(&self, target: &Target, candidates: Vec<ProbeCandidate>) -> Vec<ProbeAttempt> {
        let total = candidates.len();
        let mut attempts = Vec::with_capacity(total);

        for (i, candidate) in candidates.into_iter().enumerate() {
            if i > 0 {
                runtime::sleep(self.pacing).await;
            }

            let exchange = self
                .controller
                .send_command(target.ip, &candidate.payload, true)
                .await;
            if let Some(registry) = self.registry
                && let Err(e) = record_exchange(registry, target, &exchange)
            {
                warn!("failed to record probe attempt: {e}");
            }

            let attempt = ProbeAttempt {
                candidate,
                exchange,
            };
            info!(
                "[probe {}/{total}] ip={} cmd={} scale={} kelvin={} color={} status={}",
                i + 1,
                target.ip,
                attempt.candidate.command,
                attempt.candidate.scale,
                attempt
                    .candidate
                    .kelvin
                    .map(|k| k.kelvin().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                attempt.candidate.color_name,
                attempt.status(),
            );

            let answered = attempt.answered();
            attempts.push(attempt);
            if answered && self.stop_on_success {
                break;
            }
        }
        attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Vec<(String, Color)> {
        vec![("red".to_string(), Color::rgb(255, 0, 0))]
    }

    #[test]
    fn test_candidate_enumeration() {
        let kelvins = [Kelvin::create(3000).unwrap()];

        // color/setColor: 2 scales x (3000, none); colorwc/setColorWC: 2 scales x 3000
        let all = candidates(&red(), &kelvins, true);
        assert_eq!(all.len(), 12);
        assert!(
            all.iter()
                .filter(|c| c.kelvin.is_none())
                .all(|c| !c.command.requires_kelvin())
        );

        let require_kelvin = candidates(&red(), &kelvins, false);
        assert_eq!(require_kelvin.len(), 8);
        assert!(require_kelvin.iter().all(|c| c.kelvin.is_some()));

        let first = &all[0];
        assert_eq!(first.command, ColorCommand::Color);
        assert_eq!(first.scale, ColorScale::Full);
        assert_eq!(first.kelvin, Some(kelvins[0]));
    }

    #[test]
    fn test_percent_candidates_are_scaled() {
        let all = candidates(&[("orange".into(), Color::rgb(255, 165, 0))], &[], true);
        let percent = all
            .iter()
            .find(|c| c.scale == ColorScale::Percent)
            .unwrap();
        assert_eq!(
            percent.payload.data(),
            &serde_json::json!({"color": {"r": 100, "g": 65, "b": 0}})
        );
    }

    #[cfg(feature = "runtime-tokio")]
    mod runtime_tests {
        use super::*;
        use crate::config::ControlConfig;
        use std::net::Ipv4Addr;
        use tokio::net::UdpSocket as FakeSocket;

        fn controller(device_port: u16) -> Controller {
            Controller::new(ControlConfig {
                bind_ip: Some(Ipv4Addr::LOCALHOST),
                timeout: Duration::from_millis(100),
                device_port,
                ..ControlConfig::default()
            })
            .unwrap()
        }

        #[tokio::test]
        async fn test_missing_replies_are_not_fatal() {
            let device = FakeSocket::bind("127.0.0.1:0").await.unwrap();
            let controller = controller(device.local_addr().unwrap().port());
            let registry = Registry::open_in_memory().unwrap();

            let plan = candidates(&red(), &[], true);
            assert_eq!(plan.len(), 4);

            let attempts = ColorProbe::new(&controller)
                .with_registry(&registry)
                .pacing(Duration::ZERO)
                .run(&Target::bare(Ipv4Addr::LOCALHOST), plan)
                .await;

            assert_eq!(attempts.len(), 4);
            assert!(attempts.iter().all(|a| a.status() == "timeout"));
            assert_eq!(registry.interrogations(10, None).unwrap().len(), 4);
        }

        #[tokio::test]
        async fn test_late_reply_not_credited_to_next_attempt() {
            let device = FakeSocket::bind("127.0.0.1:0").await.unwrap();
            let controller = controller(device.local_addr().unwrap().port());
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let (_, from) = device.recv_from(&mut buf).await.unwrap();
                // answer the first request only, well after the 100 ms timeout
                tokio::time::sleep(Duration::from_millis(200)).await;
                device.send_to(br#"{"ack":"first"}"#, from).await.unwrap();
                loop {
                    device.recv_from(&mut buf).await.unwrap();
                }
            });

            let attempts = ColorProbe::new(&controller)
                .stop_on_success(true)
                .pacing(Duration::from_millis(300))
                .run(
                    &Target::bare(Ipv4Addr::LOCALHOST),
                    candidates(&red(), &[], true),
                )
                .await;

            assert_eq!(attempts.len(), 4);
            assert!(attempts.iter().all(|a| a.status() == "timeout"));
            assert!(attempts.iter().all(|a| !a.answered()));
        }

        #[tokio::test]
        async fn test_replies_from_other_hosts_are_ignored() {
            let device = FakeSocket::bind("127.0.0.1:0").await.unwrap();
            let stranger = FakeSocket::bind("127.0.0.2:0").await;
            let controller = controller(device.local_addr().unwrap().port());
            let Ok(stranger) = stranger else {
                // 127.0.0.2 is not routable on every host
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let (_, from) = device.recv_from(&mut buf).await.unwrap();
                stranger.send_to(br#"{"from":"stranger"}"#, from).await.unwrap();
            });

            let attempts = ColorProbe::new(&controller)
                .pacing(Duration::ZERO)
                .run(
                    &Target::bare(Ipv4Addr::LOCALHOST),
                    candidates(&red(), &[], true)[..1].to_vec(),
                )
                .await;
            assert_eq!(attempts[0].status(), "timeout");
        }

        #[tokio::test]
        async fn test_stop_on_success() {
            let device = FakeSocket::bind("127.0.0.1:0").await.unwrap();
            let controller = controller(device.local_addr().unwrap().port());
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let (_, from) = device.recv_from(&mut buf).await.unwrap();
                device
                    .send_to(br#"{"msg":{"cmd":"color","data":{}}}"#, from)
                    .await
                    .unwrap();
            });

            let attempts = ColorProbe::new(&controller)
                .stop_on_success(true)
                .pacing(Duration::ZERO)
                .run(
                    &Target::bare(Ipv4Addr::LOCALHOST),
                    candidates(&red(), &[], true),
                )
                .await;

            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].status(), "ok");
            assert_eq!(attempts[0].candidate.command, ColorCommand::Color);
        }
    }
}
