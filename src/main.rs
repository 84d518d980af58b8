//! `govee-lan`: discovery, registry and control tool for Govee LAN lights.
//!
//! # Usage
//!
//! ```bash
//! govee-lan scan --duration 20
//! govee-lan listen --duration 0 --resolve-mac
//! govee-lan interrogate
//! govee-lan dump devices --pretty
//! govee-lan control --ip 192.168.1.50 on
//! govee-lan control --device-id ABCD1234 color red
//! govee-lan control --ip 192.168.1.50 colorwc --kelvin 2700
//! govee-lan control --ip 192.168.1.50 color red --color-cmd setColor --color-scale 100
//! govee-lan control --ip 192.168.1.50 color-probe --stop-on-success
//! ```

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{LevelFilter, debug, error, info, warn};
use serde::Serialize;

use govee_lan_rs::{
    Brightness, Color, ColorCommand, ColorProbe, ColorScale, Controller, Discovery, Error,
    IpNeighbor, Kelvin, Outcome, Payload, PowerMode, Registry, Settings, Target,
    TargetSelection, candidates, record_exchange,
};

/// Govee LAN discovery, registry and control.
#[derive(Parser, Debug)]
#[command(name = "govee-lan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite registry path (overrides the config file).
    #[arg(long, value_name = "PATH", env = "GOVEE_DB")]
    db: Option<PathBuf>,

    /// Local IPv4 to bind; recommended on multi-homed hosts.
    #[arg(long, env = "GOVEE_BIND_IP")]
    bind_ip: Option<Ipv4Addr>,

    /// Settings file (JSON).
    #[arg(short, long, value_name = "FILE", env = "GOVEE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "GOVEE_LOG_LEVEL")]
    log_level: LevelFilter,

    /// Per-datagram and per-payload logging; same as `--log-level debug`.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send multicast scan requests and listen for responses
    Scan {
        /// Seconds to keep listening; 0 listens forever
        #[arg(long, default_value_t = 15)]
        duration: u64,
        /// Number of scan requests to send
        #[arg(long)]
        scan_repeat: Option<u32>,
        /// Seconds between scan requests
        #[arg(long, value_parser = parse_seconds)]
        scan_interval: Option<Duration>,
        /// Best-effort MAC lookup via `ip neigh`
        #[arg(long)]
        resolve_mac: bool,
    },
    /// Listen for scan responses without sending requests
    Listen {
        /// Seconds to listen; 0 listens forever
        #[arg(long, default_value_t = 0)]
        duration: u64,
        #[arg(long)]
        resolve_mac: bool,
    },
    /// Ask devices for their status and record the answers
    Interrogate {
        /// Receive timeout in seconds
        #[arg(long, value_parser = parse_seconds)]
        timeout: Option<Duration>,
        /// Interrogate this address, registered or not (repeatable)
        #[arg(long)]
        ip: Vec<Ipv4Addr>,
        /// Restrict registered devices to this address (repeatable)
        #[arg(long)]
        only_ip: Vec<Ipv4Addr>,
        /// Do not normalize status fields into key/values
        #[arg(long)]
        no_enrich: bool,
    },
    /// Dump registry contents as JSON
    Dump {
        kind: DumpKind,
        /// Maximum rows (events, interrogations, kv)
        #[arg(long, default_value_t = 2000)]
        limit: u32,
        /// Only rows at or after this epoch millisecond (events, interrogations)
        #[arg(long)]
        since_ms: Option<i64>,
        /// Restrict to one device (kv)
        #[arg(long)]
        device_id: Option<String>,
        /// Restrict keys to this prefix (kv)
        #[arg(long)]
        key_prefix: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Send a control command to one device
    Control(ControlArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DumpKind {
    Devices,
    Events,
    Interrogations,
    Kv,
}

#[derive(clap::Args, Debug)]
struct ControlArgs {
    /// Target device IP
    #[arg(long, required_unless_present = "device_id", conflicts_with = "device_id")]
    ip: Option<Ipv4Addr>,
    /// Target device id; the IP is looked up in the registry
    #[arg(long)]
    device_id: Option<String>,
    /// Receive timeout in seconds
    #[arg(long, value_parser = parse_seconds)]
    timeout: Option<Duration>,
    /// Do not wait for a reply
    #[arg(long)]
    no_wait: bool,
    /// Pretty-print reply JSON
    #[arg(long)]
    pretty: bool,
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Turn the device on
    On,
    /// Turn the device off
    Off,
    /// Set brightness (0-100)
    Brightness {
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },
    /// Set white color temperature in Kelvin
    ColorTemp {
        #[arg(allow_hyphen_values = true)]
        kelvin: i64,
    },
    /// Set an RGB color (name or hex), optionally with a Kelvin value
    Color {
        /// Color name (red, warm-white, ..) or hex (RRGGBB / #RRGGBB)
        color: String,
        #[arg(long, default_value = "color")]
        color_cmd: ColorCommand,
        /// 255, or 100 for models that expect percentages
        #[arg(long, default_value = "255")]
        color_scale: ColorScale,
        #[arg(long, allow_hyphen_values = true)]
        kelvin: Option<i64>,
    },
    /// Set Kelvin with optional RGB on dual-capability devices
    Colorwc {
        #[arg(long, allow_hyphen_values = true)]
        kelvin: Option<i64>,
        /// Defaults to warm-white below 4000 K and white otherwise
        #[arg(long)]
        color: Option<String>,
        #[arg(long, default_value = "colorwc")]
        color_cmd: ColorCommand,
        #[arg(long, default_value = "255")]
        color_scale: ColorScale,
    },
    /// Try color payload variants one by one, 1 s apart
    ColorProbe {
        /// Colors to try (repeatable; default red, green, blue)
        #[arg(long)]
        color: Vec<String>,
        /// Kelvin values to try (repeatable; default 3000, 4000, 6500)
        #[arg(long)]
        kelvin: Vec<i64>,
        /// Skip variants without a Kelvin value
        #[arg(long)]
        require_kelvin: bool,
        /// Stop at the first attempt that gets a reply
        #[arg(long)]
        stop_on_success: bool,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Brightness { .. } => "brightness",
            Action::ColorTemp { .. } => "color-temp",
            Action::Color { .. } => "color",
            Action::Colorwc { .. } => "colorwc",
            Action::ColorProbe { .. } => "color-probe",
        }
    }
}

fn parse_seconds(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        cli.log_level.max(LevelFilter::Debug)
    } else {
        cli.log_level
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let validation = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<Error>())
                .any(Error::is_validation);
            ExitCode::from(if validation { 2 } else { 1 })
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path).context("Failed to load configuration")?,
        None => Settings::default(),
    };
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(ip) = cli.bind_ip {
        settings.bind_ip = Some(ip);
    }

    let registry = Registry::open(&settings.db_path)
        .with_context(|| format!("Failed to open registry {}", settings.db_path.display()))?;

    let result = match cli.command {
        Command::Scan {
            duration,
            scan_repeat,
            scan_interval,
            resolve_mac,
        } => {
            let mut config = settings.discovery();
            if let Some(repeat) = scan_repeat {
                config.scan_repeat = repeat;
            }
            if let Some(interval) = scan_interval {
                config.scan_interval = interval;
            }
            config.resolve_mac |= resolve_mac;
            discover(&registry, config, duration, true).await
        }
        Command::Listen {
            duration,
            resolve_mac,
        } => {
            let mut config = settings.discovery();
            config.resolve_mac |= resolve_mac;
            discover(&registry, config, duration, false).await
        }
        Command::Interrogate {
            timeout,
            ip,
            only_ip,
            no_enrich,
        } => {
            let mut config = settings.control();
            if let Some(timeout) = timeout {
                config.timeout = timeout;
            }
            let selection = if ip.is_empty() {
                TargetSelection::Known { only_ips: only_ip }
            } else {
                TargetSelection::Explicit(ip)
            };
            let controller = Controller::new(config).context("Failed to open control socket")?;
            let results = controller
                .interrogate_all(&registry, selection, !no_enrich)
                .await?;
            let answered = results
                .iter()
                .filter(|(_, exchange)| exchange.outcome.response().is_some())
                .count();
            info!("interrogated {} devices, {answered} answered", results.len());
            Ok(())
        }
        Command::Dump {
            kind,
            limit,
            since_ms,
            device_id,
            key_prefix,
            pretty,
        } => match kind {
            DumpKind::Devices => print_json(&registry.devices()?, pretty),
            DumpKind::Events => print_json(&registry.scan_events(limit, since_ms)?, pretty),
            DumpKind::Interrogations => {
                print_json(&registry.interrogations(limit, since_ms)?, pretty)
            }
            DumpKind::Kv => print_json(
                &registry.key_values(device_id.as_deref(), key_prefix.as_deref(), limit)?,
                pretty,
            ),
        },
        Command::Control(args) => {
            let mut config = settings.control();
            if let Some(timeout) = args.timeout {
                config.timeout = timeout;
            }
            control(&registry, config, args).await
        }
    };

    if let Err(e) = registry.close() {
        warn!("failed to close registry: {e}");
    }
    result
}

async fn discover(
    registry: &Registry,
    config: govee_lan_rs::DiscoveryConfig,
    duration: u64,
    broadcast: bool,
) -> Result<()> {
    let duration = (duration > 0).then(|| Duration::from_secs(duration));
    let tally = Discovery::new(registry, config)
        .with_lookup(IpNeighbor)
        .run(duration, broadcast)
        .await
        .context("Failed to start discovery")?;
    debug!("{tally:?}");
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

fn resolve_target(registry: &Registry, args: &ControlArgs) -> Result<Target> {
    if let Some(ip) = args.ip {
        let known = registry.list_control_targets()?;
        return Ok(known
            .into_iter()
            .find(|t| t.ip == ip)
            .unwrap_or_else(|| Target::bare(ip)));
    }
    let Some(device_id) = &args.device_id else {
        bail!("must supply --ip or --device-id");
    };
    let ip = registry
        .resolve_ip(device_id)?
        .ok_or_else(|| Error::DeviceNotFound(device_id.clone()))?;
    Ok(Target {
        ip,
        device_id: Some(device_id.clone()),
        sku: None,
    })
}

fn parse_kelvin(kelvin: Option<i64>) -> Result<Option<Kelvin>, Error> {
    kelvin.map(Kelvin::create).transpose()
}

/// The single payload an action sends; `None` for the probe.
fn build_payload(action: &Action) -> Result<Option<Payload>, Error> {
    Ok(Some(match action {
        Action::On => Payload::turn(PowerMode::On),
        Action::Off => Payload::turn(PowerMode::Off),
        Action::Brightness { value } => Payload::brightness(&Brightness::create(*value)?),
        Action::ColorTemp { kelvin } => Payload::color_temperature(&Kelvin::create(*kelvin)?),
        Action::Color {
            color,
            color_cmd,
            color_scale,
            kelvin,
        } => Payload::color(
            *color_cmd,
            Some(color.parse()?),
            parse_kelvin(*kelvin)?,
            *color_scale,
        )?,
        Action::Colorwc {
            kelvin,
            color,
            color_cmd,
            color_scale,
        } => {
            let kelvin = parse_kelvin(*kelvin)?;
            let color: Color = match color {
                Some(c) => c.parse()?,
                None if kelvin.is_some_and(|k| k.kelvin() < 4000) => "warm-white".parse()?,
                None => "white".parse()?,
            };
            Payload::color(*color_cmd, Some(color), kelvin, *color_scale)?
        }
        Action::ColorProbe { .. } => return Ok(None),
    }))
}

async fn control(
    registry: &Registry,
    config: govee_lan_rs::ControlConfig,
    args: ControlArgs,
) -> Result<()> {
    let target = resolve_target(registry, &args)?;

    if let Action::ColorProbe {
        color,
        kelvin,
        require_kelvin,
        stop_on_success,
    } = &args.action
    {
        return color_probe(
            registry,
            config,
            &target,
            color,
            kelvin,
            *require_kelvin,
            *stop_on_success,
        )
        .await;
    }

    let action = args.action.name();
    let Some(payload) = build_payload(&args.action)? else {
        bail!("[control] action {action} has no single payload");
    };
    let controller = Controller::new(config).context("Failed to open control socket")?;
    debug!("[control] ip={} action={action} payload={payload}", target.ip);

    let exchange = controller
        .send_command(target.ip, &payload, !args.no_wait)
        .await;
    if let Err(e) = record_exchange(registry, &target, &exchange) {
        warn!("failed to record control exchange: {e}");
    }

    match &exchange.outcome {
        Outcome::Transport(detail) => {
            bail!("[control] ip={} action={action} error=oserror:{detail}", target.ip)
        }
        outcome => {
            if let Some(reply) = outcome.response() {
                print_json(reply, args.pretty)?;
            } else if let Some(label) = outcome.error_label() {
                warn!("[control] ip={} action={action} warning={label}", target.ip);
            } else {
                info!("[control] ip={} action={action} ok", target.ip);
            }
            Ok(())
        }
    }
}

async fn color_probe(
    registry: &Registry,
    config: govee_lan_rs::ControlConfig,
    target: &Target,
    colors: &[String],
    kelvins: &[i64],
    require_kelvin: bool,
    stop_on_success: bool,
) -> Result<()> {
    let colors: Vec<String> = if colors.is_empty() {
        ["red", "green", "blue"].map(String::from).to_vec()
    } else {
        colors.to_vec()
    };
    let kelvins: Vec<i64> = if kelvins.is_empty() {
        vec![3000, 4000, 6500]
    } else {
        kelvins.to_vec()
    };

    let colors = colors
        .into_iter()
        .map(|name| {
            let color: Color = name.parse()?;
            Ok((name, color))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let kelvins = kelvins
        .into_iter()
        .map(Kelvin::create)
        .collect::<Result<Vec<_>, Error>>()?;

    let plan = candidates(&colors, &kelvins, !require_kelvin);
    if plan.is_empty() {
        bail!("[control] no probe payloads were generated");
    }

    let controller = Controller::new(config).context("Failed to open control socket")?;
    let attempts = ColorProbe::new(&controller)
        .with_registry(registry)
        .stop_on_success(stop_on_success)
        .run(target, plan)
        .await;

    let rows: Vec<[String; 5]> = attempts
        .iter()
        .map(|a| {
            [
                a.candidate.command.to_string(),
                a.candidate.scale.to_string(),
                a.candidate
                    .kelvin
                    .map(|k| k.kelvin().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                a.candidate.color_name.clone(),
                a.status(),
            ]
        })
        .collect();
    print_table(["cmd", "scale", "kelvin", "color", "status"], &rows)?;
    Ok(())
}

fn print_table(headers: [&str; 5], rows: &[[String; 5]]) -> Result<()> {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = std::io::stdout().lock();
    let line = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    writeln!(out, "{}", line(headers))?;
    writeln!(out, "{}", line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)))?;
    for row in rows {
        writeln!(out, "{}", line(row.each_ref().map(String::as_str)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 203.0.113.0/24 is a documentation range; binding to it always fails.
    fn unbindable() -> govee_lan_rs::ControlConfig {
        govee_lan_rs::ControlConfig {
            bind_ip: Some(Ipv4Addr::new(203, 0, 113, 1)),
            ..Default::default()
        }
    }

    fn args(action: Action) -> ControlArgs {
        ControlArgs {
            ip: Some(Ipv4Addr::LOCALHOST),
            device_id: None,
            timeout: None,
            no_wait: true,
            pretty: false,
            action,
        }
    }

    fn root_cause(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|e| e.downcast_ref::<Error>())
    }

    #[tokio::test]
    async fn test_invalid_input_reported_before_socket() {
        let registry = Registry::open_in_memory().unwrap();

        let err = control(&registry, unbindable(), args(Action::Brightness { value: 150 }))
            .await
            .unwrap_err();
        assert!(matches!(root_cause(&err), Some(Error::InvalidBrightness(150))));

        let err = control(
            &registry,
            unbindable(),
            args(Action::ColorProbe {
                color: vec!["r-e-d".to_string()],
                kelvin: vec![],
                require_kelvin: false,
                stop_on_success: false,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(root_cause(&err), Some(Error::InvalidColorString(_))));

        // valid input reaches the socket
        let err = control(&registry, unbindable(), args(Action::On))
            .await
            .unwrap_err();
        assert!(!root_cause(&err).is_some_and(Error::is_validation));
    }
}
