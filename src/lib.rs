//! # govee_lan_rs
//!
//! An async Rust library for discovering, interrogating and controlling Govee
//! smart lights over the local-network (LAN) UDP API, with a SQLite registry of
//! everything seen on the wire.
//!
//! This crate provides a **runtime-agnostic** async API. Devices are found by
//! multicast scan, recorded in a [`Registry`], asked for their status and sent
//! power, brightness, temperature and color commands.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use govee_lan_rs::{
//!     ControlConfig, Controller, Discovery, DiscoveryConfig, Registry, TargetSelection,
//! };
//!
//! async fn survey() -> Result<(), govee_lan_rs::Error> {
//!     let registry = Registry::open("./govee_registry.sqlite")?;
//!
//!     // Broadcast scan requests and collect answers for ten seconds
//!     Discovery::new(&registry, DiscoveryConfig::default())
//!         .run(Some(Duration::from_secs(10)), true)
//!         .await?;
//!
//!     // Ask every discovered device for its status
//!     let controller = Controller::new(ControlConfig::default())?;
//!     controller
//!         .interrogate_all(&registry, TargetSelection::all(), true)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Discovery**: Multicast scan and passive listening with [`Discovery`]
//! - **Registry**: Devices, raw scan events, interrogations and key/values in [`Registry`]
//! - **Status**: `devStatus` interrogation normalized through [`DeviceStatus`]
//! - **Power/Brightness/Temperature**: [`PowerMode`], [`Brightness`], [`Kelvin`]
//! - **Colors**: Named or hex [`Color`]s in four [`ColorCommand`] dialects and two [`ColorScale`]s
//! - **Probing**: Find the color dialect a model accepts with [`ColorProbe`]
//!
//! ## Communication
//!
//! Scan requests go to multicast group `239.255.255.250` port 4001, answers
//! arrive on port 4002, and commands are unicast to port 4003. Every message
//! is a JSON envelope `{"msg": {"cmd": .., "data": {..}}}`.
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! govee-lan-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! govee-lan-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! govee-lan-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime
//! - `cli` (default): Build the `govee-lan` command line tool

mod config;
mod control;
mod discovery;
mod errors;
mod neighbor;
pub mod net;
mod payload;
mod probe;
mod registry;
mod response;
pub mod runtime;
mod status;
mod types;

// Re-export public API
pub use config::{ControlConfig, DEFAULT_DB_PATH, DiscoveryConfig, Settings};
pub use control::{
    Controller, Exchange, Outcome, TargetSelection, enrich_from_status, record_exchange,
};
pub use discovery::{Discovery, ScanOutcome, ScanReport, ScanTally};
pub use errors::Error;
pub use neighbor::{IpNeighbor, NeighborLookup, NoLookup};
pub use payload::{Payload, cmd};
pub use probe::{ColorProbe, PROBE_PACING, ProbeAttempt, ProbeCandidate, candidates};
pub use registry::{
    Device, Endpoint, Interrogation, KeyValue, Registry, ScanEvent, ScanObservation, Target,
    now_ms,
};
pub use response::{Envelope, EnvelopeMessage, Inbound, decode};
pub use status::{DeviceStatus, STATUS_KEY_PREFIX};
pub use types::{Brightness, Color, ColorCommand, ColorScale, Kelvin, PowerMode};
