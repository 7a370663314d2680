//! # htknx
//!
//! Bridges a Heliotherm heat pump onto a KNX installation.
//!
//! ## Features
//!
//! - **Datapoints**: heat pump parameters exposed on group addresses, with
//!   send-on-change thresholds and cyclic sending
//! - **Fault notifications**: the heat pump's latest fault announced as a
//!   14 character text, repeated at a configurable interval
//! - **Configuration validation**: durations, booleans, group and physical
//!   addresses checked before any device is created
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use htknx::{Bridge, BridgeConfig, LogBus, MemoryHeatPump};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), htknx::error::ConfigError> {
//! let config = BridgeConfig::load("htknx.json")?;
//! let mut bridge = Bridge::from_config(&config, Arc::new(LogBus), Arc::new(MemoryHeatPump::new()));
//! bridge.tick().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`validation`] - configuration value validators
//! - [`config`] - configuration records
//! - [`value`] - datapoint types and payload encodings (DPT 1, 5 and 9 via `knx-pico`)
//! - [`bus`] - KNX bus boundary
//! - [`heatpump`] - heat pump boundary
//! - [`datapoint`] - parameter datapoints
//! - [`notification`] - fault notifications
//! - [`bridge`] - device registry and main loop

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod bridge;
pub mod bus;
pub mod config;
pub mod datapoint;
pub mod error;
pub mod heatpump;
pub mod notification;
pub mod validation;
pub mod value;

// Re-export main public types for convenience
pub use bridge::Bridge;
pub use bus::{KnxBus, LogBus, MemoryBus, Telegram, TelegramKind};
pub use config::{BridgeConfig, DatapointConfig, FaultNotificationConfig};
pub use datapoint::Datapoint;
pub use heatpump::{FaultRecord, HeatPump, MemoryHeatPump};
pub use notification::FaultNotification;
pub use validation::{GroupAddress, PhysicalAddress, TimePeriod};
pub use value::{DatapointValue, Payload, ValueType};
