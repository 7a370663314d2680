//! Bridge configuration.
//!
//! The configuration document is JSON. Every field is checked with the
//! validators in [`crate::validation`]. A device with a malformed entry is
//! logged and left out; the other devices are still configured. Errors in the
//! bridge settings themselves reject the whole document.

use crate::error::ConfigError;
use crate::validation::{
    boolean, ensure_group_address, ensure_physical_address, number, time_interval,
    GroupAddress, PhysicalAddress,
};
use crate::value::ValueType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct DatapointConfig {
    pub group_address: GroupAddress,
    pub value_type: ValueType,
    pub writable: bool,
    pub cyclic_sending: bool,
    pub send_on_change: bool,
    pub on_change_of: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultNotificationConfig {
    pub group_address: GroupAddress,
    pub repeat_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub individual_address: Option<PhysicalAddress>,
    pub poll_interval: Duration,
    pub datapoints: BTreeMap<String, DatapointConfig>,
    pub notifications: BTreeMap<String, FaultNotificationConfig>,
    errors: Vec<ConfigError>,
}

fn as_record<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::invalid(format!("{} should be a dictionary", what)))
}

/// `null` and absent keys both count as unset.
fn optional<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    record.get(key).filter(|value| !value.is_null())
}

fn required<'a>(
    record: &'a Map<String, Value>,
    device: &str,
    key: &'static str,
) -> Result<&'a Value, ConfigError> {
    optional(record, key).ok_or_else(|| ConfigError::MissingKey {
        device: device.to_string(),
        key,
    })
}

fn flag(record: &Map<String, Value>, key: &str) -> Result<bool, ConfigError> {
    optional(record, key).map_or(Ok(false), boolean)
}

impl DatapointConfig {
    pub fn from_value(name: &str, value: &Value) -> Result<Self, ConfigError> {
        let record = as_record(value, name)?;
        let parse = || -> Result<Self, ConfigError> {
            let value_type = match required(record, name, "value_type")? {
                Value::String(s) => s.parse::<ValueType>()?,
                other => {
                    return Err(ConfigError::invalid(format!(
                        "value_type should be a string, got {}",
                        other
                    )))
                }
            };
            Ok(Self {
                group_address: ensure_group_address(required(record, name, "group_address")?)?,
                value_type,
                writable: flag(record, "writable")?,
                cyclic_sending: flag(record, "cyclic_sending")?,
                send_on_change: flag(record, "send_on_change")?,
                on_change_of: optional(record, "on_change_of").map(number).transpose()?,
            })
        };
        parse().map_err(|err| match err {
            ConfigError::MissingKey { .. } => err,
            other => other.for_device(name),
        })
    }
}

impl FaultNotificationConfig {
    pub fn from_value(name: &str, value: &Value) -> Result<Self, ConfigError> {
        let record = as_record(value, name)?;
        let parse = || -> Result<Self, ConfigError> {
            Ok(Self {
                group_address: ensure_group_address(required(record, name, "group_address")?)?,
                repeat_after: optional(record, "repeat_after")
                    .map(time_interval)
                    .transpose()?,
            })
        };
        parse().map_err(|err| match err {
            ConfigError::MissingKey { .. } => err,
            other => other.for_device(name),
        })
    }
}

fn devices<T>(
    root: &Map<String, Value>,
    section: &str,
    errors: &mut Vec<ConfigError>,
    parse: impl Fn(&str, &Value) -> Result<T, ConfigError>,
) -> Result<BTreeMap<String, T>, ConfigError> {
    let mut devices = BTreeMap::new();
    let Some(records) = optional(root, section) else {
        return Ok(devices);
    };
    for (name, record) in as_record(records, section)? {
        match parse(name, record) {
            Ok(device) => {
                devices.insert(name.clone(), device);
            }
            Err(e) => {
                error!("Skipping {} entry '{}': {}", section, name, e);
                errors.push(e);
            }
        }
    }
    Ok(devices)
}

impl BridgeConfig {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let root = as_record(value, "configuration")?;

        let individual_address = optional(root, "individual_address")
            .map(ensure_physical_address)
            .transpose()?;
        let poll_interval = optional(root, "poll_interval")
            .map(time_interval)
            .transpose()?
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval must be greater than zero"));
        }

        let mut errors = Vec::new();
        let datapoints = devices(root, "datapoints", &mut errors, DatapointConfig::from_value)?;
        let notifications = devices(
            root,
            "notifications",
            &mut errors,
            FaultNotificationConfig::from_value,
        )?;

        Ok(Self {
            individual_address,
            poll_interval,
            datapoints,
            notifications,
            errors,
        })
    }

    /// Devices that were left out, one error each.
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_json::from_str(document).map_err(|e| ConfigError::Json(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&document)
    }
}
