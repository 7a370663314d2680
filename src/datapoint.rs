//! Heat pump parameter exposed as a KNX datapoint.

use crate::bus::{KnxBus, Telegram, TelegramKind};
use crate::config::DatapointConfig;
use crate::error::{DeviceError, ValueError};
use crate::heatpump::HeatPump;
use crate::validation::GroupAddress;
use crate::value::{DatapointValue, Payload, ValueType};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One heat pump parameter, binary or numeric, bound to a group address.
///
/// Two values are tracked separately: `payload` is what the bus currently
/// gets when it asks for this datapoint, `last_sent_value` is the value that
/// was last transmitted spontaneously. The change threshold is always measured
/// against the latter.
pub struct Datapoint {
    name: String,
    group_address: GroupAddress,
    value_type: ValueType,
    writable: bool,
    cyclic_sending: bool,
    send_on_change: bool,
    on_change_of: Option<f64>,
    payload: Option<Payload>,
    last_sent_value: Option<DatapointValue>,
    bus: Arc<dyn KnxBus>,
    heat_pump: Arc<dyn HeatPump>,
}

impl Datapoint {
    pub fn from_config(
        name: impl Into<String>,
        config: &DatapointConfig,
        bus: Arc<dyn KnxBus>,
        heat_pump: Arc<dyn HeatPump>,
    ) -> Self {
        Self {
            name: name.into(),
            group_address: config.group_address,
            value_type: config.value_type,
            writable: config.writable,
            cyclic_sending: config.cyclic_sending,
            send_on_change: config.send_on_change,
            on_change_of: config.on_change_of,
            payload: None,
            last_sent_value: None,
            bus,
            heat_pump,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_address(&self) -> GroupAddress {
        self.group_address
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn last_sent_value(&self) -> Option<DatapointValue> {
        self.last_sent_value
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Current value as the bus would see it.
    pub fn value(&self) -> Option<DatapointValue> {
        self.payload
            .as_ref()
            .and_then(|payload| self.value_type.decode(payload).ok())
    }

    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        self.value_type.unit_of_measurement()
    }

    /// Human readable current value.
    pub fn resolve_state(&self) -> String {
        self.value()
            .map_or_else(|| "None".to_string(), |value| value.to_string())
    }

    /// Sends the cached value if forced or cyclic sending is enabled.
    /// A forced broadcast answers a group read and goes out as a response.
    pub async fn broadcast_value(&self, force: bool) -> Result<(), DeviceError> {
        if !(force || self.cyclic_sending) {
            return Ok(());
        }
        let Some(payload) = self.payload.clone() else {
            return Ok(());
        };
        self.bus
            .send(Telegram::value(self.group_address, payload, force))
            .await?;
        Ok(())
    }

    pub async fn process(&mut self, telegram: &Telegram) -> Result<(), DeviceError> {
        match telegram.kind {
            TelegramKind::GroupRead => self.process_group_read(telegram).await,
            TelegramKind::GroupWrite(_) => self.process_group_write(telegram).await,
            TelegramKind::GroupResponse(_) => Ok(()),
        }
    }

    pub async fn process_group_read(&self, telegram: &Telegram) -> Result<(), DeviceError> {
        info!("Datapoint.process_group_read: {}", telegram);
        self.broadcast_value(true).await
    }

    /// Forwards a bus write to the heat pump. Nothing is echoed on the bus.
    pub async fn process_group_write(&mut self, telegram: &Telegram) -> Result<(), DeviceError> {
        info!("Datapoint.process_group_write: {}", telegram);
        let Some(payload) = telegram.payload() else {
            return Ok(());
        };
        if !self.writable {
            warn!(
                "Attempted to set value for non-writable heat pump parameter: '{}' ({})",
                self.name, telegram
            );
            return Ok(());
        }
        let value = self.value_type.decode(payload)?;

        let confirmed = self
            .heat_pump
            .set_param(&self.name, value)
            .await
            .map_err(|e| {
                error!("Failed to set heat pump parameter '{}' to {}: {}", self.name, value, e);
                e
            })?;
        info!("Heat pump parameter '{}' set to {}", self.name, confirmed);
        self.payload = Some(self.value_type.encode(confirmed)?);
        Ok(())
    }

    /// Takes a new value from the heat pump side.
    ///
    /// Unchanged values are ignored. A changed value is transmitted when
    /// send-on-change is enabled and, for numeric values, it moved at least
    /// `on_change_of` away from the last transmitted value. Otherwise only
    /// the cached payload is updated.
    pub async fn set(&mut self, value: Option<DatapointValue>) -> Result<(), DeviceError> {
        let Some(value) = value else {
            return Ok(());
        };
        let payload = self.value_type.encode(value)?;
        if self.payload.as_ref() == Some(&payload) {
            return Ok(());
        }

        if self.send_on_change && self.exceeds_threshold(value)? {
            self.bus
                .send(Telegram::write(self.group_address, payload.clone()))
                .await?;
            self.last_sent_value = Some(value);
        } else {
            debug!("'{}' changed to {} without transmission", self.name, value);
        }
        self.payload = Some(payload);
        Ok(())
    }

    fn exceeds_threshold(&self, value: DatapointValue) -> Result<bool, ValueError> {
        let DatapointValue::Numeric(new) = value else {
            return Ok(true);
        };
        let (Some(threshold), Some(last)) = (self.on_change_of, self.last_sent_value) else {
            return Ok(true);
        };
        let last = last.as_f64().ok_or(ValueError::TypeMismatch {
            expected: "numeric",
            actual: last.kind(),
        })?;
        Ok((new - last).abs() >= threshold.abs())
    }

    /// Reads the parameter from the heat pump and passes it to [`Self::set`].
    pub async fn refresh(&mut self) -> Result<(), DeviceError> {
        let value = self.heat_pump.get_param(&self.name).await?;
        self.set(Some(value)).await
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

impl fmt::Display for Datapoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Datapoint name=\"{}\" group_address=\"{}\" value_type=\"{}\" value=\"{}\" unit=\"{}\" \
             writable=\"{}\" cyclic_sending=\"{}\" send_on_change=\"{}\" on_change_of=\"{}\"/>",
            self.name,
            self.group_address,
            self.value_type,
            self.resolve_state(),
            self.unit_of_measurement().unwrap_or("None"),
            yes_no(self.writable),
            yes_no(self.cyclic_sending),
            yes_no(self.send_on_change),
            self.on_change_of
                .map_or_else(|| "None".to_string(), |v| v.to_string()),
        )
    }
}

impl fmt::Debug for Datapoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datapoint")
            .field("name", &self.name)
            .field("group_address", &self.group_address)
            .field("value_type", &self.value_type)
            .field("payload", &self.payload)
            .field("last_sent_value", &self.last_sent_value)
            .finish()
    }
}
