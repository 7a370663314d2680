//! Fault notification: announces the heat pump's latest fault on the bus.

use crate::bus::{KnxBus, Telegram};
use crate::config::FaultNotificationConfig;
use crate::error::DeviceError;
use crate::heatpump::{FaultRecord, HeatPump};
use crate::validation::{GroupAddress, TimePeriod};
use crate::value::{decode_string14, encode_string14, MAX_PAYLOAD_SIZE};
use arrayvec::ArrayString;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub type NotificationText = ArrayString<MAX_PAYLOAD_SIZE>;

pub struct FaultNotification {
    name: String,
    group_address: GroupAddress,
    repeat_after: Option<Duration>,
    last_sent_at: Option<Instant>,
    in_error: bool,
    message: NotificationText,
    last_fault: Option<FaultRecord>,
    bus: Arc<dyn KnxBus>,
    heat_pump: Arc<dyn HeatPump>,
}

impl FaultNotification {
    pub fn from_config(
        name: impl Into<String>,
        config: &FaultNotificationConfig,
        bus: Arc<dyn KnxBus>,
        heat_pump: Arc<dyn HeatPump>,
    ) -> Self {
        Self {
            name: name.into(),
            group_address: config.group_address,
            repeat_after: config.repeat_after,
            last_sent_at: None,
            in_error: false,
            message: NotificationText::new(),
            last_fault: None,
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

    pub fn in_error(&self) -> bool {
        self.in_error
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// Text of the last announcement as it went out on the bus.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn last_fault(&self) -> Option<&FaultRecord> {
        self.last_fault.as_ref()
    }

    /// Sends `text` as a 14 character string telegram.
    pub async fn set(&mut self, text: &str) -> Result<(), DeviceError> {
        let payload = encode_string14(text);
        let sent = decode_string14(&payload).unwrap_or_default();
        self.bus
            .send(Telegram::write(self.group_address, payload))
            .await?;
        self.message = NotificationText::from(&sent).unwrap_or_default();
        Ok(())
    }

    /// Polls the heat pump once. Failures are logged and leave the state as
    /// it was before the tick.
    pub async fn do_tick(&mut self) {
        self.tick_at(Instant::now()).await;
    }

    pub async fn tick_at(&mut self, now: Instant) {
        if let Err(e) = self.poll(now).await {
            error!("Fault notification '{}' failed: {}", self.name, e);
        }
    }

    async fn poll(&mut self, now: Instant) -> Result<(), DeviceError> {
        if !self.heat_pump.in_error().await? {
            self.in_error = false;
            return Ok(());
        }
        if !self.announcement_due(now) {
            return Ok(());
        }

        let fault = self.heat_pump.last_fault().await?;
        info!(
            "Heat pump fault #{:03} [{}]: {} (code {})",
            fault.index,
            fault.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            fault.message,
            fault.error_code
        );
        self.set(&fault.message).await?;
        self.in_error = true;
        self.last_sent_at = Some(now);
        self.last_fault = Some(fault);
        Ok(())
    }

    fn announcement_due(&self, now: Instant) -> bool {
        if !self.in_error {
            return true;
        }
        match (self.repeat_after, self.last_sent_at) {
            (None, _) => false,
            (Some(repeat_after), Some(sent_at)) => {
                now.saturating_duration_since(sent_at) >= repeat_after
            }
            (Some(_), None) => true,
        }
    }
}

impl fmt::Display for FaultNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<FaultNotification name=\"{}\" group_address=\"{}\" repeat_after=\"{}\" \
             last_sent_at=\"{}\" in_error=\"{}\"/>",
            self.name,
            self.group_address,
            self.repeat_after
                .map_or_else(|| "None".to_string(), |d| TimePeriod::from(d).to_string()),
            self.last_sent_at.map_or_else(
                || "None".to_string(),
                |at| format!("{}s ago", at.elapsed().as_secs())
            ),
            self.in_error,
        )
    }
}

impl fmt::Debug for FaultNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultNotification")
            .field("name", &self.name)
            .field("group_address", &self.group_address)
            .field("repeat_after", &self.repeat_after)
            .field("last_sent_at", &self.last_sent_at)
            .field("in_error", &self.in_error)
            .field("message", &self.message)
            .finish()
    }
}
