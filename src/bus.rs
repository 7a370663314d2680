//! KNX bus boundary.
//!
//! The wire protocol itself lives outside this crate; devices only see
//! [`Telegram`]s and the [`KnxBus`] trait used to put them on the bus.

use crate::error::BusError;
use crate::validation::GroupAddress;
use crate::value::Payload;
use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramKind {
    GroupRead,
    GroupWrite(Payload),
    GroupResponse(Payload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    pub destination: GroupAddress,
    pub kind: TelegramKind,
}

impl Telegram {
    pub fn read(destination: GroupAddress) -> Self {
        Self {
            destination,
            kind: TelegramKind::GroupRead,
        }
    }

    pub fn write(destination: GroupAddress, payload: Payload) -> Self {
        Self {
            destination,
            kind: TelegramKind::GroupWrite(payload),
        }
    }

    pub fn response(destination: GroupAddress, payload: Payload) -> Self {
        Self {
            destination,
            kind: TelegramKind::GroupResponse(payload),
        }
    }

    /// Write telegram, or a response when answering a group read.
    pub fn value(destination: GroupAddress, payload: Payload, response: bool) -> Self {
        if response {
            Self::response(destination, payload)
        } else {
            Self::write(destination, payload)
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.kind {
            TelegramKind::GroupRead => None,
            TelegramKind::GroupWrite(payload) | TelegramKind::GroupResponse(payload) => {
                Some(payload)
            }
        }
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, payload) = match &self.kind {
            TelegramKind::GroupRead => ("GroupValueRead", None),
            TelegramKind::GroupWrite(p) => ("GroupValueWrite", Some(p)),
            TelegramKind::GroupResponse(p) => ("GroupValueResponse", Some(p)),
        };
        write!(f, "<Telegram destination=\"{}\" kind=\"{}\"", self.destination, kind)?;
        match payload {
            Some(Payload::Small(bits)) => write!(f, " payload=\"{:#04x}\"/>", bits),
            Some(Payload::Bytes(bytes)) => write!(f, " payload=\"{:02x?}\"/>", bytes.as_slice()),
            None => write!(f, "/>"),
        }
    }
}

/// Outbound side of the bus connection.
#[async_trait]
pub trait KnxBus: Send + Sync {
    async fn send(&self, telegram: Telegram) -> Result<(), BusError>;
}

/// Records every outbound telegram; fails on demand.
#[derive(Debug, Default)]
pub struct MemoryBus {
    sent: Mutex<Vec<Telegram>>,
    fail: Mutex<bool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Telegram> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn take_sent(&self) -> Vec<Telegram> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }
}

#[async_trait]
impl KnxBus for MemoryBus {
    async fn send(&self, telegram: Telegram) -> Result<(), BusError> {
        if self.fail.lock().map(|fail| *fail).unwrap_or(false) {
            return Err(BusError::Transmission(format!("rejected {}", telegram)));
        }
        self.sent
            .lock()
            .map_err(|_| BusError::Transmission("telegram log poisoned".to_string()))?
            .push(telegram);
        Ok(())
    }
}

/// Writes outbound telegrams to the log instead of a bus connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBus;

#[async_trait]
impl KnxBus for LogBus {
    async fn send(&self, telegram: Telegram) -> Result<(), BusError> {
        info!("📤 {}", telegram);
        Ok(())
    }
}
