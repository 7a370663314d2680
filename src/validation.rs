//! Validators for raw configuration values.
//!
//! Every validator takes a raw scalar as it appears in the configuration
//! document (a [`serde_json::Value`]) and returns a normalized, typed value or
//! a [`ConfigError::Invalid`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

/// Largest free-format (ungrouped) group address.
pub const GROUP_ADDRESS_MAX_FREE: u32 = 65_535;

const MICROS_PER_SECOND: f64 = 1_000_000.0;
const TIME_PERIOD_KEYS: [&str; 5] = ["days", "hours", "minutes", "seconds", "milliseconds"];

/// A signed time offset with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimePeriod {
    micros: i64,
}

impl TimePeriod {
    pub const ZERO: TimePeriod = TimePeriod { micros: 0 };

    pub const fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self::from_micros(millis * 1_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self::from_micros(secs * 1_000_000)
    }

    pub const fn from_minutes(minutes: i64) -> Self {
        Self::from_secs(minutes * 60)
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self::from_secs(hours * 3_600)
    }

    /// Rounds to the nearest microsecond; fails for non-finite or huge input.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        let micros = (secs * MICROS_PER_SECOND).round();
        if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self::from_micros(micros as i64))
    }

    pub const fn as_micros(&self) -> i64 {
        self.micros
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.micros as f64 / MICROS_PER_SECOND
    }

    pub const fn is_negative(&self) -> bool {
        self.micros < 0
    }

    /// The period as an unsigned [`Duration`], `None` when negative.
    pub fn to_duration(&self) -> Option<Duration> {
        u64::try_from(self.micros).ok().map(Duration::from_micros)
    }
}

impl core::ops::Neg for TimePeriod {
    type Output = TimePeriod;

    fn neg(self) -> Self::Output {
        TimePeriod::from_micros(-self.micros)
    }
}

impl From<Duration> for TimePeriod {
    fn from(duration: Duration) -> Self {
        TimePeriod::from_micros(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let total = self.micros.unsigned_abs();
        let secs = total / 1_000_000;
        let micros = total % 1_000_000;
        write!(f, "{}{}:{:02}:{:02}", sign, secs / 3_600, (secs / 60) % 60, secs % 60)?;
        if micros != 0 {
            write!(f, ".{:06}", micros)?;
        }
        Ok(())
    }
}

fn time_period_error(value: &str) -> ConfigError {
    ConfigError::invalid(format!(
        "offset {} should be format 'HH:MM', 'HH:MM:SS' or 'HH:MM:SS.F'",
        value
    ))
}

/// Parses `[-+]HH:MM[:SS[.ffffff]]`. A leading `-` negates the whole offset.
pub fn time_period_str(value: &Value) -> Result<TimePeriod, ConfigError> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            return Err(ConfigError::invalid(
                "make sure you wrap time values in quotes",
            ))
        }
        other => return Err(time_period_error(&other.to_string())),
    };

    let (negative, body) = if let Some(rest) = raw.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = raw.strip_prefix('+') {
        (false, rest)
    } else {
        (false, raw)
    };

    let parts: Vec<&str> = body.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(time_period_error(body));
    }

    let hours: i64 = parts[0].trim().parse().map_err(|_| time_period_error(body))?;
    let minutes: i64 = parts[1].trim().parse().map_err(|_| time_period_error(body))?;
    let seconds: f64 = match parts.get(2) {
        Some(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .ok_or_else(|| time_period_error(body))?,
        None => 0.0,
    };

    let total = hours
        .checked_mul(3_600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .ok_or_else(|| time_period_error(body))?;
    let offset = TimePeriod::from_secs_f64(total as f64 + seconds)
        .ok_or_else(|| time_period_error(body))?;

    Ok(if negative { -offset } else { offset })
}

/// Interprets a number (or numeric string) as seconds.
pub fn time_period_seconds(value: &Value) -> Result<TimePeriod, ConfigError> {
    let seconds = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    seconds
        .and_then(TimePeriod::from_secs_f64)
        .ok_or_else(|| ConfigError::invalid(format!("expected seconds, got {}", value)))
}

/// Validates that at least one of `keys` is present in a mapping.
pub fn has_at_least_one_key<'a>(
    value: &'a Value,
    keys: &[&str],
) -> Result<&'a Map<String, Value>, ConfigError> {
    let map = value
        .as_object()
        .ok_or_else(|| ConfigError::invalid("expected dictionary"))?;
    if map.keys().any(|k| keys.contains(&k.as_str())) {
        Ok(map)
    } else {
        Err(ConfigError::invalid(format!(
            "must contain at least one of {}.",
            keys.join(", ")
        )))
    }
}

/// Sums a `{days, hours, minutes, seconds, milliseconds}` mapping.
pub fn time_period_dict(value: &Value) -> Result<TimePeriod, ConfigError> {
    let map = has_at_least_one_key(value, &TIME_PERIOD_KEYS)?;

    let mut seconds = 0.0;
    for (key, component) in map {
        let factor = match key.as_str() {
            "days" => 86_400.0,
            "hours" => 3_600.0,
            "minutes" => 60.0,
            "seconds" => 1.0,
            "milliseconds" => 0.001,
            other => {
                return Err(ConfigError::invalid(format!(
                    "extra keys not allowed @ data['{}']",
                    other
                )))
            }
        };
        let amount = match component {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            ConfigError::invalid(format!("expected float for dictionary value @ data['{}']", key))
        })?;
        seconds += amount * factor;
    }

    TimePeriod::from_secs_f64(seconds)
        .ok_or_else(|| ConfigError::invalid(format!("time period {} out of range", value)))
}

/// Accepts a time string, a number of seconds, or a component mapping.
pub fn time_period(value: &Value) -> Result<TimePeriod, ConfigError> {
    match value {
        Value::String(_) => time_period_str(value).or_else(|err| {
            time_period_seconds(value).map_err(|_| err)
        }),
        Value::Number(_) => time_period_seconds(value),
        Value::Object(_) => time_period_dict(value),
        other => Err(ConfigError::invalid(format!(
            "expected time period, got {}",
            other
        ))),
    }
}

pub fn positive_time_period(period: TimePeriod) -> Result<Duration, ConfigError> {
    period
        .to_duration()
        .ok_or_else(|| ConfigError::invalid("time period should be positive"))
}

/// A [`time_period`] that must not be negative.
pub fn time_interval(value: &Value) -> Result<Duration, ConfigError> {
    positive_time_period(time_period(value)?)
}

/// Coerces a scalar to a string; `null`, lists and mappings are rejected.
pub fn string(value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::Null => Err(ConfigError::invalid("string value is None")),
        Value::Array(_) | Value::Object(_) => {
            Err(ConfigError::invalid("value should be a string"))
        }
        Value::String(s) => Ok(s.clone()),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        Value::Number(n) => Ok(n.to_string()),
    }
}

pub fn boolean(value: &Value) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(b) => return Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "enable" => return Ok(true),
            "0" | "false" | "no" | "off" | "disable" => return Ok(false),
            _ => {}
        },
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                return Ok(f != 0.0);
            }
        }
        _ => {}
    }
    Err(ConfigError::invalid(format!("invalid boolean value {}", value)))
}

/// Accepts integers and floats only; numeric strings are rejected.
pub fn number(value: &Value) -> Result<f64, ConfigError> {
    value
        .as_f64()
        .ok_or_else(|| ConfigError::invalid(format!("invalid numeric value {}", value)))
}

pub fn port(value: &Value) -> Result<u16, ConfigError> {
    let port = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ConfigError::invalid(format!("expected int, got {}", value)))?;

    u16::try_from(port)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| {
            ConfigError::invalid(format!(
                "value must be at least 1 and at most 65535, got {}",
                port
            ))
        })
}

/// Wraps a bare value in a list; `null` becomes the empty list.
pub fn ensure_list(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn digits(part: &str, min: usize, max: usize) -> Option<u32> {
    if (min..=max).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

/// How a group address was written in the configuration; kept for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notation {
    Free,
    TwoLevel,
    ThreeLevel,
}

/// A group address in free (`1234`), two-level (`1/234`) or three-level
/// (`1/2/34`) notation.
///
/// Equality and hashing use the 16-bit bus value, so `"2563"` and `"1/2/3"`
/// name the same datapoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupAddress {
    raw: u16,
    notation: Notation,
}

impl GroupAddress {
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self, ConfigError> {
        let address = knx_pico::GroupAddress::new(main, middle, sub).map_err(|_| {
            ConfigError::invalid(format!("{}/{}/{} is not a valid group address", main, middle, sub))
        })?;
        Ok(Self::from(address))
    }

    pub fn two_level(main: u8, sub: u16) -> Result<Self, ConfigError> {
        if main > 31 || sub > 2047 {
            return Err(ConfigError::invalid(format!(
                "{}/{} is not a valid group address",
                main, sub
            )));
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
            notation: Notation::TwoLevel,
        })
    }

    pub fn free(raw: u16) -> Self {
        Self {
            raw,
            notation: Notation::Free,
        }
    }

    pub fn raw(&self) -> u16 {
        self.raw
    }

    pub fn notation(&self) -> Notation {
        self.notation
    }
}

impl From<knx_pico::GroupAddress> for GroupAddress {
    fn from(address: knx_pico::GroupAddress) -> Self {
        let raw = (u16::from(address.main()) << 11)
            | (u16::from(address.middle()) << 8)
            | u16::from(address.sub());
        Self {
            raw,
            notation: Notation::ThreeLevel,
        }
    }
}

impl From<GroupAddress> for knx_pico::GroupAddress {
    fn from(address: GroupAddress) -> Self {
        knx_pico::GroupAddress::from(address.raw)
    }
}

impl PartialEq for GroupAddress {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for GroupAddress {}

impl Hash for GroupAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl FromStr for GroupAddress {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::invalid(format!("{} is not a valid group address", value));

        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            return value
                .parse::<u32>()
                .ok()
                .filter(|raw| *raw <= GROUP_ADDRESS_MAX_FREE)
                .map(|raw| GroupAddress::free(raw as u16))
                .ok_or_else(invalid);
        }

        let parts: Vec<&str> = value.split('/').collect();
        match parts.as_slice() {
            [main, sub] => {
                let main = digits(main, 1, 2).ok_or_else(invalid)?;
                let sub = digits(sub, 1, 4).ok_or_else(invalid)?;
                GroupAddress::two_level(main as u8, sub as u16).map_err(|_| invalid())
            }
            [main, middle, sub] => {
                let main = digits(main, 1, 2).ok_or_else(invalid)?;
                let middle = digits(middle, 1, 2).ok_or_else(invalid)?;
                let sub = digits(sub, 1, 4).ok_or_else(invalid)?;
                let sub = u8::try_from(sub).map_err(|_| invalid())?;
                GroupAddress::new(main as u8, middle as u8, sub).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for GroupAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupAddress> for String {
    fn from(address: GroupAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.notation {
            Notation::Free => write!(f, "{}", self.raw),
            Notation::TwoLevel => write!(f, "{}/{}", self.raw >> 11, self.raw & 0x07FF),
            Notation::ThreeLevel => {
                let address = knx_pico::GroupAddress::from(self.raw);
                write!(f, "{}/{}/{}", address.main(), address.middle(), address.sub())
            }
        }
    }
}

pub fn ensure_group_address(value: &Value) -> Result<GroupAddress, ConfigError> {
    scalar_text(value).parse()
}

/// A physical (individual) device address, `area.line.device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhysicalAddress {
    raw: u16,
}

impl PhysicalAddress {
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self, ConfigError> {
        let invalid = || {
            ConfigError::invalid(format!(
                "{}.{}.{} is not a valid physical address",
                area, line, device
            ))
        };
        // area and line are 4-bit fields
        if area > 15 || line > 15 {
            return Err(invalid());
        }
        knx_pico::IndividualAddress::new(area, line, device).map_err(|_| invalid())?;
        Ok(Self {
            raw: (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device),
        })
    }

    pub fn area(&self) -> u8 {
        (self.raw >> 12) as u8
    }

    pub fn line(&self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    pub fn device(&self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    pub fn raw(&self) -> u16 {
        self.raw
    }
}

impl From<PhysicalAddress> for knx_pico::IndividualAddress {
    fn from(address: PhysicalAddress) -> Self {
        knx_pico::IndividualAddress::from(address.raw)
    }
}

impl FromStr for PhysicalAddress {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid =
            || ConfigError::invalid(format!("{} is not a valid physical address", value));
        let parts: Vec<&str> = value.split('.').collect();
        match parts.as_slice() {
            [area, line, device] => {
                let area = digits(area, 1, 2).ok_or_else(invalid)?;
                let line = digits(line, 1, 2).ok_or_else(invalid)?;
                let device = digits(device, 1, 3).ok_or_else(invalid)?;
                let device = u8::try_from(device).map_err(|_| invalid())?;
                PhysicalAddress::new(area as u8, line as u8, device).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for PhysicalAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PhysicalAddress> for String {
    fn from(address: PhysicalAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

pub fn ensure_physical_address(value: &Value) -> Result<PhysicalAddress, ConfigError> {
    scalar_text(value).parse()
}
