//! Datapoint values and their bus encodings.
//!
//! A [`ValueType`] knows how to encode a [`DatapointValue`] into a telegram
//! [`Payload`] and back. Binary and numeric datapoints share the same
//! interface so the change-detection logic in [`crate::datapoint`] never has
//! to branch on the concrete encoding.

use crate::error::{ConfigError, ValueError};
use heapless::Vec;
use knx_pico::dpt::{Dpt1, Dpt5, Dpt9, DptDecode, DptEncode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest data field carried by a group telegram (DPT 16, 14-byte string).
pub const MAX_PAYLOAD_SIZE: usize = 14;

pub type PayloadBytes = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Range of the DPT 9 2-octet float.
const FLOAT16_MIN: f64 = -671_088.64;
const FLOAT16_MAX: f64 = 670_760.96;

/// Telegram data field. Values of up to 6 bits travel inside the APCI octet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Small(u8),
    Bytes(PayloadBytes),
}

impl Payload {
    pub fn from_slice(data: &[u8]) -> Result<Self, ValueError> {
        PayloadBytes::from_slice(data)
            .map(Payload::Bytes)
            .map_err(|_| ValueError::InvalidPayload {
                payload: data.to_vec(),
                value_type: "telegram data",
            })
    }

    fn to_vec(&self) -> std::vec::Vec<u8> {
        match self {
            Payload::Small(bits) => vec![*bits],
            Payload::Bytes(bytes) => bytes.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DatapointValue {
    Binary(bool),
    Numeric(f64),
}

impl DatapointValue {
    pub fn kind(&self) -> &'static str {
        match self {
            DatapointValue::Binary(_) => "binary",
            DatapointValue::Numeric(_) => "numeric",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatapointValue::Numeric(v) => Some(*v),
            DatapointValue::Binary(_) => None,
        }
    }
}

impl From<bool> for DatapointValue {
    fn from(value: bool) -> Self {
        DatapointValue::Binary(value)
    }
}

impl From<f64> for DatapointValue {
    fn from(value: f64) -> Self {
        DatapointValue::Numeric(value)
    }
}

impl From<i32> for DatapointValue {
    fn from(value: i32) -> Self {
        DatapointValue::Numeric(f64::from(value))
    }
}

impl fmt::Display for DatapointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatapointValue::Binary(true) => write!(f, "on"),
            DatapointValue::Binary(false) => write!(f, "off"),
            DatapointValue::Numeric(v) => write!(f, "{}", v),
        }
    }
}

/// Supported datapoint types, named as in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    /// DPT 1.001
    Binary,
    /// DPT 5.001, 0..100 % scaled to one octet
    Percent,
    /// DPT 5.004, 0..255 % unscaled
    PercentU8,
    /// DPT 5.010
    OneByteUnsigned,
    /// DPT 7.001
    TwoByteUnsigned,
    /// DPT 9.001
    Temperature,
    /// DPT 9.xxx without unit
    TwoByteFloat,
    /// DPT 9.024
    Power,
    /// DPT 14.xxx
    FourByteFloat,
    /// DPT 13.010
    Energy,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Binary => "binary",
            ValueType::Percent => "percent",
            ValueType::PercentU8 => "percentU8",
            ValueType::OneByteUnsigned => "1byte_unsigned",
            ValueType::TwoByteUnsigned => "2byte_unsigned",
            ValueType::Temperature => "temperature",
            ValueType::TwoByteFloat => "2byte_float",
            ValueType::Power => "power",
            ValueType::FourByteFloat => "4byte_float",
            ValueType::Energy => "energy",
        }
    }

    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        match self {
            ValueType::Percent | ValueType::PercentU8 => Some("%"),
            ValueType::Temperature => Some("°C"),
            ValueType::Power => Some("kW"),
            ValueType::Energy => Some("Wh"),
            _ => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ValueType::Binary)
    }

    pub fn encode(&self, value: DatapointValue) -> Result<Payload, ValueError> {
        match (self, value) {
            (ValueType::Binary, DatapointValue::Binary(on)) => {
                let mut buf = [0u8; 1];
                Dpt1::Switch
                    .encode(on, &mut buf)
                    .map_err(|_| ValueError::Encoding {
                        value_type: self.name(),
                    })?;
                Ok(Payload::Small(buf[0] & 0x01))
            }
            (ValueType::Binary, other) => Err(ValueError::TypeMismatch {
                expected: "binary",
                actual: other.kind(),
            }),
            (_, DatapointValue::Binary(_)) => Err(ValueError::TypeMismatch {
                expected: "numeric",
                actual: "binary",
            }),
            (_, DatapointValue::Numeric(v)) => self.encode_numeric(v),
        }
    }

    fn encode_numeric(&self, value: f64) -> Result<Payload, ValueError> {
        let out_of_range = || ValueError::OutOfRange {
            value,
            value_type: self.name(),
        };
        if !value.is_finite() {
            return Err(out_of_range());
        }

        let mut buf = [0u8; 4];
        let len = match self {
            ValueType::Binary => {
                return Err(ValueError::TypeMismatch {
                    expected: "binary",
                    actual: "numeric",
                })
            }
            ValueType::Percent => {
                if !(0.0..=100.0).contains(&value) {
                    return Err(out_of_range());
                }
                Dpt5::Percentage
                    .encode(value.round() as u16, &mut buf)
                    .map_err(|_| out_of_range())?
            }
            ValueType::PercentU8 | ValueType::OneByteUnsigned => {
                let raw = value.round();
                if !(0.0..=255.0).contains(&raw) {
                    return Err(out_of_range());
                }
                buf[0] = raw as u8;
                1
            }
            ValueType::TwoByteUnsigned => {
                let raw = value.round();
                if !(0.0..=65_535.0).contains(&raw) {
                    return Err(out_of_range());
                }
                buf[..2].copy_from_slice(&(raw as u16).to_be_bytes());
                2
            }
            ValueType::Temperature | ValueType::TwoByteFloat | ValueType::Power => {
                if !(FLOAT16_MIN..=FLOAT16_MAX).contains(&value) {
                    return Err(out_of_range());
                }
                // all DPT 9 subtypes share the 2-octet float layout
                Dpt9::Temperature
                    .encode(value as f32, &mut buf)
                    .map_err(|_| out_of_range())?
            }
            ValueType::FourByteFloat => {
                if value.abs() > f64::from(f32::MAX) {
                    return Err(out_of_range());
                }
                buf.copy_from_slice(&(value as f32).to_be_bytes());
                4
            }
            ValueType::Energy => {
                let raw = value.round();
                if raw < f64::from(i32::MIN) || raw > f64::from(i32::MAX) {
                    return Err(out_of_range());
                }
                buf.copy_from_slice(&(raw as i32).to_be_bytes());
                4
            }
        };
        Payload::from_slice(&buf[..len])
    }

    pub fn decode(&self, payload: &Payload) -> Result<DatapointValue, ValueError> {
        let invalid = || ValueError::InvalidPayload {
            payload: payload.to_vec(),
            value_type: self.name(),
        };

        if let ValueType::Binary = self {
            let data = match payload {
                Payload::Small(bits) => [*bits],
                Payload::Bytes(bytes) if bytes.len() == 1 => [bytes[0]],
                Payload::Bytes(_) => return Err(invalid()),
            };
            let on: bool = Dpt1::Switch.decode(&data[..]).map_err(|_| invalid())?;
            return Ok(DatapointValue::Binary(on));
        }

        let bytes = match payload {
            Payload::Bytes(bytes) => bytes.as_slice(),
            Payload::Small(_) => return Err(invalid()),
        };

        let value = match (self, bytes) {
            (ValueType::Percent, [_]) => {
                let percent: u16 = Dpt5::Percentage.decode(bytes).map_err(|_| invalid())?;
                f64::from(percent)
            }
            (ValueType::PercentU8 | ValueType::OneByteUnsigned, [raw]) => f64::from(*raw),
            (ValueType::TwoByteUnsigned, [hi, lo]) => f64::from(u16::from_be_bytes([*hi, *lo])),
            (ValueType::Temperature | ValueType::TwoByteFloat | ValueType::Power, [_, _]) => {
                let raw: f32 = Dpt9::Temperature.decode(bytes).map_err(|_| invalid())?;
                // two decimals is all a 2-octet float carries
                (f64::from(raw) * 100.0).round() / 100.0
            }
            (ValueType::FourByteFloat, [a, b, c, d]) => f64::from(f32::from_be_bytes([*a, *b, *c, *d])),
            (ValueType::Energy, [a, b, c, d]) => f64::from(i32::from_be_bytes([*a, *b, *c, *d])),
            _ => return Err(invalid()),
        };
        Ok(DatapointValue::Numeric(value))
    }
}

impl FromStr for ValueType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "binary" => Ok(ValueType::Binary),
            "percent" => Ok(ValueType::Percent),
            "percentU8" => Ok(ValueType::PercentU8),
            "1byte_unsigned" => Ok(ValueType::OneByteUnsigned),
            "2byte_unsigned" => Ok(ValueType::TwoByteUnsigned),
            "temperature" => Ok(ValueType::Temperature),
            "2byte_float" => Ok(ValueType::TwoByteFloat),
            "power" => Ok(ValueType::Power),
            "4byte_float" => Ok(ValueType::FourByteFloat),
            "energy" => Ok(ValueType::Energy),
            other => Err(ConfigError::invalid(format!("unknown value type '{}'", other))),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value_type: ValueType) -> Self {
        value_type.name().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DPT 16.000: ASCII, at most 14 characters, zero padded.
pub fn encode_string14(text: &str) -> Payload {
    let mut bytes = PayloadBytes::new();
    for c in text.chars().take(MAX_PAYLOAD_SIZE) {
        let byte = if c.is_ascii() { c as u8 } else { b'?' };
        // capacity equals the char limit above
        let _ = bytes.push(byte);
    }
    while !bytes.is_full() {
        let _ = bytes.push(0);
    }
    Payload::Bytes(bytes)
}

pub fn decode_string14(payload: &Payload) -> Option<String> {
    match payload {
        Payload::Bytes(bytes) if bytes.len() == MAX_PAYLOAD_SIZE => Some(
            bytes
                .iter()
                .take_while(|b| **b != 0)
                .map(|b| char::from(*b))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(data: &[u8]) -> Payload {
        Payload::from_slice(data).unwrap()
    }

    #[test]
    fn test_binary_encoding() {
        assert_eq!(ValueType::Binary.encode(true.into()).unwrap(), Payload::Small(1));
        assert_eq!(
            ValueType::Binary.decode(&Payload::Small(0)).unwrap(),
            DatapointValue::Binary(false)
        );
    }

    #[test]
    fn test_float16_known_values() {
        assert_eq!(ValueType::Temperature.encode(21.0.into()).unwrap(), bytes(&[0x0C, 0x1A]));
        assert_eq!(ValueType::Temperature.encode(0.0.into()).unwrap(), bytes(&[0x00, 0x00]));
        assert_eq!(ValueType::Temperature.encode((-1.0).into()).unwrap(), bytes(&[0x87, 0x9C]));
        assert_eq!(
            ValueType::Temperature.decode(&bytes(&[0x0C, 0x1A])).unwrap(),
            DatapointValue::Numeric(21.0)
        );
        assert_eq!(
            ValueType::Temperature.decode(&bytes(&[0x0C, 0x33])).unwrap(),
            DatapointValue::Numeric(21.5)
        );
        assert_eq!(
            ValueType::Power.decode(&bytes(&[0x00, 0x0A])).unwrap(),
            DatapointValue::Numeric(0.1)
        );
    }

    #[test]
    fn test_float16_large_value_uses_exponent() {
        let payload = ValueType::TwoByteFloat.encode(1000.0.into()).unwrap();
        let decoded = ValueType::TwoByteFloat.decode(&payload).unwrap().as_f64().unwrap();
        assert!((decoded - 1000.0).abs() < 1.0);
        assert!(ValueType::TwoByteFloat.encode(700_000.0.into()).is_err());
    }

    #[test]
    fn test_percent_is_scaled_to_one_octet() {
        assert_eq!(ValueType::Percent.encode(0.0.into()).unwrap(), bytes(&[0]));
        assert_eq!(ValueType::Percent.encode(100.0.into()).unwrap(), bytes(&[255]));
        let payload = ValueType::Percent.encode(50.0.into()).unwrap();
        assert_eq!(ValueType::Percent.decode(&payload).unwrap(), DatapointValue::Numeric(50.0));
        assert!(ValueType::Percent.encode(101.0.into()).is_err());
    }

    #[test]
    fn test_percent_u8_is_not_scaled() {
        assert_eq!(ValueType::PercentU8.encode(200.0.into()).unwrap(), bytes(&[200]));
        assert_eq!(
            ValueType::PercentU8.decode(&bytes(&[42])).unwrap(),
            DatapointValue::Numeric(42.0)
        );
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(
            ValueType::Binary.encode(1.0.into()),
            Err(ValueError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ValueType::Energy.encode(true.into()),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_payload_length_is_rejected() {
        assert!(ValueType::TwoByteUnsigned.decode(&bytes(&[1])).is_err());
        assert!(ValueType::Energy.decode(&Payload::Small(1)).is_err());
    }

    #[test]
    fn test_string14() {
        let payload = encode_string14("Störung Hochdruck");
        assert_eq!(decode_string14(&payload).unwrap(), "St?rung Hochdr");
        assert_eq!(decode_string14(&encode_string14("E25")).unwrap(), "E25");
    }

    #[test]
    fn test_value_type_serde_uses_configured_name() {
        let value_type: ValueType = serde_json::from_str("\"percentU8\"").unwrap();
        assert_eq!(value_type, ValueType::PercentU8);
        assert_eq!(serde_json::to_string(&ValueType::Power).unwrap(), "\"power\"");
        assert!(serde_json::from_str::<ValueType>("\"kelvin\"").is_err());
    }

    #[test]
    fn test_value_type_names() {
        assert_eq!("percentU8".parse::<ValueType>().unwrap(), ValueType::PercentU8);
        assert_eq!(ValueType::PercentU8.to_string(), "percentU8");
        assert_eq!(ValueType::PercentU8.unit_of_measurement(), Some("%"));
        assert_eq!("temperature".parse::<ValueType>().unwrap().unit_of_measurement(), Some("°C"));
        assert!("dpt-9000".parse::<ValueType>().is_err());
    }
}
