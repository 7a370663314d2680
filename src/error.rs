use thiserror::Error;

/// Invalid configuration, raised while a configuration file is validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
    #[error("missing required key '{key}' for '{device}'")]
    MissingKey { device: String, key: &'static str },
    #[error("device '{device}': {source}")]
    Device {
        device: String,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("failed to read configuration: {0}")]
    Io(String),
    #[error("malformed configuration document: {0}")]
    Json(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }

    pub(crate) fn for_device(self, device: &str) -> Self {
        ConfigError::Device {
            device: device.to_string(),
            source: Box::new(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("value {value} out of range for {value_type}")]
    OutOfRange { value: f64, value_type: &'static str },
    #[error("expected a {expected} value, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("value cannot be encoded as {value_type}")]
    Encoding { value_type: &'static str },
    #[error("payload {payload:?} cannot be decoded as {value_type}")]
    InvalidPayload {
        payload: Vec<u8>,
        value_type: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus transmission failed: {0}")]
    Transmission(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeatPumpError {
    #[error("heat pump communication failed: {0}")]
    Communication(String),
    #[error("unknown heat pump parameter '{0}'")]
    UnknownParameter(String),
    #[error("heat pump rejected value for '{name}': {reason}")]
    Rejected { name: String, reason: String },
    #[error("heat pump has no fault record")]
    NoFaultRecord,
}

/// Failure of a single runtime operation on one device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    HeatPump(#[from] HeatPumpError),
}
