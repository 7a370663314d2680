//! Heat pump control boundary.

use crate::error::HeatPumpError;
use crate::value::DatapointValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

/// Entry of the heat pump's fault list.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRecord {
    pub index: u32,
    pub error_code: u32,
    pub timestamp: SystemTime,
    pub message: String,
}

#[async_trait]
pub trait HeatPump: Send + Sync {
    /// Whether the heat pump currently reports a fault.
    async fn in_error(&self) -> Result<bool, HeatPumpError>;

    /// Most recent entry of the fault list.
    async fn last_fault(&self) -> Result<FaultRecord, HeatPumpError>;

    async fn get_param(&self, name: &str) -> Result<DatapointValue, HeatPumpError>;

    /// Writes a parameter and returns the value the heat pump confirmed.
    async fn set_param(
        &self,
        name: &str,
        value: DatapointValue,
    ) -> Result<DatapointValue, HeatPumpError>;
}

#[derive(Debug, Default)]
struct MemoryHeatPumpState {
    params: HashMap<String, DatapointValue>,
    in_error: bool,
    faults: Vec<FaultRecord>,
    unreachable: bool,
    set_calls: Vec<(String, DatapointValue)>,
    fault_queries: u32,
}

/// Heat pump simulated in memory. Every write is recorded.
#[derive(Debug, Default)]
pub struct MemoryHeatPump {
    state: Mutex<MemoryHeatPumpState>,
}

impl MemoryHeatPump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = (S, DatapointValue)>,
        S: Into<String>,
    {
        let heat_pump = Self::new();
        for (name, value) in params {
            heat_pump.set_local(name, value);
        }
        heat_pump
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHeatPumpState> {
        // the state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Changes a parameter as if it was changed on the heat pump itself.
    pub fn set_local(&self, name: impl Into<String>, value: DatapointValue) {
        self.lock().params.insert(name.into(), value);
    }

    pub fn param(&self, name: &str) -> Option<DatapointValue> {
        self.lock().params.get(name).copied()
    }

    /// Raises a fault and appends it to the fault list.
    pub fn raise_fault(&self, error_code: u32, message: impl Into<String>) {
        let mut state = self.lock();
        let index = state.faults.len() as u32;
        state.faults.push(FaultRecord {
            index,
            error_code,
            timestamp: SystemTime::now(),
            message: message.into(),
        });
        state.in_error = true;
    }

    pub fn clear_fault(&self) {
        self.lock().in_error = false;
    }

    /// Makes every query fail with a communication error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_calls(&self) -> Vec<(String, DatapointValue)> {
        self.lock().set_calls.clone()
    }

    pub fn fault_queries(&self) -> u32 {
        self.lock().fault_queries
    }

    fn check_reachable(state: &MemoryHeatPumpState) -> Result<(), HeatPumpError> {
        if state.unreachable {
            Err(HeatPumpError::Communication("no response from heat pump".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HeatPump for MemoryHeatPump {
    async fn in_error(&self) -> Result<bool, HeatPumpError> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        Ok(state.in_error)
    }

    async fn last_fault(&self) -> Result<FaultRecord, HeatPumpError> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        state.fault_queries += 1;
        state.faults.last().cloned().ok_or(HeatPumpError::NoFaultRecord)
    }

    async fn get_param(&self, name: &str) -> Result<DatapointValue, HeatPumpError> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        state
            .params
            .get(name)
            .copied()
            .ok_or_else(|| HeatPumpError::UnknownParameter(name.to_string()))
    }

    async fn set_param(
        &self,
        name: &str,
        value: DatapointValue,
    ) -> Result<DatapointValue, HeatPumpError> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        let current = state
            .params
            .get_mut(name)
            .ok_or_else(|| HeatPumpError::UnknownParameter(name.to_string()))?;
        if current.kind() != value.kind() {
            return Err(HeatPumpError::Rejected {
                name: name.to_string(),
                reason: format!("expected {} value", current.kind()),
            });
        }
        *current = value;
        state.set_calls.push((name.to_string(), value));
        Ok(value)
    }
}
