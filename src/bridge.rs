//! Device registry and main loop.
//!
//! The bridge owns every configured device, routes inbound telegrams by group
//! address and drives the periodic tick. A device that fails is logged and
//! skipped; the remaining devices keep running.

use crate::bus::{KnxBus, Telegram};
use crate::config::BridgeConfig;
use crate::datapoint::Datapoint;
use crate::heatpump::HeatPump;
use crate::notification::FaultNotification;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub ticks: u64,
    pub telegrams_processed: u64,
    pub device_errors: u64,
}

#[derive(Debug)]
pub struct Bridge {
    datapoints: Vec<Datapoint>,
    notifications: Vec<FaultNotification>,
    poll_interval: Duration,
    stats: BridgeStats,
}

impl Bridge {
    pub fn from_config(
        config: &BridgeConfig,
        bus: Arc<dyn KnxBus>,
        heat_pump: Arc<dyn HeatPump>,
    ) -> Self {
        let datapoints = config
            .datapoints
            .iter()
            .map(|(name, dp)| Datapoint::from_config(name, dp, bus.clone(), heat_pump.clone()))
            .collect();
        let notifications = config
            .notifications
            .iter()
            .map(|(name, n)| FaultNotification::from_config(name, n, bus.clone(), heat_pump.clone()))
            .collect();

        Self {
            datapoints,
            notifications,
            poll_interval: config.poll_interval,
            stats: BridgeStats::default(),
        }
    }

    pub fn datapoints(&self) -> &[Datapoint] {
        &self.datapoints
    }

    pub fn datapoint(&self, name: &str) -> Option<&Datapoint> {
        self.datapoints.iter().find(|dp| dp.name() == name)
    }

    pub fn datapoint_mut(&mut self, name: &str) -> Option<&mut Datapoint> {
        self.datapoints.iter_mut().find(|dp| dp.name() == name)
    }

    pub fn notifications(&self) -> &[FaultNotification] {
        &self.notifications
    }

    pub fn notification(&self, name: &str) -> Option<&FaultNotification> {
        self.notifications.iter().find(|n| n.name() == name)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Hands an inbound telegram to every datapoint on its group address.
    pub async fn process_telegram(&mut self, telegram: &Telegram) {
        self.stats.telegrams_processed += 1;
        for datapoint in self
            .datapoints
            .iter_mut()
            .filter(|dp| dp.group_address() == telegram.destination)
        {
            if let Err(e) = datapoint.process(telegram).await {
                error!("Datapoint '{}' failed to process {}: {}", datapoint.name(), telegram, e);
                self.stats.device_errors += 1;
            }
        }
    }

    /// Pulls every parameter from the heat pump.
    pub async fn refresh_parameters(&mut self) {
        for datapoint in &mut self.datapoints {
            if let Err(e) = datapoint.refresh().await {
                error!("Failed to refresh datapoint '{}': {}", datapoint.name(), e);
                self.stats.device_errors += 1;
            }
        }
    }

    /// One poll cycle: refresh parameters, cyclic sending, fault polling.
    pub async fn tick(&mut self) {
        self.stats.ticks += 1;
        debug!("Bridge tick #{}", self.stats.ticks);

        self.refresh_parameters().await;

        for datapoint in &self.datapoints {
            if let Err(e) = datapoint.broadcast_value(false).await {
                error!("Cyclic sending of '{}' failed: {}", datapoint.name(), e);
                self.stats.device_errors += 1;
            }
        }

        for notification in &mut self.notifications {
            notification.do_tick().await;
        }
    }

    /// Runs until the inbound telegram channel closes.
    pub async fn run(&mut self, mut telegrams: mpsc::Receiver<Telegram>) {
        info!(
            "🚀 Bridge running: {} datapoints, {} notifications, poll interval {:?}",
            self.datapoints.len(),
            self.notifications.len(),
            self.poll_interval
        );

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                received = telegrams.recv() => match received {
                    Some(telegram) => self.process_telegram(&telegram).await,
                    None => break,
                },
            }
        }

        info!("🛑 Bridge stopped after {} ticks", self.stats.ticks);
    }
}
