use crate::config::DeviceIdentity;
use crate::estimator::{DeviceEstimators, EstimatorReadings, JsonFileStore, SocConfig};
use crate::modbus::RegisterMap;
use crate::prelude::*;
use crate::provider::{InverterProvider, ModbusProvider, Provider, ProviderArgs, Registry};
use crate::register::RegisterFile;
use crate::transport::{ResponseFraming, TcpTransport};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One device and the state only its own poll may touch.
pub struct PolledDevice {
    name: String,
    identity: Option<DeviceIdentity>,
    provider: Provider,
    estimators: DeviceEstimators,
    estimator_fault_reported: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PolledSnapshot {
    pub snapshot: CanonicalSnapshot,
    pub estimates: EstimatorReadings,
}

/// Result of polling one device for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceReport {
    pub device: String,
    pub identity: Option<DeviceIdentity>,
    pub outcome: Result<PolledSnapshot, Error>,
}

impl DeviceReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut r = match &self.outcome {
            Ok(polled) => serde_json::json!({
                "device": self.device,
                "snapshot": polled.snapshot,
                "estimates": polled.estimates,
            }),
            Err(err) => serde_json::json!({
                "device": self.device,
                "error": err.to_string(),
            }),
        };
        if let Some(identity) = &self.identity {
            r["identity"] = serde_json::json!(identity);
        }
        r
    }
}

impl PolledDevice {
    pub fn new(name: &str, provider: Provider) -> Self {
        Self {
            name: name.to_owned(),
            identity: None,
            provider,
            estimators: DeviceEstimators::default(),
            estimator_fault_reported: false,
        }
    }

    /// Addressing details echoed into every report for this device.
    pub fn with_identity(mut self, identity: Option<DeviceIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn estimators(&self) -> &DeviceEstimators {
        &self.estimators
    }

    async fn poll(&mut self, timeout: Duration, battery: Option<SocConfig>) -> DeviceReport {
        let result = match tokio::time::timeout(timeout, self.provider.read_snapshot()).await {
            Ok(r) => r,
            Err(_) => Err(Error::TransportTimeout(timeout)),
        };

        let outcome = match result {
            Ok(snapshot) => {
                let estimates = self.advance(&snapshot, battery.as_ref());
                debug!(
                    "{}: mode {} battery {:?} V {:?} A, pv {:?} W",
                    self.name,
                    snapshot.operating_mode,
                    snapshot.battery_voltage_v,
                    snapshot.battery_current_a,
                    snapshot.pv_total_power_w()
                );
                Ok(PolledSnapshot {
                    snapshot,
                    estimates,
                })
            }
            Err(err) => {
                warn!("{}: poll failed: {}", self.name, err);
                Err(err)
            }
        };

        DeviceReport {
            device: self.name.clone(),
            identity: self.identity.clone(),
            outcome,
        }
    }

    fn advance(&mut self, snapshot: &CanonicalSnapshot, battery: Option<&SocConfig>) -> EstimatorReadings {
        let mut estimators = std::mem::take(&mut self.estimators).advance_energy(snapshot);

        if let Some(config) = battery {
            match estimators.clone().advance_soc(snapshot, config) {
                Ok(advanced) => {
                    estimators = advanced;
                    self.estimator_fault_reported = false;
                }
                Err(err) => {
                    if !self.estimator_fault_reported {
                        error!("{}: SOC estimator disabled: {}", self.name, err);
                        self.estimator_fault_reported = true;
                    }
                }
            }
        }

        self.estimators = estimators;
        self.estimators.readings(battery)
    }
}

/// Polls every configured device concurrently, once per cycle.
pub struct Coordinator {
    config: ConfigWrapper,
    devices: Vec<PolledDevice>,
    store: Option<JsonFileStore>,
}

impl Coordinator {
    /// Builds a TCP-backed provider for every enabled device.
    pub fn new(config: ConfigWrapper) -> Result<Self> {
        let registry = Registry::default();
        let mut devices = Vec::new();

        for device in config.enabled_devices() {
            let framing = if device.provider() == ModbusProvider::KIND {
                ResponseFraming::ModbusRtu
            } else {
                ResponseFraming::Terminator(crate::ascii::packet::TERMINATOR)
            };
            let transport = TcpTransport::new(device.host(), device.port(), framing)
                .with_timeouts(device.read_timeout(), device.read_timeout());

            let mut args = ProviderArgs::new(Arc::new(transport)).slave_id(device.slave_id());
            if let Some(file) = &device.register_file {
                let map: RegisterMap = RegisterFile::load(file)?;
                args = args.register_map(map);
            }

            let provider = registry.create(device.provider(), args)?;
            info!("{}: {} provider at {}:{}", device.name(), provider.kind(), device.host(), device.port());
            if let Some(id) = &device.identity {
                info!(
                    "{}: address {} device code {} part {} serial {}",
                    device.name(),
                    id.address,
                    id.device_code,
                    id.part_number,
                    id.serial_number
                );
            }
            devices.push(PolledDevice::new(device.name(), provider).with_identity(device.identity.clone()));
        }

        let store = config.state_file().map(JsonFileStore::new);
        Self::from_devices(config, devices, store)
    }

    /// Uses already constructed devices, restoring their estimators from
    /// `store` when given.
    pub fn from_devices(
        config: ConfigWrapper,
        mut devices: Vec<PolledDevice>,
        store: Option<JsonFileStore>,
    ) -> Result<Self> {
        if let Some(store) = &store {
            let mut saved = store.load()?;
            for device in &mut devices {
                if let Some(estimators) = saved.remove(&device.name) {
                    info!("{}: restored estimator state", device.name);
                    device.estimators = estimators;
                }
            }
        }

        Ok(Self {
            config,
            devices,
            store,
        })
    }

    pub fn devices(&self) -> &[PolledDevice] {
        &self.devices
    }

    pub fn estimators(&self, device: &str) -> Option<&DeviceEstimators> {
        self.devices
            .iter()
            .find(|d| d.name == device)
            .map(PolledDevice::estimators)
    }

    pub async fn probe_all(&self) -> Vec<(String, bool)> {
        let probes = self.devices.iter().map(|d| async move {
            let ok = d.provider.probe().await;
            if ok {
                info!("{}: probe ok", d.name);
            } else {
                warn!("{}: probe failed", d.name);
            }
            (d.name.clone(), ok)
        });

        join_all(probes).await
    }

    /// One cycle: every device polled at once, each bounded by the poll
    /// timeout. A failing or slow device does not affect the others.
    pub async fn poll_all(&mut self) -> Vec<DeviceReport> {
        let timeout = self.config.poll_timeout();
        let config = self.config.clone();

        let polls = self.devices.iter_mut().map(|d| {
            let battery = config.battery(&d.name);
            d.poll(timeout, battery)
        });
        let reports = join_all(polls).await;

        let ok = reports.iter().filter(|r| r.is_ok()).count();
        info!("poll cycle: {}/{} devices ok", ok, reports.len());

        reports
    }

    /// Re-seeds a device's SOC estimate at `percent`.
    pub fn reset_soc(&mut self, device: &str, percent: f64) -> Result<()> {
        let battery = self
            .config
            .battery(device)
            .ok_or_else(|| anyhow!("device {} has no battery configured", device))?;
        let d = self
            .devices
            .iter_mut()
            .find(|d| d.name == device)
            .ok_or_else(|| anyhow!("unknown device {}", device))?;

        d.estimators = d.estimators.clone().reset_soc(&battery, percent, Utc::now())?;
        d.estimator_fault_reported = false;
        info!("{}: SOC reset to {}%", device, percent);
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let state: HashMap<String, DeviceEstimators> = self
            .devices
            .iter()
            .map(|d| (d.name.clone(), d.estimators.clone()))
            .collect();
        store.save(&state)
    }

    /// Polls every `poll_interval` until `shutdown_rx` fires.
    pub async fn run(mut self, mut shutdown_rx: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("coordinator stopping");
                    break;
                }
                _ = interval.tick() => {
                    for report in self.poll_all().await {
                        trace!("{}", report.to_json());
                    }
                    if let Err(e) = self.persist() {
                        warn!("Failed to save estimator state: {}", e);
                    }
                }
            }
        }

        self.persist()
    }
}
