use crate::estimator::SocConfig;
use crate::prelude::*;
use crate::provider::Registry;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub devices: Vec<Device>,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_poll_timeout")]
    pub poll_timeout: Duration,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Optional path where estimator state is kept between runs
    pub state_file: Option<String>,
}

// Device {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub name: String,

    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub provider: String,
    pub host: String,
    pub port: u16,

    pub slave_id: Option<u8>,
    pub identity: Option<DeviceIdentity>,
    pub battery: Option<Battery>,
    pub register_file: Option<String>,
    pub read_timeout: Option<u64>,
}
impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id.unwrap_or(1)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout.unwrap_or(5))
    }

    pub fn battery(&self) -> Option<SocConfig> {
        self.battery.as_ref().map(Battery::soc_config)
    }
} // }}}

// DeviceIdentity {{{
/// Opaque to polling; carried through for whoever addresses the device.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceIdentity {
    pub address: u16,
    pub device_code: u16,
    pub part_number: String,
    pub serial_number: String,
} // }}}

// Battery {{{
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Battery {
    pub capacity_wh: f64,
    pub bulk_voltage: f64,
    pub float_voltage: f64,
}
impl Battery {
    pub fn soc_config(&self) -> SocConfig {
        SocConfig {
            capacity_wh: self.capacity_wh,
            bulk_voltage: self.bulk_voltage,
            float_voltage: self.float_voltage,
        }
    }

    fn validate(&self, device: &str) -> Result<()> {
        if !(self.capacity_wh > 0.0) {
            bail!("device {}: battery.capacity_wh must be positive", device);
        }
        if self.float_voltage > self.bulk_voltage {
            bail!(
                "device {}: battery.float_voltage {} is above bulk_voltage {}",
                device,
                self.float_voltage,
                self.bulk_voltage
            );
        }
        Ok(())
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn devices(&self) -> Vec<Device> {
        self.lock().devices.clone()
    }

    pub fn enabled_devices(&self) -> Vec<Device> {
        self.devices().into_iter().filter(|d| d.enabled()).collect()
    }

    pub fn device(&self, name: &str) -> Option<Device> {
        self.devices().into_iter().find(|d| d.name() == name)
    }

    pub fn poll_interval(&self) -> Duration {
        self.lock().poll_interval
    }

    pub fn poll_timeout(&self) -> Duration {
        self.lock().poll_timeout
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn state_file(&self) -> Option<String> {
        self.lock().state_file.clone()
    }

    pub fn battery(&self, device: &str) -> Option<SocConfig> {
        self.lock()
            .devices
            .iter()
            .find(|d| d.name == device)
            .and_then(Device::battery)
    }

    /// Replace a device's battery parameters at runtime
    pub fn set_battery(&self, device: &str, battery: Battery) -> Result<()> {
        battery.validate(device)?;

        let mut config = self.lock();
        match config.devices.iter_mut().find(|d| d.name == device) {
            Some(d) => {
                info!("Updating battery of {} to {:?}", device, battery);
                d.battery = Some(battery);
                Ok(())
            }
            None => Err(anyhow!("config.rs:device {} not found", device)),
        }
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;

        info!(
            "  Devices: {} configured, {} enabled",
            config.devices.len(),
            config.devices.iter().filter(|d| d.enabled).count()
        );
        for (i, d) in config.devices.iter().enumerate() {
            info!("    Device[{}] {}:", i, d.name);
            info!("      Enabled: {}", d.enabled);
            info!("      Provider: {}", d.provider);
            info!("      Address: {}:{}", d.host, d.port);
            if let Some(b) = &d.battery {
                info!(
                    "      Battery: {} Wh, bulk {} V, float {} V",
                    b.capacity_wh, b.bulk_voltage, b.float_voltage
                );
            }
        }
        info!("  Poll interval: {:?}", config.poll_interval);
        info!("  Poll timeout: {:?}", config.poll_timeout);
        info!("  Log Level: {}", config.loglevel);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_timeout.is_zero() {
            bail!("poll_timeout must be positive");
        }
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be positive");
        }

        let registry = Registry::default();
        let mut names = HashSet::new();
        for (i, d) in self.devices.iter().enumerate() {
            if d.name.is_empty() {
                bail!("device[{}].name cannot be empty", i);
            }
            if !names.insert(d.name.as_str()) {
                bail!("device name {} is used twice", d.name);
            }
            if !registry.contains(&d.provider) {
                bail!("device {}: {}", d.name, Error::UnknownProviderKind(d.provider.clone()));
            }
            if d.port == 0 {
                bail!("device {}: port must be between 1 and 65535", d.name);
            }
            if d.host.is_empty() {
                return Err(anyhow!("config.rs:device {} host cannot be empty", d.name));
            }
            if !(1..=247).contains(&d.slave_id()) {
                bail!("device {}: slave_id must be between 1 and 247", d.name);
            }
            if let Some(b) = &d.battery {
                b.validate(&d.name)?;
            }
        }

        Ok(())
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_poll_interval() -> Duration {
        Duration::from_secs(10)
    }

    fn default_poll_timeout() -> Duration {
        Duration::from_secs(30)
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
