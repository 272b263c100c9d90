use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use log::LevelFilter;
use serde::Deserialize;

use crate::{
    accumulator::{
        Anemometer, DEFAULT_ANEMOMETER_FACTOR, DEFAULT_ANEMOMETER_RADIUS_CM, DEFAULT_TIP_DEPTH_MM,
    },
    db::DEFAULT_DB_FILE,
    hardware::mcp3008,
    producer::DEFAULT_POLL_INTERVAL,
    provider::{rain::RainConfig, wind::WindConfig},
    publisher::{DEFAULT_TIMEOUT, EndpointConfig},
};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub producer: ProducerConfig,
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerConfig {
    pub interval_secs: u64,
    pub atmos: AtmosConfig,
    pub wind: WindSensorConfig,
    pub rain: RainSensorConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            atmos: AtmosConfig::default(),
            wind: WindSensorConfig::default(),
            rain: RainSensorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtmosConfig {
    pub i2c_bus: u8,
    pub secondary_address: bool,
}

impl Default for AtmosConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            secondary_address: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindSensorConfig {
    pub anemometer_pin: u8,
    pub window_secs: u64,
    pub radius_cm: f64,
    pub calibration_factor: f64,
    pub vane_spi_bus: u8,
    pub vane_spi_slave: u8,
    pub vane_channel: u8,
}

impl Default for WindSensorConfig {
    fn default() -> Self {
        Self {
            anemometer_pin: 5,
            window_secs: 5,
            radius_cm: DEFAULT_ANEMOMETER_RADIUS_CM,
            calibration_factor: DEFAULT_ANEMOMETER_FACTOR,
            vane_spi_bus: 0,
            vane_spi_slave: 0,
            vane_channel: 0,
        }
    }
}

impl WindSensorConfig {
    pub fn provider_config(&self) -> WindConfig {
        WindConfig {
            anemometer_pin: self.anemometer_pin,
            window: Duration::from_secs(self.window_secs),
            anemometer: Anemometer {
                radius_cm: self.radius_cm,
                calibration_factor: self.calibration_factor,
            },
            vane_channel: self.vane_channel,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RainSensorConfig {
    pub pin: u8,
    pub window_secs: u64,
    pub tip_depth_mm: f64,
}

impl Default for RainSensorConfig {
    fn default() -> Self {
        Self {
            pin: 6,
            window_secs: 5,
            tip_depth_mm: DEFAULT_TIP_DEPTH_MM,
        }
    }
}

impl RainSensorConfig {
    pub fn provider_config(&self) -> RainConfig {
        RainConfig {
            pin: self.pin,
            window: Duration::from_secs(self.window_secs),
            tip_depth_mm: self.tip_depth_mm,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    #[serde(default = "default_publish_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    pub endpoint: EndpointConfig,
}

fn default_publish_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_FILE.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.level_filter()?;

        if self.producer.interval_secs == 0 {
            anyhow::bail!("producer.intervalSecs must be positive");
        }
        if self.producer.wind.window_secs == 0 {
            anyhow::bail!("producer.wind.windowSecs must be positive");
        }
        if self.producer.wind.radius_cm <= 0.0 {
            anyhow::bail!("producer.wind.radiusCm must be positive");
        }
        if self.producer.wind.calibration_factor <= 0.0 {
            anyhow::bail!("producer.wind.calibrationFactor must be positive");
        }
        if self.producer.wind.vane_channel >= mcp3008::CHANNELS {
            anyhow::bail!(
                "producer.wind.vaneChannel must be below {}",
                mcp3008::CHANNELS
            );
        }
        if self.producer.rain.window_secs == 0 {
            anyhow::bail!("producer.rain.windowSecs must be positive");
        }
        if self.producer.rain.tip_depth_mm <= 0.0 {
            anyhow::bail!("producer.rain.tipDepthMm must be positive");
        }
        if self.publisher.interval_secs == 0 {
            anyhow::bail!("publisher.intervalSecs must be positive");
        }
        if self.publisher.endpoint.host.trim().is_empty() {
            anyhow::bail!("publisher.endpoint.host must be set");
        }

        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, anyhow::Error> {
        self.log_level
            .parse()
            .with_context(|| format!("Invalid log level {:?}", self.log_level))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.producer.interval_secs)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publisher.interval_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publisher.timeout_secs)
    }
}
