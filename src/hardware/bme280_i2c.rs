use std::time::Duration;

use anyhow::Context;
use backon::{BlockingRetryable, ConstantBuilder};
use bme280::i2c::BME280;
use rppal::{hal::Delay, i2c::I2c};

use super::{ChipDriver, ChipSample, ChipSampler};

const PASCALS_PER_HECTOPASCAL: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
pub struct Bme280Driver {
    bus: u8,
    secondary_address: bool,
}

impl Bme280Driver {
    pub fn new(bus: u8, secondary_address: bool) -> Self {
        Self {
            bus,
            secondary_address,
        }
    }
}

fn retry_builder() -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(Duration::from_millis(100))
        .with_max_times(20)
}

impl ChipDriver for Bme280Driver {
    fn open(&mut self) -> Result<Box<dyn ChipSampler>, anyhow::Error> {
        let i2c = I2c::with_bus(self.bus).context("Failed to initialize I2C")?;
        let mut bme280 = if self.secondary_address {
            BME280::new_secondary(i2c)
        } else {
            BME280::new_primary(i2c)
        };

        (|| bme280.init(&mut Delay))
            .retry(retry_builder())
            .notify(|e, dur| {
                log::error!("{e}");
                log::info!("Retrying in {:?}", dur);
            })
            .call()
            .context("Failed to initialize BME280")?;

        Ok(Box::new(Bme280 { bme280 }))
    }
}

pub struct Bme280 {
    bme280: BME280<I2c>,
}

impl ChipSampler for Bme280 {
    fn read_sample(&mut self) -> Result<ChipSample, anyhow::Error> {
        let m = self
            .bme280
            .measure(&mut Delay)
            .context("Failed to read BME280 measurements")?;

        Ok(ChipSample {
            temperature: f64::from(m.temperature),
            humidity: f64::from(m.humidity),
            pressure: f64::from(m.pressure) / PASCALS_PER_HECTOPASCAL,
        })
    }
}
