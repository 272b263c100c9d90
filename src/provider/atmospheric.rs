use crate::{
    error::SensorError,
    hardware::{ChipDriver, ChipSampler},
    observation::AtmosphericReading,
};

use super::SensorProvider;

const SENSOR: &str = "atmospheric";

/// Direct read-through to the temperature/humidity/pressure chip.
pub struct AtmosphericProvider {
    driver: Box<dyn ChipDriver>,
    chip: Option<Box<dyn ChipSampler>>,
}

impl AtmosphericProvider {
    pub fn new(driver: Box<dyn ChipDriver>) -> Self {
        Self { driver, chip: None }
    }
}

impl SensorProvider for AtmosphericProvider {
    type Reading = AtmosphericReading;

    fn connect(&mut self) -> Result<(), SensorError> {
        if self.chip.is_some() {
            return Ok(());
        }

        let mut chip = self
            .driver
            .open()
            .map_err(|e| SensorError::connect(SENSOR, e))?;

        // A chip that initialises but cannot be read is dropped, closing the bus.
        chip.read_sample()
            .map_err(|e| SensorError::connect(SENSOR, e))?;

        self.chip = Some(chip);
        log::info!("Connected {SENSOR} provider");
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.chip.take().is_none() {
            log::debug!("Attempted to disconnect {SENSOR} provider that is not connected");
            return;
        }

        log::info!("Disconnected {SENSOR} provider");
    }

    fn readings(&mut self) -> Result<AtmosphericReading, SensorError> {
        let chip = self
            .chip
            .as_mut()
            .ok_or(SensorError::NotConnected(SENSOR))?;
        let sample = chip
            .read_sample()
            .map_err(|e| SensorError::read(SENSOR, e))?;

        Ok(AtmosphericReading {
            temperature: sample.temperature,
            humidity: sample.humidity,
            pressure: sample.pressure,
        })
    }
}
