use std::time::Duration;

use anyhow::Context;

use crate::{
    accumulator::{Anemometer, PulseWindowAccumulator, WindAggregate},
    error::SensorError,
    hardware::{AnalogInput, EdgeSource},
    observation::{UNKNOWN_DIRECTION, WindReading},
};

use super::SensorProvider;

const SENSOR: &str = "wind";

pub const REFERENCE_VOLTAGE: f64 = 3.3;

/// Vane output in tenths of a volt, and the heading it indicates.
pub const HEADINGS: [(i64, f64); 16] = [
    (4, 0.0),
    (14, 22.5),
    (12, 45.0),
    (28, 67.5),
    (27, 90.0),
    (29, 112.5),
    (22, 135.0),
    (25, 157.5),
    (18, 180.0),
    (20, 202.5),
    (7, 225.0),
    (8, 247.5),
    (1, 270.0),
    (3, 292.5),
    (2, 315.0),
    (6, 337.5),
];

/// Maps a vane voltage to degrees, or `None` if it matches no heading.
pub fn heading(voltage: f64) -> Option<f64> {
    let decivolts = (voltage * 10.0).round() as i64;
    HEADINGS
        .iter()
        .find(|(v, _)| *v == decivolts)
        .map(|(_, degrees)| *degrees)
}

pub fn raw_to_voltage(raw: u16, full_scale: u16) -> f64 {
    if full_scale == 0 {
        return 0.0;
    }
    f64::from(raw) / f64::from(full_scale) * REFERENCE_VOLTAGE
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindConfig {
    pub anemometer_pin: u8,
    pub window: Duration,
    pub anemometer: Anemometer,
    pub vane_channel: u8,
}

/// Anemometer pulse accumulation plus an instantaneous vane read.
pub struct WindProvider {
    config: WindConfig,
    edges: Box<dyn EdgeSource>,
    vane: Box<dyn AnalogInput>,
    accumulator: PulseWindowAccumulator<WindAggregate>,
    connected: bool,
}

impl WindProvider {
    pub fn new(config: WindConfig, edges: Box<dyn EdgeSource>, vane: Box<dyn AnalogInput>) -> Self {
        let accumulator = PulseWindowAccumulator::new(
            SENSOR,
            config.window,
            WindAggregate::new(config.anemometer),
        );

        Self {
            config,
            edges,
            vane,
            accumulator,
            connected: false,
        }
    }

    fn direction(&mut self) -> Result<f64, anyhow::Error> {
        let raw = self
            .vane
            .read_channel(self.config.vane_channel)
            .context("Failed to read wind vane")?;
        let voltage = raw_to_voltage(raw, self.vane.full_scale());

        Ok(heading(voltage).unwrap_or_else(|| {
            log::warn!("Wind vane voltage {voltage:.1}V has no corresponding heading");
            UNKNOWN_DIRECTION
        }))
    }

    fn try_connect(&mut self) -> Result<(), anyhow::Error> {
        self.edges.open()?;

        if let Err(e) = self.accumulator.start() {
            self.edges.close();
            return Err(e);
        }

        let counter = self.accumulator.counter();
        if let Err(e) = self
            .edges
            .watch(self.config.anemometer_pin, Box::new(move || counter.on_edge()))
        {
            self.accumulator.stop();
            self.edges.close();
            return Err(e);
        }

        if let Err(e) = self.direction() {
            self.release();
            return Err(e);
        }

        Ok(())
    }

    fn release(&mut self) {
        self.accumulator.stop();
        if let Err(e) = self.edges.unwatch(self.config.anemometer_pin) {
            log::error!("Failed to unwatch anemometer pin: {e:#}");
        }
        self.edges.close();
    }
}

impl SensorProvider for WindProvider {
    type Reading = WindReading;

    fn connect(&mut self) -> Result<(), SensorError> {
        if self.connected {
            return Ok(());
        }

        self.try_connect()
            .map_err(|e| SensorError::connect(SENSOR, e))?;

        self.connected = true;
        log::info!("Connected {SENSOR} provider");
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            log::debug!("Attempted to disconnect {SENSOR} provider that is not connected");
            return;
        }

        self.release();
        self.connected = false;
        log::info!("Disconnected {SENSOR} provider");
    }

    fn readings(&mut self) -> Result<WindReading, SensorError> {
        if !self.connected {
            return Err(SensorError::NotConnected(SENSOR));
        }

        // Read the vane first so a failure does not discard the drained window.
        let direction = self
            .direction()
            .map_err(|e| SensorError::read(SENSOR, e))?;
        let speed = self.accumulator.readings();

        Ok(WindReading {
            speed: speed.speed,
            direction,
            gust: speed.gust,
        })
    }
}
