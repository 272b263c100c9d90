//! Driver capabilities consumed by the sensor providers, and their rppal-backed
//! implementations.

pub mod bme280_i2c;
pub mod gpio;
pub mod mcp3008;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChipSample {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

/// An opened temperature/humidity/pressure chip.
pub trait ChipSampler: Send {
    fn read_sample(&mut self) -> Result<ChipSample, anyhow::Error>;
}

/// Opens the bus to the chip. Dropping the returned sampler releases the bus.
pub trait ChipDriver: Send {
    fn open(&mut self) -> Result<Box<dyn ChipSampler>, anyhow::Error>;
}

pub trait AnalogInput: Send {
    fn read_channel(&mut self, channel: u8) -> Result<u16, anyhow::Error>;

    /// Raw value corresponding to the reference voltage.
    fn full_scale(&self) -> u16;
}

/// Rising-edge notification subsystem. The callback runs outside the caller's
/// stack, on whatever thread the subsystem delivers interrupts on.
pub trait EdgeSource: Send {
    fn open(&mut self) -> Result<(), anyhow::Error>;

    fn watch(
        &mut self,
        pin: u8,
        on_rising_edge: Box<dyn FnMut() + Send + 'static>,
    ) -> Result<(), anyhow::Error>;

    fn unwatch(&mut self, pin: u8) -> Result<(), anyhow::Error>;

    /// Releases one `open`. Closing more often than opening is tolerated.
    fn close(&mut self);
}
