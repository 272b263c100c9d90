pub mod atmospheric;
pub mod rain;
pub mod wind;

pub use atmospheric::AtmosphericProvider;
pub use rain::RainProvider;
pub use wind::WindProvider;

use crate::error::SensorError;

/// A connectable sensor that produces one reading per call.
pub trait SensorProvider: Send {
    type Reading: Default;

    /// Acquires the sensor. A failed connect leaves nothing open.
    fn connect(&mut self) -> Result<(), SensorError>;

    /// Releases the sensor. Safe to call when not connected.
    fn disconnect(&mut self);

    fn readings(&mut self) -> Result<Self::Reading, SensorError>;
}
