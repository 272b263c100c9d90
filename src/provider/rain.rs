use std::time::Duration;

use crate::{
    accumulator::{PulseWindowAccumulator, RainAggregate},
    error::SensorError,
    hardware::EdgeSource,
    observation::RainReading,
};

use super::SensorProvider;

const SENSOR: &str = "rain";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainConfig {
    pub pin: u8,
    pub window: Duration,
    pub tip_depth_mm: f64,
}

/// Tipping-bucket gauge; every tip adds a fixed depth to the running total.
pub struct RainProvider {
    config: RainConfig,
    edges: Box<dyn EdgeSource>,
    accumulator: PulseWindowAccumulator<RainAggregate>,
    connected: bool,
}

impl RainProvider {
    pub fn new(config: RainConfig, edges: Box<dyn EdgeSource>) -> Self {
        let accumulator = PulseWindowAccumulator::new(
            SENSOR,
            config.window,
            RainAggregate::new(config.tip_depth_mm),
        );

        Self {
            config,
            edges,
            accumulator,
            connected: false,
        }
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
            .watch(self.config.pin, Box::new(move || counter.on_edge()))
        {
            self.accumulator.stop();
            self.edges.close();
            return Err(e);
        }

        Ok(())
    }
}

impl SensorProvider for RainProvider {
    type Reading = RainReading;

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

        self.accumulator.stop();
        if let Err(e) = self.edges.unwatch(self.config.pin) {
            log::error!("Failed to unwatch rain gauge pin: {e:#}");
        }
        self.edges.close();

        self.connected = false;
        log::info!("Disconnected {SENSOR} provider");
    }

    fn readings(&mut self) -> Result<RainReading, SensorError> {
        if !self.connected {
            return Err(SensorError::NotConnected(SENSOR));
        }

        Ok(RainReading {
            rainfall: self.accumulator.readings(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accumulator::DEFAULT_TIP_DEPTH_MM, testing::FakeEdges};

    const PIN: u8 = 6;

    fn config(window: Duration) -> RainConfig {
        RainConfig {
            pin: PIN,
            window,
            tip_depth_mm: DEFAULT_TIP_DEPTH_MM,
        }
    }

    #[test]
    fn test_one_tip_then_zero() {
        let edges = FakeEdges::new();
        let mut provider = RainProvider::new(config(Duration::from_secs(5)), Box::new(edges.clone()));
        provider.connect().unwrap();

        edges.fire(PIN, 1);
        provider.accumulator.roll_window();
        assert_eq!(provider.readings().unwrap().rainfall, DEFAULT_TIP_DEPTH_MM);

        provider.accumulator.roll_window();
        assert_eq!(provider.readings().unwrap().rainfall, 0.0);

        provider.disconnect();
    }

    #[test]
    fn test_background_window_folds_tips() {
        let edges = FakeEdges::new();
        let mut provider =
            RainProvider::new(config(Duration::from_millis(10)), Box::new(edges.clone()));
        provider.connect().unwrap();

        edges.fire(PIN, 3);
        std::thread::sleep(Duration::from_millis(150));

        let rainfall = provider.readings().unwrap().rainfall;
        assert!((rainfall - 3.0 * DEFAULT_TIP_DEPTH_MM).abs() < 1e-9);

        provider.disconnect();
    }

    #[test]
    fn test_reconnect_starts_from_zero() {
        let edges = FakeEdges::new();
        let mut provider = RainProvider::new(config(Duration::from_secs(5)), Box::new(edges.clone()));
        provider.connect().unwrap();

        edges.fire(PIN, 3);
        provider.accumulator.roll_window();
        edges.fire(PIN, 2);
        provider.disconnect();

        provider.connect().unwrap();
        provider.accumulator.roll_window();
        assert_eq!(provider.readings().unwrap().rainfall, 0.0);

        edges.fire(PIN, 1);
        provider.accumulator.roll_window();
        assert_eq!(provider.readings().unwrap().rainfall, DEFAULT_TIP_DEPTH_MM);

        provider.disconnect();
    }

    #[test]
    fn test_not_connected() {
        let mut provider = RainProvider::new(config(Duration::from_secs(5)), Box::new(FakeEdges::new()));
        assert!(matches!(provider.readings(), Err(SensorError::NotConnected(_))));
        provider.disconnect();
    }

    #[test]
    fn test_shared_subsystem_survives_one_disconnect() {
        let edges = FakeEdges::new();
        let mut first = RainProvider::new(config(Duration::from_secs(5)), Box::new(edges.clone()));
        let mut second = RainProvider::new(
            RainConfig {
                pin: PIN + 1,
                ..config(Duration::from_secs(5))
            },
            Box::new(edges.clone()),
        );
        first.connect().unwrap();
        second.connect().unwrap();
        assert_eq!(edges.users(), 2);

        first.disconnect();
        assert_eq!(edges.users(), 1);
        assert!(edges.is_watched(PIN + 1));

        edges.fire(PIN + 1, 2);
        second.accumulator.roll_window();
        assert!(second.readings().unwrap().rainfall > 0.0);

        second.disconnect();
        assert_eq!(edges.users(), 0);

        // A surplus close is ignored.
        edges.clone().close();
        assert_eq!(edges.users(), 0);
    }

    #[test]
    fn test_failed_watch_releases_subsystem() {
        let edges = FakeEdges::new();
        edges.fail_watch(true);
        let mut provider = RainProvider::new(config(Duration::from_secs(5)), Box::new(edges.clone()));

        assert!(matches!(provider.connect(), Err(SensorError::Connect { .. })));
        assert!(!provider.accumulator.is_running());
        assert_eq!(edges.users(), 0);
    }
}
