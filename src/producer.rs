use std::{sync::Arc, time::Duration};

use chrono::{SubsecRound, Utc};

use crate::{
    db::ObservationStore,
    observation::{AtmosphericReading, Observation, RainReading, WindReading},
    provider::SensorProvider,
    worker::{self, Worker},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub type AtmosphericSensor = Box<dyn SensorProvider<Reading = AtmosphericReading>>;
pub type WindSensor = Box<dyn SensorProvider<Reading = WindReading>>;
pub type RainSensor = Box<dyn SensorProvider<Reading = RainReading>>;

/// Polls every provider once per interval and records one observation per
/// tick.
pub struct SensorProducer {
    atmospheric: AtmosphericSensor,
    wind: WindSensor,
    rain: RainSensor,
    store: Arc<dyn ObservationStore>,
    interval: Duration,
}

fn read_or_zero<R: Default>(
    sensor: &str,
    provider: &mut dyn SensorProvider<Reading = R>,
) -> R {
    provider.readings().unwrap_or_else(|e| {
        log::error!("{e}; recording zeroes for {sensor}");
        R::default()
    })
}

impl SensorProducer {
    pub fn new(
        atmospheric: AtmosphericSensor,
        wind: WindSensor,
        rain: RainSensor,
        store: Arc<dyn ObservationStore>,
    ) -> Self {
        Self {
            atmospheric,
            wind,
            rain,
            store,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Reads every provider, substituting a zero reading for any that fails.
    pub fn poll(&mut self) -> Observation {
        let atmospheric = read_or_zero("atmospherics", self.atmospheric.as_mut());
        let wind = read_or_zero("wind", self.wind.as_mut());
        let rain = read_or_zero("rain", self.rain.as_mut());

        Observation {
            timestamp: Utc::now().trunc_subsecs(0),
            atmospheric,
            wind,
            rain,
            interval_seconds: self.interval.as_secs(),
            published: false,
        }
    }

    pub fn tick(&mut self) {
        let data = self.poll();

        // Rows that fail to persist are dropped, not queued.
        if let Err(e) = self.store.write(&data) {
            log::error!("Failed to insert observation into database: {e}");
            return;
        }

        log::debug!("{data:?}");
    }

    /// Starts polling on a background task. Stopping the returned worker
    /// hands the producer back so its providers can be disconnected.
    pub fn run(mut self, interval: Duration) -> Worker<SensorProducer> {
        self.interval = interval;

        Worker::spawn("sensor producer", move |mut halt| async move {
            let mut ticker = worker::ticker("sensor producer", self.interval);
            self.interval = ticker.period();

            loop {
                tokio::select! {
                    biased;
                    () = halt.requested() => break,
                    _ = ticker.tick() => self.tick(),
                }
            }

            self
        })
    }

    pub fn disconnect(&mut self) {
        self.atmospheric.disconnect();
        self.wind.disconnect();
        self.rain.disconnect();
    }
}
