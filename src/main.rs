use std::sync::Arc;

use anyhow::Context;
use config::{AppConfig, DEFAULT_CONFIG_FILE};
use db::{DB, ObservationStore};
use hardware::{bme280_i2c::Bme280Driver, gpio::GpioEdges, mcp3008::MCP3008};
use producer::SensorProducer;
use provider::{AtmosphericProvider, RainProvider, SensorProvider, WindProvider};
use publisher::{Publisher, UreqTransport};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

mod accumulator;
mod config;
mod db;
mod error;
mod hardware;
mod observation;
mod producer;
mod provider;
mod publisher;
#[cfg(test)]
mod testing;
mod worker;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = AppConfig::load(&path)?;

    TermLogger::init(
        config.level_filter()?,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run(config).await {
        log::error!("{e:#}");
    }

    Ok(())
}

fn connect_all(
    atmospheric: &mut dyn SensorProvider<Reading = observation::AtmosphericReading>,
    wind: &mut dyn SensorProvider<Reading = observation::WindReading>,
    rain: &mut dyn SensorProvider<Reading = observation::RainReading>,
) -> Result<(), anyhow::Error> {
    atmospheric.connect()?;

    if let Err(e) = wind.connect() {
        atmospheric.disconnect();
        return Err(e.into());
    }

    if let Err(e) = rain.connect() {
        wind.disconnect();
        atmospheric.disconnect();
        return Err(e.into());
    }

    Ok(())
}

pub async fn run(config: AppConfig) -> Result<(), anyhow::Error> {
    let producer_config = &config.producer;
    let edges = GpioEdges::new();

    let mut atmospheric = AtmosphericProvider::new(Box::new(Bme280Driver::new(
        producer_config.atmos.i2c_bus,
        producer_config.atmos.secondary_address,
    )));
    let vane = MCP3008::new(
        producer_config.wind.vane_spi_bus,
        producer_config.wind.vane_spi_slave,
    )
    .context("Failed to initialize MCP3008")?;
    let mut wind = WindProvider::new(
        producer_config.wind.provider_config(),
        Box::new(edges.clone()),
        Box::new(vane),
    );
    let mut rain = RainProvider::new(producer_config.rain.provider_config(), Box::new(edges));

    connect_all(&mut atmospheric, &mut wind, &mut rain)?;
    log::info!("Connected to all sensors");

    let store: Arc<dyn ObservationStore> = match DB::open(&config.database.path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            rain.disconnect();
            wind.disconnect();
            atmospheric.disconnect();
            return Err(anyhow::Error::new(e).context("Failed to initialize database"));
        }
    };

    let producer = SensorProducer::new(
        Box::new(atmospheric),
        Box::new(wind),
        Box::new(rain),
        Arc::clone(&store),
    )
    .run(config.poll_interval());

    let publisher = Publisher::new(
        store,
        config.publisher.endpoint.clone(),
        Box::new(UreqTransport::new(config.publish_timeout())),
    )
    .run(config.publish_interval());

    log::info!("Weather station running");

    let signal = tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C signal");

    log::info!("Shutting down");
    let (producer, publisher) = tokio::join!(producer.stop(), publisher.stop());
    if let Err(e) = publisher {
        log::error!("Publisher task failed: {e}");
    }
    match producer {
        Ok(mut producer) => {
            tokio::task::spawn_blocking(move || producer.disconnect())
                .await
                .context("Failed to disconnect sensors")?;
        }
        Err(e) => log::error!("Producer task failed: {e}"),
    }

    log::info!("Graceful shutdown completed");

    signal
}
