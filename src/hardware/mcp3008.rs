use anyhow::Context;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use super::AnalogInput;

pub const CLOCK_SPEED: u32 = 1_350_000;
pub const MODE: Mode = Mode::Mode0;

pub const CHANNELS: u8 = 8;
pub const FULL_SCALE: u16 = 1023;

pub const START_BIT: u8 = 0x01;
pub const SINGLE_ENDED: u8 = 0x08;

#[derive(Debug)]
pub struct MCP3008 {
    spi: Spi,
}

impl MCP3008 {
    pub fn new(bus: u8, slave: u8) -> Result<MCP3008, anyhow::Error> {
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            _ => anyhow::bail!("Unsupported SPI bus {bus}"),
        };
        let slave = match slave {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            _ => anyhow::bail!("Unsupported SPI slave select {slave}"),
        };

        let spi = Spi::new(bus, slave, CLOCK_SPEED, MODE).context("Failed to initialize SPI")?;

        Ok(MCP3008 { spi })
    }
}

impl AnalogInput for MCP3008 {
    fn read_channel(&mut self, channel: u8) -> Result<u16, anyhow::Error> {
        if channel >= CHANNELS {
            return Err(anyhow::anyhow!(
                "Invalid channel: expected 0..{}, got {}",
                CHANNELS,
                channel
            ));
        }

        let command = read_command(channel);
        let mut response = [0u8; 3];
        self.spi
            .transfer(&mut response, &command)
            .context("Failed to transfer command over SPI")?;

        Ok(decode_response(&response))
    }

    fn full_scale(&self) -> u16 {
        FULL_SCALE
    }
}

pub fn read_command(channel: u8) -> [u8; 3] {
    [START_BIT, (SINGLE_ENDED | (channel & 0x07)) << 4, 0x00]
}

pub fn decode_response(response: &[u8; 3]) -> u16 {
    (((response[1] & 0x03) as u16) << 8) | response[2] as u16
}
