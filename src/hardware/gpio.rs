use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;
use rppal::gpio::{Gpio, InputPin, Trigger};

use super::EdgeSource;

#[derive(Default)]
struct GpioState {
    gpio: Option<Gpio>,
    users: usize,
    pins: HashMap<u8, InputPin>,
}

/// Shared handle to the GPIO edge subsystem. Clones refer to the same
/// subsystem, which stays open until every `open` has been matched by a
/// `close`.
#[derive(Clone, Default)]
pub struct GpioEdges {
    state: Arc<Mutex<GpioState>>,
}

impl GpioEdges {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GpioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EdgeSource for GpioEdges {
    fn open(&mut self) -> Result<(), anyhow::Error> {
        let mut state = self.state();
        if state.gpio.is_none() {
            state.gpio = Some(Gpio::new().context("Failed to initialize GPIO")?);
        }
        state.users += 1;

        Ok(())
    }

    fn watch(
        &mut self,
        pin: u8,
        mut on_rising_edge: Box<dyn FnMut() + Send + 'static>,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.state();
        let mut input = state
            .gpio
            .as_ref()
            .context("GPIO is not open")?
            .get(pin)
            .with_context(|| format!("Failed to acquire GPIO pin {pin}"))?
            .into_input_pullup();

        input
            .set_async_interrupt(Trigger::RisingEdge, None, move |_| on_rising_edge())
            .with_context(|| format!("Failed to watch GPIO pin {pin}"))?;
        state.pins.insert(pin, input);

        Ok(())
    }

    fn unwatch(&mut self, pin: u8) -> Result<(), anyhow::Error> {
        let Some(mut input) = self.state().pins.remove(&pin) else {
            return Ok(());
        };

        input
            .clear_async_interrupt()
            .with_context(|| format!("Failed to unwatch GPIO pin {pin}"))
    }

    fn close(&mut self) {
        let mut state = self.state();
        if state.users == 0 {
            log::debug!("GPIO already closed");
            return;
        }

        state.users -= 1;
        if state.users == 0 {
            state.pins.clear();
            state.gpio = None;
        }
    }
}
