use std::{
    f64::consts::PI,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Context;

/// Rising edges emitted by the anemometer reed switch per full rotation.
pub const EDGES_PER_ROTATION: f64 = 2.0;

pub const DEFAULT_ANEMOMETER_RADIUS_CM: f64 = 9.0;
pub const DEFAULT_ANEMOMETER_FACTOR: f64 = 1.18;
pub const DEFAULT_TIP_DEPTH_MM: f64 = 0.2794;

const CM_PER_KM: f64 = 100_000.0;
const SECS_PER_HOUR: f64 = 3600.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Edge counter written from the interrupt callback and drained once per window.
#[derive(Debug, Default)]
pub struct PulseCounter {
    pulses: Mutex<u64>,
}

impl PulseCounter {
    pub fn on_edge(&self) {
        *lock(&self.pulses) += 1;
    }

    fn take(&self) -> u64 {
        std::mem::take(&mut *lock(&self.pulses))
    }
}

/// Folds per-window pulse counts into a value that is drained by the reader.
pub trait WindowAggregate: Send + 'static {
    type Output;

    fn fold(&mut self, pulses: u64, window: Duration);

    /// Returns the aggregate and resets it to empty.
    fn drain(&mut self) -> Self::Output;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anemometer {
    pub radius_cm: f64,
    pub calibration_factor: f64,
}

impl Default for Anemometer {
    fn default() -> Self {
        Self {
            radius_cm: DEFAULT_ANEMOMETER_RADIUS_CM,
            calibration_factor: DEFAULT_ANEMOMETER_FACTOR,
        }
    }
}

impl Anemometer {
    pub fn speed_kmh(&self, pulses: u64, window: Duration) -> f64 {
        let secs = window.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }

        let rotations = pulses as f64 / EDGES_PER_ROTATION;
        let distance_km = 2.0 * PI * self.radius_cm * rotations / CM_PER_KM;
        distance_km / secs * SECS_PER_HOUR * self.calibration_factor
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindSpeed {
    pub speed: f64,
    pub gust: f64,
}

#[derive(Debug)]
pub struct WindAggregate {
    anemometer: Anemometer,
    total_speed: f64,
    samples: u32,
    gust: f64,
}

impl WindAggregate {
    pub fn new(anemometer: Anemometer) -> Self {
        Self {
            anemometer,
            total_speed: 0.0,
            samples: 0,
            gust: 0.0,
        }
    }
}

impl WindowAggregate for WindAggregate {
    type Output = WindSpeed;

    fn fold(&mut self, pulses: u64, window: Duration) {
        let speed = self.anemometer.speed_kmh(pulses, window);
        self.total_speed += speed;
        self.samples += 1;
        self.gust = self.gust.max(speed);
    }

    fn drain(&mut self) -> WindSpeed {
        let speed = if self.samples > 0 {
            self.total_speed / f64::from(self.samples)
        } else {
            0.0
        };
        let reading = WindSpeed {
            speed,
            gust: self.gust,
        };

        self.total_speed = 0.0;
        self.samples = 0;
        self.gust = 0.0;

        reading
    }
}

#[derive(Debug)]
pub struct RainAggregate {
    tip_depth_mm: f64,
    rainfall: f64,
}

impl RainAggregate {
    pub fn new(tip_depth_mm: f64) -> Self {
        Self {
            tip_depth_mm,
            rainfall: 0.0,
        }
    }
}

impl WindowAggregate for RainAggregate {
    type Output = f64;

    fn fold(&mut self, pulses: u64, _window: Duration) {
        self.rainfall += pulses as f64 * self.tip_depth_mm;
    }

    fn drain(&mut self) -> f64 {
        std::mem::take(&mut self.rainfall)
    }
}

#[derive(Debug)]
struct WindowLoop {
    halt: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Counts edges over fixed windows on a background thread and folds each
/// window into an aggregate that is drained by [`readings`](Self::readings).
///
/// The pulse counter and the aggregate are guarded separately and never
/// locked together: the counter is reset every window, the aggregate only
/// when it is read.
#[derive(Debug)]
pub struct PulseWindowAccumulator<A: WindowAggregate> {
    name: &'static str,
    window: Duration,
    counter: Arc<PulseCounter>,
    aggregate: Arc<Mutex<A>>,
    running: Option<WindowLoop>,
}

impl<A: WindowAggregate> PulseWindowAccumulator<A> {
    pub fn new(name: &'static str, window: Duration, aggregate: A) -> Self {
        Self {
            name,
            window,
            counter: Arc::new(PulseCounter::default()),
            aggregate: Arc::new(Mutex::new(aggregate)),
            running: None,
        }
    }

    /// Handle for the edge callback.
    pub fn counter(&self) -> Arc<PulseCounter> {
        Arc::clone(&self.counter)
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn start(&mut self) -> Result<(), anyhow::Error> {
        if self.running.is_some() {
            return Ok(());
        }

        // Pulses and windows left over from a previous run are discarded.
        self.counter.take();
        lock(&self.aggregate).drain();

        let (halt, halted) = mpsc::channel();
        let counter = Arc::clone(&self.counter);
        let aggregate = Arc::clone(&self.aggregate);
        let window = self.window;

        let handle = thread::Builder::new()
            .name(format!("{}-window", self.name))
            .spawn(move || {
                loop {
                    match halted.recv_timeout(window) {
                        Err(RecvTimeoutError::Timeout) => roll(&counter, &aggregate, window),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .with_context(|| format!("Failed to spawn {} window thread", self.name))?;

        self.running = Some(WindowLoop { halt, handle });
        Ok(())
    }

    /// Closes the current window immediately.
    #[cfg(test)]
    pub fn roll_window(&self) {
        roll(&self.counter, &self.aggregate, self.window);
    }

    pub fn readings(&self) -> A::Output {
        lock(&self.aggregate).drain()
    }

    /// Requests the window loop to halt and waits until it has exited.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // The loop may already have exited; join either way.
        let _ = running.halt.send(());
        if running.handle.join().is_err() {
            log::error!("{} window thread panicked", self.name);
        }
    }
}

impl<A: WindowAggregate> Drop for PulseWindowAccumulator<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn roll<A: WindowAggregate>(counter: &PulseCounter, aggregate: &Mutex<A>, window: Duration) {
    let pulses = counter.take();
    lock(aggregate).fold(pulses, window);
}
