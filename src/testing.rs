//! Fakes for the hardware, store, provider and transport seams.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::DateTime;

use crate::{
    db::{ObservationStore, PublishRange},
    error::{DeliveryError, SensorError, StoreError},
    hardware::{AnalogInput, ChipDriver, ChipSample, ChipSampler, EdgeSource},
    observation::{
        AtmosphericReading, Observation, RainReading, StoredObservation, WindReading,
    },
    provider::SensorProvider,
    publisher::{BatchRequest, Transport},
};

pub fn observation_at(timestamp: i64) -> Observation {
    Observation {
        timestamp: DateTime::from_timestamp(timestamp, 0).unwrap(),
        atmospheric: AtmosphericReading {
            temperature: 20.0 + (timestamp % 7) as f64,
            humidity: 55.5,
            pressure: 1012.0,
        },
        wind: WindReading {
            speed: 8.5,
            direction: 135.0,
            gust: 13.0,
        },
        rain: RainReading { rainfall: 0.2794 },
        interval_seconds: 30,
        published: false,
    }
}

fn storage_failure() -> StoreError {
    StoreError::Database(rusqlite::Error::QueryReturnedNoRows)
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<StoredObservation>,
    marks: Vec<PublishRange>,
    next_id: i64,
    fail_writes: bool,
    fail_reads: bool,
    fail_marks: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<StoredObservation> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn marks(&self) -> Vec<PublishRange> {
        self.state.lock().unwrap().marks.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn fail_marks(&self, fail: bool) {
        self.state.lock().unwrap().fail_marks = fail;
    }
}

impl ObservationStore for MemoryStore {
    fn write(&self, observation: &Observation) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(storage_failure());
        }
        state.next_id += 1;
        let id = state.next_id;
        state.rows.push(StoredObservation {
            id,
            observation: observation.clone(),
        });
        Ok(())
    }

    fn read_unpublished(&self) -> Result<Vec<StoredObservation>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(storage_failure());
        }
        let mut rows: Vec<_> = state
            .rows
            .iter()
            .filter(|row| !row.observation.published)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.observation.timestamp, row.id));
        Ok(rows)
    }

    fn mark_published(&self, range: &PublishRange) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.marks.push(*range);
        if state.fail_marks {
            return Err(storage_failure());
        }
        let max_id = range.max_row_id.unwrap_or(i64::MAX);
        for row in state.rows.iter_mut() {
            let ts = row.observation.timestamp.timestamp();
            if (range.min_timestamp..=range.max_timestamp).contains(&ts) && row.id <= max_id {
                row.observation.published = true;
            }
        }
        Ok(())
    }
}

struct ProviderState<R> {
    reading: Option<R>,
    disconnects: usize,
}

/// Provider returning a fixed reading, or failing every read.
pub struct FakeProvider<R> {
    state: Arc<Mutex<ProviderState<R>>>,
}

impl<R> Clone for FakeProvider<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Clone + Default + Send> FakeProvider<R> {
    pub fn ok(reading: R) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                reading: Some(reading),
                disconnects: 0,
            })),
        }
    }

    pub fn failing() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                reading: None,
                disconnects: 0,
            })),
        }
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }
}

impl<R: Clone + Default + Send> SensorProvider for FakeProvider<R> {
    type Reading = R;

    fn connect(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state.lock().unwrap().disconnects += 1;
    }

    fn readings(&mut self) -> Result<R, SensorError> {
        self.state
            .lock()
            .unwrap()
            .reading
            .clone()
            .ok_or_else(|| SensorError::read("fake", anyhow::anyhow!("sensor offline")))
    }
}

#[derive(Default)]
struct ChipState {
    sample: ChipSample,
    open_chips: usize,
    fail_open: bool,
    fail_reads: bool,
}

#[derive(Clone)]
pub struct FakeChipDriver {
    state: Arc<Mutex<ChipState>>,
}

impl FakeChipDriver {
    pub fn new(sample: ChipSample) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState {
                sample,
                ..ChipState::default()
            })),
        }
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn open_chips(&self) -> usize {
        self.state.lock().unwrap().open_chips
    }
}

struct FakeChip {
    state: Arc<Mutex<ChipState>>,
}

impl Drop for FakeChip {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_chips -= 1;
    }
}

impl ChipSampler for FakeChip {
    fn read_sample(&mut self) -> Result<ChipSample, anyhow::Error> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            anyhow::bail!("i2c read failed");
        }
        Ok(state.sample)
    }
}

impl ChipDriver for FakeChipDriver {
    fn open(&mut self) -> Result<Box<dyn ChipSampler>, anyhow::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            anyhow::bail!("no device at address");
        }
        state.open_chips += 1;
        Ok(Box::new(FakeChip {
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Default)]
struct AdcState {
    value: u16,
    fail: bool,
}

#[derive(Clone)]
pub struct FakeAdc {
    state: Arc<Mutex<AdcState>>,
}

impl FakeAdc {
    pub fn new(value: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdcState { value, fail: false })),
        }
    }

    pub fn set(&self, value: u16) {
        self.state.lock().unwrap().value = value;
    }

    pub fn fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }
}

impl AnalogInput for FakeAdc {
    fn read_channel(&mut self, _channel: u8) -> Result<u16, anyhow::Error> {
        let state = self.state.lock().unwrap();
        if state.fail {
            anyhow::bail!("spi transfer failed");
        }
        Ok(state.value)
    }

    fn full_scale(&self) -> u16 {
        1023
    }
}

type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

#[derive(Default)]
struct EdgeState {
    users: usize,
    callbacks: HashMap<u8, EdgeCallback>,
    fail_watch: bool,
}

/// Edge subsystem whose edges are fired by the test.
#[derive(Clone, Default)]
pub struct FakeEdges {
    state: Arc<Mutex<EdgeState>>,
}

impl FakeEdges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self, pin: u8, edges: usize) {
        let mut state = self.state.lock().unwrap();
        let callback = state
            .callbacks
            .get_mut(&pin)
            .expect("no callback registered for pin");
        for _ in 0..edges {
            callback();
        }
    }

    pub fn fail_watch(&self, fail: bool) {
        self.state.lock().unwrap().fail_watch = fail;
    }

    pub fn users(&self) -> usize {
        self.state.lock().unwrap().users
    }

    pub fn is_watched(&self, pin: u8) -> bool {
        self.state.lock().unwrap().callbacks.contains_key(&pin)
    }
}

impl EdgeSource for FakeEdges {
    fn open(&mut self) -> Result<(), anyhow::Error> {
        self.state.lock().unwrap().users += 1;
        Ok(())
    }

    fn watch(&mut self, pin: u8, on_rising_edge: EdgeCallback) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_watch {
            anyhow::bail!("pin {pin} busy");
        }
        state.callbacks.insert(pin, on_rising_edge);
        Ok(())
    }

    fn unwatch(&mut self, pin: u8) -> Result<(), anyhow::Error> {
        self.state.lock().unwrap().callbacks.remove(&pin);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.users = state.users.saturating_sub(1);
    }
}

#[derive(Clone)]
pub struct RecordingTransport {
    status: Option<u16>,
    requests: Arc<Mutex<Vec<BatchRequest>>>,
}

impl RecordingTransport {
    pub fn responding(status: u16) -> Self {
        Self {
            status: Some(status),
            requests: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            status: None,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &BatchRequest) -> Result<u16, DeliveryError> {
        self.requests.lock().unwrap().push(request.clone());
        self.status
            .ok_or_else(|| DeliveryError::Transport("connection refused".to_string()))
    }
}
