use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    db::{ObservationStore, PublishRange},
    error::DeliveryError,
    observation::Observation,
    worker::{self, Worker},
};

pub const CONTENT_TYPE: &str = "application/json";
pub const STATUS_CREATED: u16 = 201;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for observation batches. Always reached over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_method() -> String {
    "PUT".to_string()
}

fn default_path() -> String {
    "observations".to_string()
}

impl EndpointConfig {
    pub fn url(&self) -> Result<Url, DeliveryError> {
        let base = Url::parse(&format!("https://{}/", self.host))?;
        Ok(base.join(self.path.trim_start_matches('/'))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub method: String,
    pub url: Url,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Sends a request and reports the response status. Statuses are returned
/// as `Ok`; only failures to obtain a response are errors.
pub trait Transport: Send + Sync {
    fn send(&self, request: &BatchRequest) -> Result<u16, DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(&format!("weather-station/{}", env!("CARGO_PKG_VERSION")))
            .build();

        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &BatchRequest) -> Result<u16, DeliveryError> {
        let response = self
            .agent
            .request_url(&request.method, &request.url)
            .set("Content-Type", request.content_type)
            .send_bytes(&request.body);

        match response {
            Ok(resp) => Ok(resp.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    NothingToPublish,
    Published(usize),
}

/// Sends every unpublished observation as one batch and marks the batch
/// published once the collector has acknowledged it.
pub struct Publisher {
    store: Arc<dyn ObservationStore>,
    endpoint: EndpointConfig,
    transport: Box<dyn Transport>,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ObservationStore>,
        endpoint: EndpointConfig,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            store,
            endpoint,
            transport,
        }
    }

    fn request(&self, batch: &[&Observation]) -> Result<BatchRequest, DeliveryError> {
        let method = self.endpoint.method.trim().to_ascii_uppercase();
        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(DeliveryError::InvalidMethod(self.endpoint.method.clone()));
        }

        Ok(BatchRequest {
            method,
            url: self.endpoint.url()?,
            content_type: CONTENT_TYPE,
            body: serde_json::to_vec(batch)?,
        })
    }

    /// One publish cycle. Nothing is marked published unless the whole batch
    /// was acknowledged with 201 Created.
    pub fn try_process(&self) -> Result<PublishOutcome, DeliveryError> {
        let rows = self.store.read_unpublished()?;
        let Some(range) = PublishRange::for_batch(&rows) else {
            return Ok(PublishOutcome::NothingToPublish);
        };

        let batch: Vec<&Observation> = rows.iter().map(|row| &row.observation).collect();
        let request = self.request(&batch)?;

        let status = self.transport.send(&request)?;
        if status != STATUS_CREATED {
            return Err(DeliveryError::UnexpectedStatus(status));
        }

        // Downstream tolerates duplicates, so a failed mark only costs a resend.
        if let Err(e) = self.store.mark_published(&range) {
            log::error!("Failed to update published rows: {e}");
        }

        Ok(PublishOutcome::Published(rows.len()))
    }

    pub fn process(&self) {
        match self.try_process() {
            Ok(PublishOutcome::NothingToPublish) => {
                log::info!("No unpublished observations seen");
            }
            Ok(PublishOutcome::Published(count)) => {
                log::info!("Published {count} observations");
            }
            Err(e) => {
                log::error!("Publish cycle aborted: {e}");
            }
        }
    }

    pub fn run(self, interval: Duration) -> Worker<()> {
        let publisher = Arc::new(self);

        Worker::spawn("publisher", move |mut halt| async move {
            let mut ticker = worker::ticker("publisher", interval);

            loop {
                tokio::select! {
                    biased;
                    () = halt.requested() => break,
                    _ = ticker.tick() => {
                        let publisher = Arc::clone(&publisher);
                        if let Err(e) = tokio::task::spawn_blocking(move || publisher.process()).await {
                            log::error!("Publish cycle panicked: {e}");
                        }
                    }
                }
            }
        })
    }
}
