use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to connect {sensor} sensor: {cause:#}")]
    Connect {
        sensor: &'static str,
        cause: anyhow::Error,
    },

    #[error("Failed to read {sensor} sensor: {cause:#}")]
    Read {
        sensor: &'static str,
        cause: anyhow::Error,
    },

    #[error("{0} sensor is not connected")]
    NotConnected(&'static str),
}

impl SensorError {
    pub fn connect(sensor: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        Self::Connect {
            sensor,
            cause: cause.into(),
        }
    }

    pub fn read(sensor: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        Self::Read {
            sensor,
            cause: cause.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to serialize observations: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid request method {0:?}")]
    InvalidMethod(String),

    #[error("Failed to send request: {0}")]
    Transport(String),

    #[error("Unexpected status code {0}")]
    UnexpectedStatus(u16),

    #[error(transparent)]
    Store(#[from] StoreError),
}
