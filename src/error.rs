use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Backend failure while reading or writing the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt stored value: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Field-level rejection of caller input. Keys are the wire field names.
#[derive(Debug, Clone, Default, Error, PartialEq, Eq)]
#[error("validation failed: {fields:?}")]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields.insert(field.to_owned(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was pushed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Errors surfaced by the ingestion and query services to their caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a captured record did not reach the collector. Never leaves the dispatcher.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("collector rejected record with status {0}")]
    Rejected(u16),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("ingestion failed: {0}")]
    Ingest(#[from] ServiceError),
}

/// Recompute failure for a single `(project, endpoint)` key.
#[derive(Debug, Error)]
#[error("recompute of {project_id} {endpoint} failed: {source}")]
pub struct AggregationError {
    pub project_id: String,
    pub endpoint: String,
    #[source]
    pub source: StoreError,
}

/// Rejected monitor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("cannot build collector client: {0}")]
    Client(#[from] reqwest::Error),
}
