use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::aggregate::Aggregator;
use crate::dispatch::RecordSink;
use crate::error::{DeliveryError, ServiceError};
use crate::model::{NewRequestRecord, RequestRecord};
use crate::store::{with_timeout, RecordStore};

/// Write side of the collector: validate, persist, recompute the endpoint.
pub struct IngestService {
    store: Arc<dyn RecordStore>,
    aggregator: Arc<Aggregator>,
    timeout: Duration,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        aggregator: Arc<Aggregator>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            aggregator,
            timeout,
        }
    }

    /// Store one record and refresh its endpoint snapshot.
    ///
    /// A failed recompute is logged; the record stays stored and the
    /// call still succeeds.
    pub async fn create(&self, new: NewRequestRecord) -> Result<RequestRecord, ServiceError> {
        let record = new.into_record(Utc::now())?;
        let saved = with_timeout(self.timeout, self.store.save_record(record)).await?;

        tracing::debug!(
            project_id = %saved.project_id,
            method = %saved.method,
            path = %saved.path,
            id = %saved.id,
            "request record stored"
        );

        if let Err(err) = self.aggregator.recompute(&saved.project_id, &saved.path).await {
            tracing::error!(error = %err, "metrics recompute failed after ingest");
        }
        Ok(saved)
    }
}

#[async_trait]
impl RecordSink for IngestService {
    async fn send(&self, record: NewRequestRecord) -> Result<(), DeliveryError> {
        self.create(record).await?;
        Ok(())
    }
}
