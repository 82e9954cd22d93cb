//! Per-endpoint health snapshots, always recomputed from the full record set.

pub mod locks;
pub mod percentiles;
pub mod score;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use self::locks::KeyedLocks;
use crate::error::AggregationError;
use crate::model::{EndpointHealthMetrics, MetricsKey};
use crate::store::{with_timeout, RecordStore};

/// Outcome of a bulk recalculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecalculationReport {
    pub endpoints: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct Aggregator {
    store: Arc<dyn RecordStore>,
    locks: KeyedLocks,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            timeout,
        }
    }

    /// Rebuild the snapshot for one key.
    ///
    /// Read-compute-write runs under the key's lock, so two recomputes of the
    /// same key never interleave. Returns `None` (and writes nothing) when the
    /// key has no records.
    pub async fn recompute(
        &self,
        project_id: &str,
        endpoint: &str,
    ) -> Result<Option<EndpointHealthMetrics>, AggregationError> {
        let key = MetricsKey::new(project_id, endpoint);
        let _guard = self.locks.lock(&key).await;

        let wrap = |source| AggregationError {
            project_id: project_id.to_owned(),
            endpoint: endpoint.to_owned(),
            source,
        };

        let records = with_timeout(
            self.timeout,
            self.store.records_for_endpoint(project_id, endpoint),
        )
        .await
        .map_err(wrap)?;

        if records.is_empty() {
            tracing::debug!(project_id, endpoint, "no requests recorded, snapshot left untouched");
            return Ok(None);
        }

        let previous = with_timeout(
            self.timeout,
            self.store.metrics_for_endpoint(project_id, endpoint),
        )
        .await
        .map_err(wrap)?;

        let Some(snapshot) =
            score::compute_snapshot(&key, &records, previous.map(|m| m.id), Utc::now())
        else {
            return Ok(None);
        };

        with_timeout(self.timeout, self.store.upsert_metrics(snapshot.clone()))
            .await
            .map_err(wrap)?;

        tracing::debug!(
            project_id,
            endpoint,
            total = snapshot.total_requests,
            health_score = snapshot.health_score,
            "metrics updated"
        );
        Ok(Some(snapshot))
    }

    /// Recompute every known endpoint of one project.
    pub async fn recalculate_project(&self, project_id: &str) -> RecalculationReport {
        tracing::info!(project_id, "recalculating all metrics");
        let report = self.recalculate(Some(project_id)).await;
        tracing::info!(
            project_id,
            endpoints = report.endpoints,
            failed = report.failed,
            "recalculation complete"
        );
        report
    }

    /// Recompute every known endpoint of every project.
    pub async fn recalculate_all(&self) -> RecalculationReport {
        let report = self.recalculate(None).await;
        tracing::info!(
            endpoints = report.endpoints,
            failed = report.failed,
            "recalculation of all projects complete"
        );
        report
    }

    async fn recalculate(&self, project_id: Option<&str>) -> RecalculationReport {
        let keys = match with_timeout(self.timeout, self.store.endpoint_keys(project_id)).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::error!(?project_id, "cannot enumerate endpoints: {err}");
                return RecalculationReport {
                    failed: 1,
                    ..Default::default()
                };
            }
        };

        let mut report = RecalculationReport {
            endpoints: keys.len(),
            ..Default::default()
        };

        // Each key stands alone; one failure never stops the rest
        for key in keys {
            match self.recompute(&key.project_id, &key.endpoint).await {
                Ok(Some(_)) => report.updated += 1,
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::error!("{err}");
                }
            }
        }
        report
    }
}
