//! Read side: lookups, latest-per-key lists, filtered tables and search.

pub mod filter;
pub mod page;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::ServiceError;
use crate::model::{EndpointHealthMetrics, HealthMetricsListItem, RequestListItem, RequestRecord};
use crate::store::{with_timeout, RecordStore};

pub use self::filter::{MetricsFilter, MetricsSortField, RecordFilter, RecordSortField};
pub use self::page::{Page, PageRequest, SortDirection};

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

/// Keep, per key, the item that sorts greatest under `newer`.
fn latest_per<T, K, F, C>(items: Vec<T>, key: F, newer: C) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
    C: Fn(&T, &T) -> std::cmp::Ordering,
{
    let mut latest: HashMap<K, T> = HashMap::new();
    for item in items {
        match latest.get(&key(&item)) {
            Some(current) if newer(current, &item).is_ge() => {}
            _ => {
                latest.insert(key(&item), item);
            }
        }
    }
    let mut out: Vec<T> = latest.into_values().collect();
    out.sort_by(|a, b| newer(b, a));
    out
}

fn record_recency(a: &RequestRecord, b: &RequestRecord) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

fn metrics_recency(a: &EndpointHealthMetrics, b: &EndpointHealthMetrics) -> std::cmp::Ordering {
    a.last_updated.cmp(&b.last_updated).then(a.id.cmp(&b.id))
}

impl QueryService {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    // ── Request records ─────────────────────────────────────────

    pub async fn record(&self, id: Uuid) -> Result<RequestRecord, ServiceError> {
        with_timeout(self.timeout, self.store.record_by_id(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("API Request not found with id: {id}")))
    }

    async fn project_records(&self, project_id: &str) -> Result<Vec<RequestRecord>, ServiceError> {
        Ok(with_timeout(self.timeout, self.store.records_for_project(project_id)).await?)
    }

    /// One entry per distinct path: its most recent record, newest first.
    pub async fn record_list(
        &self,
        project_id: &str,
    ) -> Result<Vec<RequestListItem>, ServiceError> {
        let records = self.project_records(project_id).await?;
        Ok(latest_per(records, |r| r.path.clone(), record_recency)
            .iter()
            .map(RequestListItem::from)
            .collect())
    }

    pub async fn record_table(
        &self,
        project_id: &str,
        filter: &RecordFilter,
        sort_by: RecordSortField,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<Page<RequestRecord>, ServiceError> {
        let predicate = filter.resolve();
        let mut rows: Vec<RequestRecord> = self
            .project_records(project_id)
            .await?
            .into_iter()
            .filter(|r| predicate.matches(r))
            .collect();
        rows.sort_by(|a, b| direction.apply(sort_by.compare(a, b)).then(a.id.cmp(&b.id)));
        Ok(Page::slice(rows, page))
    }

    /// Substring match on path, newest first regardless of any sort input.
    pub async fn record_search(
        &self,
        project_id: &str,
        search: &str,
        page: PageRequest,
    ) -> Result<Page<RequestRecord>, ServiceError> {
        let mut rows: Vec<RequestRecord> = self
            .project_records(project_id)
            .await?
            .into_iter()
            .filter(|r| r.path.contains(search))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(Page::slice(rows, page))
    }

    pub async fn record_count(&self, project_id: &str) -> Result<u64, ServiceError> {
        Ok(with_timeout(self.timeout, self.store.count_records(project_id)).await?)
    }

    // ── Health snapshots ────────────────────────────────────────

    pub async fn metrics(&self, id: Uuid) -> Result<EndpointHealthMetrics, ServiceError> {
        with_timeout(self.timeout, self.store.metrics_by_id(id))
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Health metrics not found with id: {id}"))
            })
    }

    pub async fn metrics_for_endpoint(
        &self,
        project_id: &str,
        endpoint: &str,
    ) -> Result<EndpointHealthMetrics, ServiceError> {
        with_timeout(self.timeout, self.store.metrics_for_endpoint(project_id, endpoint))
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Health metrics not found for project: {project_id} and endpoint: {endpoint}"
                ))
            })
    }

    async fn project_metrics(
        &self,
        project_id: &str,
    ) -> Result<Vec<EndpointHealthMetrics>, ServiceError> {
        Ok(with_timeout(self.timeout, self.store.metrics_for_project(project_id)).await?)
    }

    /// Latest snapshot per endpoint, most recently updated first.
    pub async fn metrics_list(
        &self,
        project_id: &str,
    ) -> Result<Vec<HealthMetricsListItem>, ServiceError> {
        let snapshots = self.project_metrics(project_id).await?;
        Ok(latest_per(snapshots, |m| m.key(), metrics_recency)
            .iter()
            .map(HealthMetricsListItem::from)
            .collect())
    }

    pub async fn metrics_table(
        &self,
        project_id: &str,
        filter: &MetricsFilter,
        sort_by: MetricsSortField,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<Page<EndpointHealthMetrics>, ServiceError> {
        let predicate = filter.resolve();
        let mut rows: Vec<EndpointHealthMetrics> = self
            .project_metrics(project_id)
            .await?
            .into_iter()
            .filter(|m| predicate.matches(m))
            .collect();
        rows.sort_by(|a, b| direction.apply(sort_by.compare(a, b)).then(a.id.cmp(&b.id)));
        Ok(Page::slice(rows, page))
    }

    pub async fn metrics_search(
        &self,
        project_id: &str,
        search: &str,
        page: PageRequest,
    ) -> Result<Page<EndpointHealthMetrics>, ServiceError> {
        let mut rows: Vec<EndpointHealthMetrics> = self
            .project_metrics(project_id)
            .await?
            .into_iter()
            .filter(|m| m.endpoint.contains(search))
            .collect();
        rows.sort_by(|a, b| b.last_updated.cmp(&a.last_updated).then(a.id.cmp(&b.id)));
        Ok(Page::slice(rows, page))
    }

    pub async fn metrics_count(&self, project_id: &str) -> Result<u64, ServiceError> {
        Ok(with_timeout(self.timeout, self.store.count_metrics(project_id)).await?)
    }
}
