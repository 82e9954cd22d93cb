use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::RecordStore;
use crate::error::StoreError;
use crate::model::{EndpointHealthMetrics, MetricsKey, RequestRecord};

/// Process-local store. Owned by whoever builds it; nothing global.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, RequestRecord>,

    // Secondary indexes over `records`
    by_project: HashMap<String, Vec<Uuid>>,
    by_endpoint: HashMap<MetricsKey, Vec<Uuid>>,

    metrics: HashMap<MetricsKey, EndpointHealthMetrics>,
    metrics_ids: HashMap<Uuid, MetricsKey>,
}

impl Inner {
    fn collect(&self, ids: Option<&Vec<Uuid>>) -> Vec<RequestRecord> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save_record(&self, record: RequestRecord) -> Result<RequestRecord, StoreError> {
        let mut inner = self.inner.write();
        let key = MetricsKey::new(&record.project_id, &record.path);
        inner
            .by_project
            .entry(record.project_id.clone())
            .or_default()
            .push(record.id);
        inner.by_endpoint.entry(key).or_default().push(record.id);
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn record_by_id(&self, id: Uuid) -> Result<Option<RequestRecord>, StoreError> {
        Ok(self.inner.read().records.get(&id).cloned())
    }

    async fn records_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.collect(inner.by_project.get(project_id)))
    }

    async fn records_for_endpoint(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.collect(inner.by_endpoint.get(&MetricsKey::new(project_id, path))))
    }

    async fn count_records(&self, project_id: &str) -> Result<u64, StoreError> {
        let inner = self.inner.read();
        Ok(inner.by_project.get(project_id).map_or(0, |ids| ids.len() as u64))
    }

    async fn endpoint_keys(&self, project_id: Option<&str>) -> Result<Vec<MetricsKey>, StoreError> {
        let inner = self.inner.read();
        let keys: BTreeSet<MetricsKey> = inner
            .by_endpoint
            .keys()
            .filter(|key| project_id.map_or(true, |p| key.project_id == p))
            .cloned()
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn upsert_metrics(&self, metrics: EndpointHealthMetrics) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let key = metrics.key();
        if let Some(previous) = inner.metrics.insert(key.clone(), metrics.clone()) {
            if previous.id != metrics.id {
                inner.metrics_ids.remove(&previous.id);
            }
        }
        inner.metrics_ids.insert(metrics.id, key);
        Ok(())
    }

    async fn metrics_by_id(&self, id: Uuid) -> Result<Option<EndpointHealthMetrics>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .metrics_ids
            .get(&id)
            .and_then(|key| inner.metrics.get(key))
            .cloned())
    }

    async fn metrics_for_endpoint(
        &self,
        project_id: &str,
        endpoint: &str,
    ) -> Result<Option<EndpointHealthMetrics>, StoreError> {
        Ok(self
            .inner
            .read()
            .metrics
            .get(&MetricsKey::new(project_id, endpoint))
            .cloned())
    }

    async fn metrics_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<EndpointHealthMetrics>, StoreError> {
        Ok(self
            .inner
            .read()
            .metrics
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn count_metrics(&self, project_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .metrics
            .keys()
            .filter(|key| key.project_id == project_id)
            .count() as u64)
    }
}
