//! Storage seam for raw records and health snapshots.
//!
//! Query shaping (filters, sorting, paging) lives in [`crate::query`]; stores
//! only answer the primitive fetches below.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{EndpointHealthMetrics, MetricsKey, RequestRecord};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record. Records are never updated afterwards.
    async fn save_record(&self, record: RequestRecord) -> Result<RequestRecord, StoreError>;

    async fn record_by_id(&self, id: Uuid) -> Result<Option<RequestRecord>, StoreError>;

    /// Every record of a project, in no particular order.
    async fn records_for_project(&self, project_id: &str)
        -> Result<Vec<RequestRecord>, StoreError>;

    /// Every record sharing `(project_id, path)`.
    async fn records_for_endpoint(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<Vec<RequestRecord>, StoreError>;

    async fn count_records(&self, project_id: &str) -> Result<u64, StoreError>;

    /// Distinct keys with at least one record; all projects when `None`.
    async fn endpoint_keys(&self, project_id: Option<&str>) -> Result<Vec<MetricsKey>, StoreError>;

    /// Replace the snapshot for `metrics.key()` wholesale.
    async fn upsert_metrics(&self, metrics: EndpointHealthMetrics) -> Result<(), StoreError>;

    async fn metrics_by_id(&self, id: Uuid) -> Result<Option<EndpointHealthMetrics>, StoreError>;

    async fn metrics_for_endpoint(
        &self,
        project_id: &str,
        endpoint: &str,
    ) -> Result<Option<EndpointHealthMetrics>, StoreError>;

    async fn metrics_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<EndpointHealthMetrics>, StoreError>;

    async fn count_metrics(&self, project_id: &str) -> Result<u64, StoreError>;
}

/// Bound a store call; elapsing counts as a store failure.
pub async fn with_timeout<T, F>(timeout: std::time::Duration, fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}
