use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::RecordStore;
use crate::error::StoreError;
use crate::model::{EndpointHealthMetrics, MetricsKey, RequestRecord};

/// Keys per MGET round-trip.
const BATCH: usize = 500;

/// The project id is length-prefixed so that ids and paths containing `:`
/// cannot collide.
fn path_records_key(prefix: &str, project_id: &str, path: &str) -> String {
    format!("{prefix}:path:{}:{project_id}:{path}", project_id.len())
}

/// Redis-backed store.
///
/// Layout (all keys under `prefix`):
///
///   record:{id}                     STRING  JSON record
///   records:{project}               ZSET    record ids, scored by createdAt (ms)
///   paths:{project}                 SET     distinct paths with records
///   path:{len}:{project}:{path}     SET     record ids for one endpoint,
///                                           len = byte length of project
///   projects                        SET     every project seen
///   metrics:{project}               HASH    endpoint → JSON snapshot
///   metrics-ids                     HASH    snapshot id → JSON [project, endpoint]
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Creates a single `ConnectionManager` that auto-reconnects on failure.
    ///
    /// Every clone of the `ConnectionManager` shares the same
    /// underlying multiplexed TCP connection.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(conn, prefix))
    }

    pub fn from_connection(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    // ── Key helpers ─────────────────────────────────────────────

    fn record_key(&self, id: Uuid) -> String {
        format!("{}:record:{id}", self.prefix)
    }
    fn project_records_key(&self, project_id: &str) -> String {
        format!("{}:records:{project_id}", self.prefix)
    }
    fn paths_key(&self, project_id: &str) -> String {
        format!("{}:paths:{project_id}", self.prefix)
    }
    fn path_records_key(&self, project_id: &str, path: &str) -> String {
        path_records_key(&self.prefix, project_id, path)
    }
    fn projects_key(&self) -> String {
        format!("{}:projects", self.prefix)
    }
    fn metrics_key(&self, project_id: &str) -> String {
        format!("{}:metrics:{project_id}", self.prefix)
    }
    fn metrics_ids_key(&self) -> String {
        format!("{}:metrics-ids", self.prefix)
    }

    /// Load records by id, skipping ids whose value has vanished.
    async fn load_records(&self, ids: Vec<String>) -> Result<Vec<RequestRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let mut records = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(BATCH) {
            let keys: Vec<String> = chunk
                .iter()
                .map(|id| format!("{}:record:{id}", self.prefix))
                .collect();
            let values: Vec<Option<String>> =
                redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
            for raw in values.into_iter().flatten() {
                records.push(decode(&raw)?);
            }
        }
        Ok(records)
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn save_record(&self, record: RequestRecord) -> Result<RequestRecord, StoreError> {
        let json = serde_json::to_string(&record)?;
        let score = record.created_at.timestamp_millis();
        let id = record.id.to_string();

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(self.record_key(record.id))
            .arg(&json)
            .ignore()
            .cmd("ZADD")
            .arg(self.project_records_key(&record.project_id))
            .arg(score)
            .arg(&id)
            .ignore()
            .cmd("SADD")
            .arg(self.path_records_key(&record.project_id, &record.path))
            .arg(&id)
            .ignore()
            .cmd("SADD")
            .arg(self.paths_key(&record.project_id))
            .arg(&record.path)
            .ignore()
            .cmd("SADD")
            .arg(self.projects_key())
            .arg(&record.project_id)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(record)
    }

    async fn record_by_id(&self, id: Uuid) -> Result<Option<RequestRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.record_key(id)).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn records_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrange(self.project_records_key(project_id), 0, -1)
            .await?;
        self.load_records(ids).await
    }

    async fn records_for_endpoint(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.path_records_key(project_id, path)).await?;
        self.load_records(ids).await
    }

    async fn count_records(&self, project_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(self.project_records_key(project_id)).await?)
    }

    async fn endpoint_keys(&self, project_id: Option<&str>) -> Result<Vec<MetricsKey>, StoreError> {
        let mut conn = self.conn.clone();
        let mut projects: Vec<String> = match project_id {
            Some(p) => vec![p.to_owned()],
            None => conn.smembers(self.projects_key()).await?,
        };
        projects.sort();

        let mut keys = Vec::new();
        for project in projects {
            let mut paths: Vec<String> = conn.smembers(self.paths_key(&project)).await?;
            paths.sort();
            keys.extend(paths.into_iter().map(|path| MetricsKey::new(&project, path)));
        }
        Ok(keys)
    }

    async fn upsert_metrics(&self, metrics: EndpointHealthMetrics) -> Result<(), StoreError> {
        let json = serde_json::to_string(&metrics)?;
        let index = serde_json::to_string(&(&metrics.project_id, &metrics.endpoint))?;

        let mut conn = self.conn.clone();
        let previous: Option<String> = conn
            .hget(self.metrics_key(&metrics.project_id), &metrics.endpoint)
            .await?;
        let stale_id = previous
            .as_deref()
            .map(decode::<EndpointHealthMetrics>)
            .transpose()?
            .map(|prev| prev.id)
            .filter(|id| *id != metrics.id);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(self.metrics_key(&metrics.project_id))
            .arg(&metrics.endpoint)
            .arg(&json)
            .ignore()
            .cmd("HSET")
            .arg(self.metrics_ids_key())
            .arg(metrics.id.to_string())
            .arg(&index)
            .ignore()
            .cmd("SADD")
            .arg(self.projects_key())
            .arg(&metrics.project_id)
            .ignore();
        if let Some(stale) = stale_id {
            pipe.cmd("HDEL")
                .arg(self.metrics_ids_key())
                .arg(stale.to_string())
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn metrics_by_id(&self, id: Uuid) -> Result<Option<EndpointHealthMetrics>, StoreError> {
        let mut conn = self.conn.clone();
        let index: Option<String> = conn.hget(self.metrics_ids_key(), id.to_string()).await?;
        let Some(index) = index else {
            return Ok(None);
        };
        let (project_id, endpoint): (String, String) = decode(&index)?;
        self.metrics_for_endpoint(&project_id, &endpoint).await
    }

    async fn metrics_for_endpoint(
        &self,
        project_id: &str,
        endpoint: &str,
    ) -> Result<Option<EndpointHealthMetrics>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.metrics_key(project_id), endpoint).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn metrics_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<EndpointHealthMetrics>, StoreError> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.hvals(self.metrics_key(project_id)).await?;
        values.iter().map(|raw| decode(raw)).collect()
    }

    async fn count_metrics(&self, project_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.hlen(self.metrics_key(project_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::path_records_key;

    #[test]
    fn endpoint_keys_do_not_collide_across_separators() {
        let left = path_records_key("apiwatch", "a:b", "c");
        let right = path_records_key("apiwatch", "a", "b:c");
        assert_ne!(left, right);
        assert_eq!(left, "apiwatch:path:3:a:b:c");
        assert_eq!(right, "apiwatch:path:1:a:b:c");
    }
}
