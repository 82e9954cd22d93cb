use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ─── Raw request records ─────────────────────────────────────────

/// One captured exchange as stored by the collector. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: Uuid,
    pub project_id: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    #[serde(default)]
    pub response_status: Option<u16>,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_body: Option<String>,
}

/// Ingestion payload. Also the wire format the instrumentation side posts.
///
/// Required fields are optional here so that a missing one becomes a
/// field-level [`ValidationError`] instead of an opaque decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequestRecord {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Milliseconds. Signed so that negative input can be reported, not just refused.
    #[serde(default, rename = "responseTime")]
    pub response_time_ms: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::time::lenient_opt"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
}

impl NewRequestRecord {
    /// Validate and turn into a storable record with a fresh id.
    /// `now` stands in for a missing `createdAt`.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<RequestRecord, ValidationError> {
        let mut errors = ValidationError::default();

        let project_id = required(
            &mut errors,
            "projectId",
            "Project ID is required",
            self.project_id,
        );
        let method = required(&mut errors, "method", "Method is required", self.method);
        let path = required(&mut errors, "path", "Path is required", self.path);

        let response_time_ms = match self.response_time_ms {
            None => {
                errors.push("responseTime", "Response time is required");
                0
            }
            Some(ms) if ms < 0 => {
                errors.push("responseTime", "Response time must be >= 0");
                0
            }
            Some(ms) => ms as u64,
        };

        errors.into_result()?;

        Ok(RequestRecord {
            id: Uuid::new_v4(),
            project_id,
            method,
            path,
            query_string: self.query_string,
            response_status: self.response_status,
            response_time_ms,
            created_at: self.created_at.unwrap_or(now),
            request_headers: self.request_headers.unwrap_or_default(),
            request_body: self.request_body,
            response_body: self.response_body,
        })
    }
}

fn required(
    errors: &mut ValidationError,
    field: &str,
    message: &str,
    value: Option<String>,
) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            errors.push(field, message);
            String::new()
        }
    }
}

/// Compact row for the per-path list view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestListItem {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub response_status: Option<u16>,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&RequestRecord> for RequestListItem {
    fn from(r: &RequestRecord) -> Self {
        Self {
            id: r.id,
            method: r.method.clone(),
            path: r.path.clone(),
            response_status: r.response_status,
            response_time_ms: r.response_time_ms,
            created_at: r.created_at,
        }
    }
}

// ─── Health snapshots ────────────────────────────────────────────

/// Aggregation key: one instrumented application × one request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricsKey {
    pub project_id: String,
    pub endpoint: String,
}

impl MetricsKey {
    pub fn new(project_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Response-time percentiles (ms) for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

/// The single live snapshot for a `(project, endpoint)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointHealthMetrics {
    pub id: Uuid,
    pub project_id: String,
    pub endpoint: String,
    #[serde(rename = "avgResponseTime")]
    pub avg_response_time_ms: f64,
    #[serde(rename = "minResponseTime")]
    pub min_response_time_ms: u64,
    #[serde(rename = "maxResponseTime")]
    pub max_response_time_ms: u64,
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub health_score: u8,
    #[serde(default)]
    pub latency: LatencyPercentiles,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EndpointHealthMetrics {
    pub fn key(&self) -> MetricsKey {
        MetricsKey::new(&self.project_id, &self.endpoint)
    }
}

/// Compact row for the per-endpoint list view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetricsListItem {
    pub id: Uuid,
    pub endpoint: String,
    #[serde(rename = "avgResponseTime")]
    pub avg_response_time_ms: f64,
    pub total_requests: u64,
    pub success_rate: f64,
    pub health_score: u8,
    pub last_updated: DateTime<Utc>,
}

impl From<&EndpointHealthMetrics> for HealthMetricsListItem {
    fn from(m: &EndpointHealthMetrics) -> Self {
        Self {
            id: m.id,
            endpoint: m.endpoint.clone(),
            avg_response_time_ms: m.avg_response_time_ms,
            total_requests: m.total_requests,
            success_rate: m.success_rate,
            health_score: m.health_score,
            last_updated: m.last_updated,
        }
    }
}
