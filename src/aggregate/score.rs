use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::percentiles;
use crate::model::{EndpointHealthMetrics, MetricsKey, RequestRecord};

/// Latency component of the health score, on a 0–100 scale.
pub fn response_time_score(avg_response_time_ms: f64) -> f64 {
    match avg_response_time_ms {
        ms if ms < 100.0 => 100.0,
        ms if ms < 300.0 => 90.0,
        ms if ms < 500.0 => 70.0,
        ms if ms < 1000.0 => 50.0,
        ms if ms < 2000.0 => 30.0,
        _ => 10.0,
    }
}

/// Equal-weight blend of success rate and latency score, rounded half up.
pub fn health_score(avg_response_time_ms: f64, success_rate: f64) -> u8 {
    let blended = 0.5 * success_rate + 0.5 * response_time_score(avg_response_time_ms);
    (blended + 0.5).floor().clamp(0.0, 100.0) as u8
}

fn is_success(status: Option<u16>) -> bool {
    matches!(status, Some(200..=299))
}

fn is_error(status: Option<u16>) -> bool {
    matches!(status, Some(s) if s >= 400)
}

/// Pure snapshot over the full record set of one key.
///
/// `None` when there are no records. `id` is carried over from the previous
/// snapshot when there is one.
pub fn compute_snapshot(
    key: &MetricsKey,
    records: &[RequestRecord],
    id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Option<EndpointHealthMetrics> {
    let first_seen = records.iter().map(|r| r.created_at).min()?;

    let total_requests = records.len() as u64;
    let mut sum: u128 = 0;
    let mut min = u64::MAX;
    let mut max = 0u64;
    let mut success_count = 0u64;
    let mut error_count = 0u64;

    for r in records {
        sum += u128::from(r.response_time_ms);
        min = min.min(r.response_time_ms);
        max = max.max(r.response_time_ms);
        if is_success(r.response_status) {
            success_count += 1;
        } else if is_error(r.response_status) {
            error_count += 1;
        }
    }

    let avg = (sum as f64 / total_requests as f64).clamp(min as f64, max as f64);
    let success_rate = success_count as f64 * 100.0 / total_requests as f64;

    Some(EndpointHealthMetrics {
        id: id.unwrap_or_else(Uuid::new_v4),
        project_id: key.project_id.clone(),
        endpoint: key.endpoint.clone(),
        avg_response_time_ms: avg,
        min_response_time_ms: min,
        max_response_time_ms: max,
        total_requests,
        success_count,
        error_count,
        success_rate,
        health_score: health_score(avg, success_rate),
        latency: percentiles::from_response_times(records.iter().map(|r| r.response_time_ms)),
        first_seen,
        last_updated: now,
    })
}
