//! Table-view filters and sort keys.
//!
//! Filters are not combined: each filter struct resolves to the first
//! predicate, in a fixed priority order, whose inputs are all present.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::model::{EndpointHealthMetrics, RequestRecord};

fn within(ts: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start <= ts && ts <= end
}

fn non_empty(search: &Option<String>) -> Option<&str> {
    search.as_deref().filter(|s| !s.is_empty())
}

// ─── Request records ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub method: Option<String>,
    pub response_status: Option<u16>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordPredicate {
    MethodBetween {
        method: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Method(String),
    Status(u16),
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    PathContains(String),
    All,
}

impl RecordFilter {
    pub fn resolve(&self) -> RecordPredicate {
        match (&self.method, self.response_status, self.start_date, self.end_date) {
            (Some(method), _, Some(start), Some(end)) => RecordPredicate::MethodBetween {
                method: method.clone(),
                start,
                end,
            },
            (Some(method), ..) => RecordPredicate::Method(method.clone()),
            (None, Some(status), ..) => RecordPredicate::Status(status),
            (None, None, Some(start), Some(end)) => RecordPredicate::Between { start, end },
            _ => match non_empty(&self.search) {
                Some(search) => RecordPredicate::PathContains(search.to_owned()),
                None => RecordPredicate::All,
            },
        }
    }
}

impl RecordPredicate {
    pub fn matches(&self, r: &RequestRecord) -> bool {
        match self {
            Self::MethodBetween { method, start, end } => {
                r.method == *method && within(r.created_at, *start, *end)
            }
            Self::Method(method) => r.method == *method,
            Self::Status(status) => r.response_status == Some(*status),
            Self::Between { start, end } => within(r.created_at, *start, *end),
            Self::PathContains(search) => r.path.contains(search.as_str()),
            Self::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordSortField {
    #[default]
    CreatedAt,
    ResponseTime,
    ResponseStatus,
    Method,
    Path,
}

impl RecordSortField {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        Ok(match raw {
            "createdAt" => Self::CreatedAt,
            "responseTime" => Self::ResponseTime,
            "responseStatus" => Self::ResponseStatus,
            "method" => Self::Method,
            "path" => Self::Path,
            other => {
                return Err(ValidationError::single(
                    "sortBy",
                    format!("Unsupported sort field: {other}"),
                ))
            }
        })
    }

    pub fn compare(self, a: &RequestRecord, b: &RequestRecord) -> Ordering {
        match self {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::ResponseTime => a.response_time_ms.cmp(&b.response_time_ms),
            Self::ResponseStatus => a.response_status.cmp(&b.response_status),
            Self::Method => a.method.cmp(&b.method),
            Self::Path => a.path.cmp(&b.path),
        }
    }
}

// ─── Health snapshots ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsFilter {
    pub min_health_score: Option<i64>,
    pub max_health_score: Option<i64>,
    pub min_success_rate: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricsPredicate {
    HealthScoreBetween { min: i64, max: i64 },
    /// Endpoints failing to reach the given success rate.
    SuccessRateBelow(f64),
    UpdatedBetween {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    EndpointContains(String),
    All,
}

impl MetricsFilter {
    pub fn resolve(&self) -> MetricsPredicate {
        if let (Some(min), Some(max)) = (self.min_health_score, self.max_health_score) {
            return MetricsPredicate::HealthScoreBetween { min, max };
        }
        if let Some(rate) = self.min_success_rate {
            return MetricsPredicate::SuccessRateBelow(rate);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            return MetricsPredicate::UpdatedBetween { start, end };
        }
        match non_empty(&self.search) {
            Some(search) => MetricsPredicate::EndpointContains(search.to_owned()),
            None => MetricsPredicate::All,
        }
    }
}

impl MetricsPredicate {
    pub fn matches(&self, m: &EndpointHealthMetrics) -> bool {
        match self {
            Self::HealthScoreBetween { min, max } => {
                let score = i64::from(m.health_score);
                *min <= score && score <= *max
            }
            Self::SuccessRateBelow(rate) => m.success_rate < *rate,
            Self::UpdatedBetween { start, end } => within(m.last_updated, *start, *end),
            Self::EndpointContains(search) => m.endpoint.contains(search.as_str()),
            Self::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricsSortField {
    #[default]
    LastUpdated,
    HealthScore,
    AvgResponseTime,
    SuccessRate,
    TotalRequests,
    Endpoint,
    FirstSeen,
}

impl MetricsSortField {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        Ok(match raw {
            "lastUpdated" => Self::LastUpdated,
            "healthScore" => Self::HealthScore,
            "avgResponseTime" => Self::AvgResponseTime,
            "successRate" => Self::SuccessRate,
            "totalRequests" => Self::TotalRequests,
            "endpoint" => Self::Endpoint,
            "firstSeen" => Self::FirstSeen,
            other => {
                return Err(ValidationError::single(
                    "sortBy",
                    format!("Unsupported sort field: {other}"),
                ))
            }
        })
    }

    pub fn compare(self, a: &EndpointHealthMetrics, b: &EndpointHealthMetrics) -> Ordering {
        match self {
            Self::LastUpdated => a.last_updated.cmp(&b.last_updated),
            Self::HealthScore => a.health_score.cmp(&b.health_score),
            Self::AvgResponseTime => a.avg_response_time_ms.total_cmp(&b.avg_response_time_ms),
            Self::SuccessRate => a.success_rate.total_cmp(&b.success_rate),
            Self::TotalRequests => a.total_requests.cmp(&b.total_requests),
            Self::Endpoint => a.endpoint.cmp(&b.endpoint),
            Self::FirstSeen => a.first_seen.cmp(&b.first_seen),
        }
    }
}
