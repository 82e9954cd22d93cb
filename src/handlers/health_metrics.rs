use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::requests::{ProjectQuery, SearchQuery};
use super::{default_direction, default_page_size, merge, parse_date, require_project, AppError};
use crate::error::ValidationError;
use crate::model::{EndpointHealthMetrics, HealthMetricsListItem};
use crate::query::{MetricsFilter, MetricsSortField, Page, PageRequest, SortDirection};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointQuery {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsTableQuery {
    #[serde(default)]
    pub project_id: String,
    pub min_health_score: Option<i64>,
    pub max_health_score: Option<i64>,
    pub min_success_rate: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_metrics_sort")]
    pub sort_by: String,
    #[serde(default = "default_direction")]
    pub sort_direction: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_metrics_sort() -> String {
    "lastUpdated".into()
}

fn project_only(q: &ProjectQuery) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    errors.into_result()
}

// ─── GET /api/health-metrics/:id ─────────────────────────────────

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EndpointHealthMetrics>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.queries.metrics(id).await?))
}

// ─── GET /api/health-metrics/endpoint ────────────────────────────

pub async fn by_endpoint(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EndpointQuery>, QueryRejection>,
) -> Result<Json<EndpointHealthMetrics>, AppError> {
    let Query(q) = query?;
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    if q.endpoint.is_empty() {
        errors.push("endpoint", "Endpoint is required");
    }
    errors.into_result()?;
    Ok(Json(state.queries.metrics_for_endpoint(&q.project_id, &q.endpoint).await?))
}

// ─── GET /api/health-metrics/list ────────────────────────────────

pub async fn list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<Vec<HealthMetricsListItem>>, AppError> {
    let Query(q) = query?;
    project_only(&q)?;
    Ok(Json(state.queries.metrics_list(&q.project_id).await?))
}

// ─── GET /api/health-metrics/table ───────────────────────────────

pub async fn table(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MetricsTableQuery>, QueryRejection>,
) -> Result<Json<Page<EndpointHealthMetrics>>, AppError> {
    let Query(q) = query?;
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    let filter = MetricsFilter {
        min_health_score: q.min_health_score,
        max_health_score: q.max_health_score,
        min_success_rate: q.min_success_rate,
        start_date: parse_date(&mut errors, "startDate", q.start_date.as_deref()),
        end_date: parse_date(&mut errors, "endDate", q.end_date.as_deref()),
        search: q.search,
    };
    let sort_by = MetricsSortField::parse(&q.sort_by);
    let page = PageRequest::new(q.page, q.size);
    merge(&mut errors, [sort_by.as_ref().err(), page.as_ref().err()]);
    errors.into_result()?;
    let (sort_by, page) = (sort_by?, page?);

    let result = state
        .queries
        .metrics_table(
            &q.project_id,
            &filter,
            sort_by,
            SortDirection::parse(&q.sort_direction),
            page,
        )
        .await?;
    Ok(Json(result))
}

// ─── GET /api/health-metrics/search ──────────────────────────────

pub async fn search(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Page<EndpointHealthMetrics>>, AppError> {
    let Query(q) = query?;
    let page = q.validate()?;
    Ok(Json(state.queries.metrics_search(&q.project_id, &q.search, page).await?))
}

// ─── GET /api/health-metrics/count ───────────────────────────────

pub async fn count(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<u64>, AppError> {
    let Query(q) = query?;
    project_only(&q)?;
    Ok(Json(state.queries.metrics_count(&q.project_id).await?))
}

// ─── POST /api/health-metrics/recalculate ────────────────────────

pub async fn recalculate(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Query(q) = query?;
    project_only(&q)?;

    let aggregator = state.aggregator.clone();
    let project_id = q.project_id.clone();
    tokio::spawn(async move {
        aggregator.recalculate_project(&project_id).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Recalculation started",
            "projectId": q.project_id,
        })),
    ))
}
