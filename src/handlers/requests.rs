use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{default_direction, default_page_size, merge, parse_date, require_project, AppError};
use crate::error::ValidationError;
use crate::model::{NewRequestRecord, RequestListItem, RequestRecord};
use crate::query::{Page, PageRequest, RecordFilter, RecordSortField, SortDirection};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuery {
    #[serde(default)]
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

impl SearchQuery {
    pub(crate) fn validate(&self) -> Result<PageRequest, ValidationError> {
        let mut errors = ValidationError::default();
        require_project(&mut errors, &self.project_id);
        let page = PageRequest::new(self.page, self.size);
        merge(&mut errors, [page.as_ref().err()]);
        errors.into_result()?;
        page
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTableQuery {
    #[serde(default)]
    pub project_id: String,
    pub method: Option<String>,
    pub response_status: Option<u16>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_record_sort")]
    pub sort_by: String,
    #[serde(default = "default_direction")]
    pub sort_direction: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_record_sort() -> String {
    "createdAt".into()
}

// ─── POST /api/requests ──────────────────────────────────────────

pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewRequestRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestRecord>), AppError> {
    let Json(payload) = payload?;
    let saved = state.ingest.create(payload).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

// ─── GET /api/requests/:id ───────────────────────────────────────

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RequestRecord>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.queries.record(id).await?))
}

// ─── GET /api/requests/list ──────────────────────────────────────

pub async fn list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<Vec<RequestListItem>>, AppError> {
    let Query(q) = query?;
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    errors.into_result()?;
    Ok(Json(state.queries.record_list(&q.project_id).await?))
}

// ─── GET /api/requests/table ─────────────────────────────────────

pub async fn table(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecordTableQuery>, QueryRejection>,
) -> Result<Json<Page<RequestRecord>>, AppError> {
    let Query(q) = query?;
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    let filter = RecordFilter {
        method: q.method.filter(|m| !m.is_empty()),
        response_status: q.response_status,
        start_date: parse_date(&mut errors, "startDate", q.start_date.as_deref()),
        end_date: parse_date(&mut errors, "endDate", q.end_date.as_deref()),
        search: q.search,
    };
    let sort_by = RecordSortField::parse(&q.sort_by);
    let page = PageRequest::new(q.page, q.size);
    merge(&mut errors, [sort_by.as_ref().err(), page.as_ref().err()]);
    errors.into_result()?;
    let (sort_by, page) = (sort_by?, page?);

    let result = state
        .queries
        .record_table(
            &q.project_id,
            &filter,
            sort_by,
            SortDirection::parse(&q.sort_direction),
            page,
        )
        .await?;
    Ok(Json(result))
}

// ─── GET /api/requests/search ────────────────────────────────────

pub async fn search(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Page<RequestRecord>>, AppError> {
    let Query(q) = query?;
    let page = q.validate()?;
    Ok(Json(state.queries.record_search(&q.project_id, &q.search, page).await?))
}

// ─── GET /api/requests/count ─────────────────────────────────────

pub async fn count(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<u64>, AppError> {
    let Query(q) = query?;
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    errors.into_result()?;
    Ok(Json(state.queries.record_count(&q.project_id).await?))
}
