pub mod health_metrics;
pub mod requests;
pub mod stream;

use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};

use crate::error::{ServiceError, StoreError, ValidationError};

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Store(StoreError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(v) => Self::Validation(v),
            ServiceError::NotFound(msg) => Self::NotFound(msg),
            ServiceError::Store(e) => Self::Store(e),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rej: JsonRejection) -> Self {
        Self::BadRequest(rej.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rej: QueryRejection) -> Self {
        Self::BadRequest(rej.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rej: PathRejection) -> Self {
        Self::BadRequest(rej.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut fields: Option<BTreeMap<String, String>> = None;
        let (status, message) = match self {
            Self::Validation(v) => {
                fields = Some(v.fields);
                (StatusCode::BAD_REQUEST, "Validation failed".to_owned())
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Store(err) => {
                tracing::error!(error = %err, "store failure while serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable".to_owned())
            }
        };

        let mut body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });
        if let Some(fields) = fields {
            body["fields"] = serde_json::json!(fields);
        }

        (status, Json(body)).into_response()
    }
}

// ─── Shared query parsing ────────────────────────────────────────

/// Parse an optional `startDate` / `endDate` style parameter.
pub(crate) fn parse_date(
    errors: &mut ValidationError,
    field: &str,
    raw: Option<&str>,
) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = crate::time::parse_timestamp(raw);
    if parsed.is_none() {
        errors.push(field, format!("Invalid date-time: {raw}"));
    }
    parsed
}

pub(crate) fn default_page_size() -> i64 {
    crate::query::page::DEFAULT_PAGE_SIZE
}

pub(crate) fn default_direction() -> String {
    "DESC".into()
}

pub(crate) fn require_project(errors: &mut ValidationError, project_id: &str) {
    if project_id.trim().is_empty() {
        errors.push("projectId", "Project ID is required");
    }
}

/// Fold the field errors of several parse results into one report.
pub(crate) fn merge<'a>(
    errors: &mut ValidationError,
    parts: impl IntoIterator<Item = Option<&'a ValidationError>>,
) {
    for part in parts.into_iter().flatten() {
        errors.fields.extend(part.fields.clone());
    }
}
