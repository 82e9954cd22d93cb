use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::handlers::AppError;
use crate::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

const GUARDED_PREFIXES: &[&str] = &["/api/requests", "/api/health-metrics"];
const EXEMPT_PREFIXES: &[&str] = &["/swagger", "/api-docs", "/health"];

fn is_guarded(path: &str) -> bool {
    !EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
        && GUARDED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Shared-secret gate in front of the collector API.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !is_guarded(path) {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let rejection = match presented {
        None => {
            tracing::warn!(path, "request without API key");
            Some(AppError::Unauthorized("API key is required".into()))
        }
        Some(key) if key != state.api_key => {
            let shown: String = key.chars().take(8).collect();
            tracing::warn!(path, key_prefix = %shown, "request with invalid API key");
            Some(AppError::Forbidden("Invalid API key".into()))
        }
        Some(_) => None,
    };

    match rejection {
        Some(err) => err.into_response(),
        None => next.run(req).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_collector_api_is_guarded() {
        assert!(is_guarded("/api/requests"));
        assert!(is_guarded("/api/requests/table"));
        assert!(is_guarded("/api/health-metrics/stream"));
        assert!(!is_guarded("/health"));
        assert!(!is_guarded("/api-docs/openapi.json"));
        assert!(!is_guarded("/swagger-ui/index.html"));
        assert!(!is_guarded("/other"));
    }
}
