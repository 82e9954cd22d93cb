use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::IntervalStream;

use super::requests::ProjectQuery;
use super::{require_project, AppError};
use crate::error::ValidationError;
use crate::AppState;

// ─── GET /api/health-metrics/stream ──────────────────────────────
/// Server-Sent Events feed of the metrics list view for one project,
/// one `metrics` event per tick. A failed read emits an `error` event and
/// the feed carries on.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Query(q) = query?;
    let mut errors = ValidationError::default();
    require_project(&mut errors, &q.project_id);
    errors.into_result()?;

    let interval = tokio::time::interval(state.stream_interval);
    let project_id = q.project_id;

    let stream = IntervalStream::new(interval).then(move |_| {
        let state = state.clone();
        let project_id = project_id.clone();
        async move {
            let event = match state.queries.metrics_list(&project_id).await {
                Ok(list) => Event::default()
                    .event("metrics")
                    .data(serde_json::to_string(&list).unwrap_or_default()),
                Err(err) => {
                    tracing::warn!(%project_id, error = %err, "metrics stream read failed");
                    Event::default().event("error").data(err.to_string())
                }
            };
            Ok::<_, Infallible>(event)
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
