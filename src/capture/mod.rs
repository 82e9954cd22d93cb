pub mod body;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{OriginalUri, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use http_body::Body as HttpBody;
use http_body_util::{BodyExt, StreamBody};
use parking_lot::Mutex;

use self::body::{CaptureBuffer, TeeBody};
use crate::monitor::Monitor;

/// Everything observed about one request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedExchange {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub request_headers: HashMap<String, String>,
    pub request_body: Option<String>,
    /// `None` when the handler never produced a response.
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    /// Wall time from interception until the response body finished.
    pub elapsed_ms: u64,
    /// When the request was intercepted.
    pub captured_at: DateTime<Utc>,
}

/// Request-side observations, completed once the response is known.
struct PendingExchange {
    method: String,
    path: String,
    query: Option<String>,
    request_headers: HashMap<String, String>,
    request_body: Arc<Mutex<CaptureBuffer>>,
    started: Instant,
    captured_at: DateTime<Utc>,
}

impl PendingExchange {
    fn finish(
        self,
        response_status: Option<u16>,
        response_body: Option<String>,
    ) -> CapturedExchange {
        let request_body = self.request_body.lock().render();
        CapturedExchange {
            method: self.method,
            path: self.path,
            query: self.query,
            request_headers: self.request_headers,
            request_body,
            response_status,
            response_body,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            captured_at: self.captured_at,
        }
    }
}

/// Lowercase header names to values; the first value of a repeated name wins.
pub fn capture_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        out.entry(name.as_str().to_owned())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

/// Middleware recording every exchange that passes through it.
///
/// Install with `axum::middleware::from_fn_with_state(monitor, capture_exchange)`.
/// The client receives exactly the bytes the inner service produced.
pub async fn capture_exchange(
    State(monitor): State<Arc<Monitor>>,
    req: Request,
    next: Next,
) -> Response {
    let path = match req.extensions().get::<OriginalUri>() {
        Some(OriginalUri(uri)) => uri.path().to_owned(),
        None => req.uri().path().to_owned(),
    };
    if !monitor.captures(&path) {
        return next.run(req).await;
    }

    let started = Instant::now();
    let captured_at = Utc::now();
    let config = monitor.config();
    let method = req.method().to_string();
    let query = req.uri().query().map(str::to_owned);
    let request_headers = capture_headers(req.headers());
    let request_body = CaptureBuffer::shared(config.max_request_body_bytes);

    let tee = request_body.clone();
    let req = req.map(move |body| Body::new(TeeBody::new(body, tee)));

    let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;
    let pending = PendingExchange {
        method,
        path,
        query,
        request_headers,
        request_body,
        started,
        captured_at,
    };

    let response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let exchange = pending.finish(None, None);
            if monitor.dispatcher().is_inline() {
                monitor.dispatcher().deliver(exchange).await;
            } else {
                monitor.dispatcher().submit(exchange);
            }
            std::panic::resume_unwind(panic);
        }
    };

    if monitor.dispatcher().is_inline() && fits_budget(&response, config.max_response_body_bytes) {
        capture_buffered(&monitor, pending, response).await
    } else {
        capture_streaming(&monitor, pending, response)
    }
}

/// Whether the body is known to end within `budget` bytes.
fn fits_budget(response: &Response, budget: usize) -> bool {
    response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| usize::try_from(upper).is_ok_and(|upper| upper <= budget))
}

/// Tee the response body and hand the exchange over once the body finishes.
fn capture_streaming(
    monitor: &Monitor,
    pending: PendingExchange,
    response: Response,
) -> Response {
    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    let capture = CaptureBuffer::shared(monitor.config().max_response_body_bytes);
    let dispatcher = monitor.dispatcher().clone();

    let rendered = capture.clone();
    let body = TeeBody::new(body, capture).on_complete(move || {
        let response_body = rendered.lock().render();
        dispatcher.submit(pending.finish(Some(status), response_body));
    });
    Response::from_parts(parts, Body::new(body))
}

/// Buffer a bounded response, deliver, then replay the same frames to the client.
async fn capture_buffered(
    monitor: &Monitor,
    pending: PendingExchange,
    response: Response,
) -> Response {
    let status = response.status().as_u16();
    let (parts, mut body) = response.into_parts();
    let mut capture = CaptureBuffer::new(monitor.config().max_response_body_bytes);
    let mut frames = Vec::new();
    let mut failure = None;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    capture.observe(data);
                }
                frames.push(frame);
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    monitor
        .dispatcher()
        .deliver(pending.finish(Some(status), capture.render()))
        .await;

    let replay = frames
        .into_iter()
        .map(Ok::<_, axum::Error>)
        .chain(failure.map(Err));
    Response::from_parts(parts, Body::new(StreamBody::new(futures::stream::iter(replay))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeliveryMode, MonitorConfig};
    use crate::dispatch::RecordSink;
    use crate::error::DeliveryError;
    use crate::model::NewRequestRecord;
    use async_trait::async_trait;
    use axum::http::{HeaderValue, StatusCode};
    use axum::{middleware, routing::get, Router};
    use bytes::Bytes;
    use futures::Stream;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Recording(Mutex<Vec<NewRequestRecord>>);

    #[async_trait]
    impl RecordSink for Recording {
        async fn send(&self, record: NewRequestRecord) -> Result<(), DeliveryError> {
            self.0.lock().push(record);
            Ok(())
        }
    }

    /// `limit` chunks of `tick {n}\n`, one every `every`; `None` never ends.
    fn ticks(
        every: Duration,
        limit: Option<u32>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        futures::stream::unfold(0u32, move |n| async move {
            if limit.is_some_and(|limit| n >= limit) {
                return None;
            }
            tokio::time::sleep(every).await;
            Some((Ok(Bytes::from(format!("tick {n}\n"))), n + 1))
        })
    }

    fn inline_app(sink: Arc<Recording>) -> Router {
        async fn boom() {
            panic!("handler exploded")
        }
        let mut config = MonitorConfig::for_project("shop");
        config.mode = DeliveryMode::Inline;
        let (monitor, _) = Monitor::with_sink(config, sink, CancellationToken::new()).unwrap();
        Router::new()
            .route("/boom", get(boom))
            .route("/teapot", get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }))
            .route(
                "/feed",
                get(|| async { Body::from_stream(ticks(Duration::from_millis(10), None)) }),
            )
            .route(
                "/slow",
                get(|| async { Body::from_stream(ticks(Duration::from_millis(50), Some(3))) }),
            )
            .layer(middleware::from_fn_with_state(monitor, capture_exchange))
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn wait_for(sink: &Recording, n: usize) {
        for _ in 0..200 {
            if sink.0.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} delivered records");
    }

    #[test]
    fn first_header_value_wins() {
        let mut headers = HeaderMap::new();
        headers.append("x-trace", HeaderValue::from_static("one"));
        headers.append("x-trace", HeaderValue::from_static("two"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let captured = capture_headers(&headers);
        assert_eq!(captured["x-trace"], "one");
        assert_eq!(captured["accept"], "application/json");
    }

    #[tokio::test]
    async fn inline_capture_records_status_and_body() {
        let sink = Arc::new(Recording::default());
        let before = Utc::now();
        let resp = inline_app(sink.clone()).oneshot(get_req("/teapot?x=1")).await.unwrap();
        let after = Utc::now();

        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"short and stout");

        let records = sink.0.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response_status, Some(418));
        assert_eq!(records[0].query_string.as_deref(), Some("x=1"));
        assert_eq!(records[0].response_body.as_deref(), Some("short and stout"));
        assert!(records[0].response_time_ms.is_some_and(|ms| ms >= 0));
        let created_at = records[0].created_at.unwrap();
        assert!(before <= created_at && created_at <= after);
    }

    #[tokio::test]
    async fn inline_unbounded_body_streams_to_client() {
        let sink = Arc::new(Recording::default());
        let resp = tokio::time::timeout(
            Duration::from_secs(2),
            inline_app(sink.clone()).oneshot(get_req("/feed")),
        )
        .await
        .expect("response head without waiting for the body")
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut body = resp.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.data_ref().map(|d| &d[..]), Some(&b"tick 0\n"[..]));
        assert!(sink.0.lock().is_empty());

        drop(body);
        wait_for(&sink, 1).await;
        let records = sink.0.lock();
        assert_eq!(records[0].path.as_deref(), Some("/feed"));
        assert_eq!(records[0].response_status, Some(200));
        assert!(records[0]
            .response_body
            .as_deref()
            .is_some_and(|b| b.starts_with("tick 0\n")));
    }

    #[tokio::test]
    async fn elapsed_time_includes_body_production() {
        let sink = Arc::new(Recording::default());
        let resp = inline_app(sink.clone()).oneshot(get_req("/slow")).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"tick 0\ntick 1\ntick 2\n");

        wait_for(&sink, 1).await;
        let records = sink.0.lock();
        assert_eq!(records[0].response_body.as_deref(), Some("tick 0\ntick 1\ntick 2\n"));
        assert!(records[0].response_time_ms.is_some_and(|ms| ms >= 150));
    }

    #[tokio::test]
    async fn panicking_handler_is_recorded_without_status() {
        let sink = Arc::new(Recording::default());
        let outcome = AssertUnwindSafe(inline_app(sink.clone()).oneshot(get_req("/boom")))
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        let records = sink.0.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path.as_deref(), Some("/boom"));
        assert_eq!(records[0].response_status, None);
    }
}
