//! apiwatch: per-endpoint health monitoring for HTTP services.
//!
//! Instrumentation side: [`monitor::Monitor`] + [`capture::capture_exchange`]
//! record each exchange and ship it to a collector.
//! Collector side: [`server::create_router`] over an [`AppState`].

use std::sync::Arc;
use std::time::Duration;

pub mod aggregate;
pub mod auth;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod model;
pub mod monitor;
pub mod query;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod time;

use aggregate::Aggregator;
use ingest::IngestService;
use query::QueryService;
use store::RecordStore;

/// Shared collector state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Write side: validation, persistence, triggered recompute.
    pub ingest: Arc<IngestService>,

    /// Metrics engine; recomputes snapshots per `(project, endpoint)`.
    pub aggregator: Arc<Aggregator>,

    /// Read side for both records and snapshots.
    pub queries: QueryService,

    /// Pre-shared secret expected in `X-API-Key`.
    pub api_key: String,

    /// Tick of the SSE metrics feed.
    pub stream_interval: Duration,
}

impl AppState {
    /// Wire the services around one store.
    pub fn new(
        store: Arc<dyn RecordStore>,
        api_key: impl Into<String>,
        store_timeout: Duration,
        stream_interval: Duration,
    ) -> Self {
        let aggregator = Arc::new(Aggregator::new(store.clone(), store_timeout));
        let ingest = Arc::new(IngestService::new(
            store.clone(),
            aggregator.clone(),
            store_timeout,
        ));
        Self {
            ingest,
            aggregator,
            queries: QueryService::new(store, store_timeout),
            api_key: api_key.into(),
            stream_interval,
        }
    }
}
