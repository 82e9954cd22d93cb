pub mod client;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedExchange;
use crate::config::MonitorConfig;
use crate::error::DeliveryError;
use crate::model::NewRequestRecord;

pub use self::client::CollectorClient;

/// Destination of captured records: the collector over HTTP, or an
/// in-process ingest service.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn send(&self, record: NewRequestRecord) -> Result<(), DeliveryError>;
}

/// Build the ingest payload for one exchange, stamped with its capture time.
pub fn to_record(project_id: &str, exchange: CapturedExchange) -> NewRequestRecord {
    NewRequestRecord {
        project_id: Some(project_id.to_owned()),
        method: Some(exchange.method),
        path: Some(exchange.path),
        query_string: exchange.query,
        response_status: exchange.response_status,
        response_body: exchange.response_body,
        response_time_ms: Some(i64::try_from(exchange.elapsed_ms).unwrap_or(i64::MAX)),
        created_at: Some(exchange.captured_at),
        request_headers: Some(exchange.request_headers),
        request_body: exchange.request_body,
    }
}

/// Performs one delivery; failures end here.
struct Courier {
    project_id: String,
    sink: Arc<dyn RecordSink>,
    timeout: Duration,
}

impl Courier {
    async fn deliver(&self, exchange: CapturedExchange) {
        let method = exchange.method.clone();
        let path = exchange.path.clone();
        let record = to_record(&self.project_id, exchange);

        let project_id = &self.project_id;
        match tokio::time::timeout(self.timeout, self.sink.send(record)).await {
            Ok(Ok(())) => {
                tracing::debug!(%project_id, %method, %path, "exchange delivered");
            }
            Ok(Err(err)) => {
                tracing::error!(%project_id, %method, %path, error = %err, "dropping exchange");
            }
            Err(_) => {
                let err = DeliveryError::Timeout(self.timeout);
                tracing::warn!(%project_id, %method, %path, error = %err, "dropping exchange");
            }
        }
    }
}

/// Hands captured exchanges to a [`RecordSink`] without ever failing the caller.
#[derive(Clone)]
pub struct Dispatcher {
    courier: Arc<Courier>,
    queue: Option<mpsc::Sender<CapturedExchange>>,
}

impl Dispatcher {
    /// Dispatcher whose deliveries are awaited by the caller.
    pub fn inline(config: &MonitorConfig, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            courier: Arc::new(Courier {
                project_id: config.project_id.clone(),
                sink,
                timeout: config.delivery_timeout(),
            }),
            queue: None,
        }
    }

    /// Dispatcher backed by a bounded queue and a worker task that runs until
    /// `shutdown` fires or every sender is gone.
    pub fn spawn(
        config: &MonitorConfig,
        sink: Arc<dyn RecordSink>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let mut dispatcher = Self::inline(config, sink);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        dispatcher.queue = Some(tx);

        let courier = dispatcher.courier.clone();
        let concurrency = config.worker_concurrency.max(1);
        let handle = tokio::spawn(async move {
            let drain = ReceiverStream::new(rx).for_each_concurrent(concurrency, |exchange| {
                let courier = courier.clone();
                async move { courier.deliver(exchange).await }
            });
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher stopped, in-flight exchanges dropped");
                }
                _ = drain => {
                    tracing::debug!("dispatcher queue closed");
                }
            }
        });

        (dispatcher, handle)
    }

    pub fn is_inline(&self) -> bool {
        self.queue.is_none()
    }

    /// Hand an exchange over without waiting. Background dispatchers queue it
    /// and drop it when the queue is full or closed. Inline dispatchers
    /// deliver it on a detached task of the current runtime.
    pub fn submit(&self, exchange: CapturedExchange) {
        let Some(tx) = &self.queue else {
            self.detach(exchange);
            return;
        };
        if let Err(err) = tx.try_send(exchange) {
            let (reason, exchange) = match err {
                mpsc::error::TrySendError::Full(e) => ("queue full", e),
                mpsc::error::TrySendError::Closed(e) => ("dispatcher stopped", e),
            };
            self.dropped(&exchange, reason);
        }
    }

    /// Runs from body completion hooks, which may fire outside a runtime.
    fn detach(&self, exchange: CapturedExchange) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let courier = self.courier.clone();
                runtime.spawn(async move { courier.deliver(exchange).await });
            }
            Err(_) => self.dropped(&exchange, "no runtime"),
        }
    }

    fn dropped(&self, exchange: &CapturedExchange, reason: &str) {
        tracing::warn!(
            project_id = %self.courier.project_id,
            method = %exchange.method,
            path = %exchange.path,
            reason,
            "dropping exchange"
        );
    }

    /// Deliver now and wait for the outcome, which is only logged.
    pub async fn deliver(&self, exchange: CapturedExchange) {
        self.courier.deliver(exchange).await;
    }
}
