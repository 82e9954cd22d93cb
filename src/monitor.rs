use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DeliveryMode, MonitorConfig};
use crate::dispatch::{CollectorClient, Dispatcher, RecordSink};
use crate::error::ConfigError;

/// Instrumentation handle: the state of the [`capture_exchange`] middleware.
///
/// ```ignore
/// let (monitor, _worker) = Monitor::connect(config, shutdown.clone())?;
/// let app = Router::new()
///     .route("/api/orders", post(create_order))
///     .layer(middleware::from_fn_with_state(monitor, capture_exchange));
/// ```
///
/// [`capture_exchange`]: crate::capture::capture_exchange
pub struct Monitor {
    config: MonitorConfig,
    dispatcher: Dispatcher,
}

impl Monitor {
    /// Ship captured exchanges to the collector at `config.backend_url`.
    ///
    /// Returns the background worker handle when running in background mode.
    pub fn connect(
        config: MonitorConfig,
        shutdown: CancellationToken,
    ) -> Result<(Arc<Self>, Option<JoinHandle<()>>), ConfigError> {
        config.validate()?;
        let client = CollectorClient::new(&config)?;
        tracing::info!(
            project_id = %config.project_id,
            collector = client.endpoint(),
            mode = ?config.mode,
            enabled = config.enabled,
            "monitoring configured"
        );
        Self::with_sink(config, Arc::new(client), shutdown)
    }

    /// Ship captured exchanges to any sink.
    pub fn with_sink(
        config: MonitorConfig,
        sink: Arc<dyn RecordSink>,
        shutdown: CancellationToken,
    ) -> Result<(Arc<Self>, Option<JoinHandle<()>>), ConfigError> {
        config.validate()?;
        let (dispatcher, worker) = match config.mode {
            DeliveryMode::Background => {
                let (dispatcher, handle) = Dispatcher::spawn(&config, sink, shutdown);
                (dispatcher, Some(handle))
            }
            DeliveryMode::Inline => (Dispatcher::inline(&config, sink), None),
        };
        Ok((Arc::new(Self { config, dispatcher }), worker))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Whether an exchange on `path` should be captured.
    pub fn captures(&self, path: &str) -> bool {
        self.config.enabled && !self.config.is_excluded(path)
    }
}
