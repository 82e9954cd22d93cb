use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Collector process ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Command line / environment of the collector binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "apiwatch-collector",
    about = "Ingests captured exchanges and serves endpoint health"
)]
pub struct CollectorConfig {
    /// Address to listen on
    #[arg(long, env = "APIWATCH_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Redis URL; records are kept in memory when omitted
    #[arg(long, env = "APIWATCH_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Key namespace inside Redis
    #[arg(long, env = "APIWATCH_REDIS_PREFIX", default_value = "apiwatch")]
    pub redis_prefix: String,

    /// Shared secret expected in the X-API-Key header
    #[arg(long, env = "APIWATCH_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Upper bound on any single store call
    #[arg(long, env = "APIWATCH_STORE_TIMEOUT_MS", default_value_t = 5_000)]
    pub store_timeout_ms: u64,

    /// Tick of the SSE metrics feed
    #[arg(long, env = "APIWATCH_STREAM_INTERVAL_MS", default_value_t = 2_000)]
    pub stream_interval_ms: u64,

    #[arg(long, env = "APIWATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Rebuild every snapshot from stored records before serving
    #[arg(long, env = "APIWATCH_RECALCULATE_ON_START")]
    pub recalculate_on_start: bool,
}

impl CollectorConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms.max(100))
    }
}

// ─── Instrumented process ────────────────────────────────────────

/// How captured exchanges reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Bounded queue drained by a background worker.
    #[default]
    Background,
    /// Awaited on the request task before the response is returned, for
    /// bodies bounded within the response budget.
    Inline,
}

/// Instrumentation settings, usually loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sent as `X-API-Key` to the collector
    #[serde(default)]
    pub api_key: String,

    /// Groups every record of this application
    pub project_id: String,

    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub mode: DeliveryMode,

    #[serde(default = "default_body_budget")]
    pub max_request_body_bytes: usize,

    #[serde(default = "default_body_budget")]
    pub max_response_body_bytes: usize,

    /// Path prefixes never captured (health checks, docs, the collector itself)
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8080/api".into()
}
fn default_true() -> bool {
    true
}
fn default_body_budget() -> usize {
    10_000
}
fn default_excluded_prefixes() -> Vec<String> {
    ["/actuator", "/health", "/swagger", "/v3/api-docs", "/api-docs", "/monitoring"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_worker_concurrency() -> usize {
    8
}
fn default_delivery_timeout_ms() -> u64 {
    5_000
}

impl MonitorConfig {
    /// Defaults for everything but the project.
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            api_key: String::new(),
            project_id: project_id.into(),
            backend_url: default_backend_url(),
            enabled: true,
            mode: DeliveryMode::default(),
            max_request_body_bytes: default_body_budget(),
            max_response_body_bytes: default_body_budget(),
            excluded_prefixes: default_excluded_prefixes(),
            queue_capacity: default_queue_capacity(),
            worker_concurrency: default_worker_concurrency(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path: PathBuf = path.as_ref().into();
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Invalid("project_id must not be blank".into()));
        }
        if self.max_request_body_bytes == 0 || self.max_response_body_bytes == 0 {
            return Err(ConfigError::Invalid("body budgets must be at least 1 byte".into()));
        }
        if self.queue_capacity == 0 || self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity and worker_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Whether `path` falls under an excluded prefix.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_fills_defaults() {
        let config = MonitorConfig::from_yaml("project_id: shop\napi_key: s3cret\n").unwrap();
        assert_eq!(config.backend_url, "http://localhost:8080/api");
        assert!(config.enabled);
        assert_eq!(config.mode, DeliveryMode::Background);
        assert_eq!(config.max_request_body_bytes, 10_000);
        assert_eq!(config.max_response_body_bytes, 10_000);
        assert_eq!(config.delivery_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn yaml_overrides_mode_and_budgets() {
        let raw = "project_id: shop\n\
                   mode: inline\n\
                   max_response_body_bytes: 64\n\
                   excluded_prefixes: [/internal]\n";
        let config = MonitorConfig::from_yaml(raw).unwrap();
        assert_eq!(config.mode, DeliveryMode::Inline);
        assert_eq!(config.max_response_body_bytes, 64);
        assert!(config.is_excluded("/internal/metrics"));
        assert!(!config.is_excluded("/health"));
    }

    #[test]
    fn blank_project_is_rejected() {
        assert!(matches!(
            MonitorConfig::from_yaml("project_id: '  '\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MonitorConfig::from_yaml("enabled: true\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn default_exclusions_cover_introspection_paths() {
        let config = MonitorConfig::for_project("shop");
        for path in ["/actuator/health", "/health", "/swagger-ui/index.html", "/v3/api-docs"] {
            assert!(config.is_excluded(path), "{path}");
        }
        assert!(!config.is_excluded("/api/users"));
    }

    #[test]
    fn collector_args_parse_with_defaults() {
        let config = CollectorConfig::parse_from(["apiwatch-collector", "--api-key", "k"]);
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert!(config.redis_url.is_none());
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Text);
    }
}
