use std::time::Duration;

use async_trait::async_trait;

use super::RecordSink;
use crate::config::MonitorConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::model::NewRequestRecord;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the collector's ingestion endpoint.
#[derive(Debug, Clone)]
pub struct CollectorClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl CollectorClient {
    pub fn new(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: ingest_url(&config.backend_url),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn ingest_url(backend_url: &str) -> String {
    format!("{}/requests", backend_url.trim_end_matches('/'))
}

#[async_trait]
impl RecordSink for CollectorClient {
    async fn send(&self, record: NewRequestRecord) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-API-Key", &self.api_key)
            .json(&record)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_url_joins_without_double_slash() {
        assert_eq!(ingest_url("http://collector:8080/api"), "http://collector:8080/api/requests");
        assert_eq!(ingest_url("http://collector:8080/api/"), "http://collector:8080/api/requests");
    }

    #[test]
    fn client_targets_configured_backend() {
        let mut config = MonitorConfig::for_project("shop");
        config.backend_url = "http://10.0.0.5:9000/api".into();
        let client = CollectorClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://10.0.0.5:9000/api/requests");
    }
}
