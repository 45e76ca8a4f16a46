//! HTTP Yield Provider
//!
//! Fetches the current APY from a JSON endpoint.
//! The value is read from a configurable field; dotted paths such as
//! `data.apy` walk nested objects.

use crate::domain::errors::ApyError;
use crate::domain::ports::YieldProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// HTTP provider configuration.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Full URL of the JSON document
    pub url: String,
    /// Field holding the APY (dotted path)
    pub field: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/apy".to_string(),
            field: "apy".to_string(),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Yield provider backed by a JSON-over-HTTP endpoint.
pub struct HttpYieldProvider {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpYieldProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ApyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApyError::Provider(format!("client error: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Extract the configured field from a JSON document.
    ///
    /// Accepts a JSON number or a numeric string.
    fn extract(body: &Value, field: &str) -> Result<f64, ApyError> {
        let mut current = body;
        for part in field.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| ApyError::Provider(format!("missing field '{}'", field)))?;
        }

        match current {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ApyError::Provider(format!("field '{}' is not a float", field))),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ApyError::Provider(format!("field '{}' is not numeric: {}", field, s))),
            other => Err(ApyError::Provider(format!(
                "field '{}' has unexpected type: {}",
                field, other
            ))),
        }
    }
}

#[async_trait]
impl YieldProvider for HttpYieldProvider {
    async fn fetch(&self) -> Result<f64, ApyError> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| ApyError::Provider(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApyError::Provider(format!(
                "unexpected status: {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApyError::Provider(format!("invalid json: {}", e)))?;

        Self::extract(&body, &self.config.field)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer, field: &str) -> HttpYieldProvider {
        HttpYieldProvider::new(HttpProviderConfig {
            url: format!("{}/v1/apy", server.uri()),
            field: field.to_string(),
            timeout: Duration::from_millis(500),
        })
        .unwrap()
    }

    // ===== extract Tests =====

    #[test]
    fn test_extract_number() {
        let body = json!({"apy": 8.5});
        assert_eq!(HttpYieldProvider::extract(&body, "apy").unwrap(), 8.5);
    }

    #[test]
    fn test_extract_nested_and_string() {
        let body = json!({"data": {"apy": "6.25"}});
        assert_eq!(HttpYieldProvider::extract(&body, "data.apy").unwrap(), 6.25);
    }

    #[test]
    fn test_extract_missing_field() {
        let body = json!({"rate": 8.5});
        let err = HttpYieldProvider::extract(&body, "apy").unwrap_err();
        assert!(matches!(err, ApyError::Provider(_)));
    }

    #[test]
    fn test_extract_wrong_type() {
        let body = json!({"apy": [1, 2]});
        assert!(HttpYieldProvider::extract(&body, "apy").is_err());

        let body = json!({"apy": "n/a"});
        assert!(HttpYieldProvider::extract(&body, "apy").is_err());
    }

    // ===== Mock Server Tests =====

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/apy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"apy": 8.5, "tvl": 1e6})))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, "apy");
        assert_eq!(provider.fetch().await.unwrap(), 8.5);
    }

    #[tokio::test]
    async fn test_fetch_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/apy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, "apy");
        let err = provider.fetch().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_invalid_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/apy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, "apy");
        assert!(provider.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/apy"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"apy": 8.5}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, "apy");
        let err = provider.fetch().await.unwrap_err();
        assert!(err.to_string().contains("request failed"));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let provider = HttpYieldProvider::new(HttpProviderConfig {
            url: "http://127.0.0.1:1/apy".to_string(),
            field: "apy".to_string(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        assert!(provider.fetch().await.is_err());
    }
}
