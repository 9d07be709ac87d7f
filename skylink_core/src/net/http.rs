//! HTTP implementation of the batch transport.

use async_trait::async_trait;
use skylink_env::{BatchEndpoint, BatchTransport, LinkError};
use tracing::debug;

/// Batch transport POSTing JSON to the backend REST API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }

    fn url_for(&self, endpoint: BatchEndpoint) -> String {
        match endpoint {
            BatchEndpoint::Telemetry => format!("{}/drone-data", self.base_url),
            BatchEndpoint::Anomaly => format!("{}/anomalies", self.base_url),
        }
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn post(&self, endpoint: BatchEndpoint, body: String) -> Result<(), LinkError> {
        let response = self
            .client
            .post(self.url_for(endpoint))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.bearer_token),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| LinkError::send(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::Http(status.as_u16()));
        }
        debug!(endpoint = ?endpoint, "batch report accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let transport = HttpTransport::new("http://localhost:3000/api", "token");
        assert_eq!(
            transport.url_for(BatchEndpoint::Telemetry),
            "http://localhost:3000/api/drone-data"
        );
        assert_eq!(
            transport.url_for(BatchEndpoint::Anomaly),
            "http://localhost:3000/api/anomalies"
        );
    }
}
