use std::time::Duration;

use async_trait::async_trait;

use super::{AnalyzeRequest, AnalyzeResponse, RemoteAnalyzer};
use crate::error::{Result, SentryError};

/// JSON-over-HTTP backend: `POST {base_url}/analyze`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(SentryError::Config("backend url is empty".into()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{base}/analyze"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteAnalyzer for HttpBackend {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<Option<AnalyzeResponse>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SentryError::Backend(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let body: AnalyzeResponse = response.json().await?;
        if !body.status.is_empty() && body.status != "success" {
            tracing::debug!(status = %body.status, "backend reported a non-success status");
            return Ok(None);
        }
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let backend = HttpBackend::new("http://localhost:5000/", Duration::from_secs(2)).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:5000/analyze");
    }

    #[test]
    fn empty_base_rejected() {
        assert!(HttpBackend::new("", Duration::from_secs(2)).is_err());
    }
}
