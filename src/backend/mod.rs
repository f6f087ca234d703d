//! Optional remote analysis backend.
//!
//! The backend is a best-effort collaborator: a slow, unreachable or
//! malformed backend contributes nothing to the page score and is never
//! reported to the user as an error.

#[cfg(feature = "http-backend")]
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::page::PageSnapshot;
use crate::rules::{DetectorId, DetectorResult, Severity, Warning};

#[cfg(feature = "http-backend")]
pub use http::HttpBackend;

/// Body of `POST {base}/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    pub plugins: Vec<String>,
    pub context: PageContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub referrer: Option<String>,
    pub has_password_field: bool,
    pub form_count: usize,
    pub script_count: usize,
}

impl AnalyzeRequest {
    pub fn from_page(page: &PageSnapshot, plugins: &[String]) -> Self {
        Self {
            url: page.url.clone(),
            plugins: plugins.to_vec(),
            context: PageContext {
                referrer: page.referrer.clone(),
                has_password_field: page.has_password_field,
                form_count: page.forms.len(),
                script_count: page.scripts.len(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub analysis: RemoteAnalysis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAnalysis {
    #[serde(default)]
    pub total_score: f64,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub warnings: Vec<RemoteWarning>,
    #[serde(default)]
    pub recommendation: Option<RemoteRecommendation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteWarning {
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecommendation {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AnalyzeResponse {
    /// Remote contribution as a detector result. The backend's total is
    /// taken as-is; its warnings carry no individual score.
    pub fn to_detector_result(&self) -> Option<DetectorResult> {
        let score = if self.analysis.total_score.is_finite() && self.analysis.total_score > 0.0 {
            self.analysis.total_score.round() as u32
        } else {
            0
        };

        let warnings: Vec<Warning> = self
            .analysis
            .warnings
            .iter()
            .map(|w| {
                let severity = w
                    .severity
                    .as_deref()
                    .and_then(Severity::from_str_lenient)
                    .unwrap_or(Severity::Info);
                let warning = Warning::new(
                    DetectorId::Remote,
                    severity,
                    0,
                    w.title.clone(),
                    w.description.clone(),
                );
                match &w.icon {
                    Some(icon) => warning.with_icon(icon),
                    None => warning,
                }
            })
            .collect();

        if score == 0 && warnings.is_empty() {
            return None;
        }

        Some(DetectorResult {
            detector: DetectorId::Remote,
            score,
            warnings,
        })
    }

    pub fn recommendation_message(&self) -> Option<String> {
        self.analysis
            .recommendation
            .as_ref()
            .and_then(|r| r.message.clone())
            .filter(|m| !m.trim().is_empty())
    }
}

/// A remote page analyzer. `Ok(None)` means "no opinion".
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<Option<AnalyzeResponse>>;
}

/// Used when no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl RemoteAnalyzer for Offline {
    async fn analyze(&self, _request: &AnalyzeRequest) -> Result<Option<AnalyzeResponse>> {
        Ok(None)
    }
}

/// Call `analyzer` under `timeout`. Errors and timeouts degrade to `None`.
pub async fn analyze_with_timeout(
    analyzer: &dyn RemoteAnalyzer,
    request: &AnalyzeRequest,
    timeout: Duration,
) -> Option<AnalyzeResponse> {
    match tokio::time::timeout(timeout, analyzer.analyze(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, url = %request.url, "backend unavailable, continuing offline");
            None
        }
        Err(_) => {
            tracing::debug!(
                timeout_ms = timeout.as_millis() as u64,
                url = %request.url,
                "backend timed out, continuing offline"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SentryError;
    use pretty_assertions::assert_eq;

    struct Failing;

    #[async_trait]
    impl RemoteAnalyzer for Failing {
        async fn analyze(&self, _request: &AnalyzeRequest) -> Result<Option<AnalyzeResponse>> {
            Err(SentryError::Backend("connection refused".into()))
        }
    }

    struct Slow;

    #[async_trait]
    impl RemoteAnalyzer for Slow {
        async fn analyze(&self, _request: &AnalyzeRequest) -> Result<Option<AnalyzeResponse>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Some(AnalyzeResponse::default()))
        }
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest::from_page(&PageSnapshot::new("https://example.com/"), &[])
    }

    #[test]
    fn request_uses_camel_case_context() {
        let mut page = PageSnapshot::new("https://example.com/login");
        page.has_password_field = true;
        let json = serde_json::to_value(AnalyzeRequest::from_page(
            &page,
            &["whois-checker".to_string()],
        ))
        .unwrap();
        assert_eq!(json["context"]["hasPasswordField"], true);
        assert_eq!(json["context"]["formCount"], 0);
        assert_eq!(json["plugins"][0], "whois-checker");
    }

    #[test]
    fn response_maps_to_remote_result() {
        let body = r#"{
            "status": "success",
            "analysis": {
                "totalScore": 41.6,
                "severity": "medium",
                "warnings": [{"icon": "🔴", "title": "URL structure",
                              "description": "Many subdomains", "source": "url-pattern",
                              "severity": "medium"}],
                "recommendation": {"action": "warn", "message": "Be careful"}
            }
        }"#;
        let response: AnalyzeResponse = serde_json::from_str(body).unwrap();
        let result = response.to_detector_result().unwrap();
        assert_eq!(result.detector, DetectorId::Remote);
        assert_eq!(result.score, 42);
        assert_eq!(result.warnings[0].severity, Severity::Medium);
        assert_eq!(result.warnings[0].icon, "🔴");
        assert_eq!(response.recommendation_message().as_deref(), Some("Be careful"));
    }

    #[test]
    fn empty_response_contributes_nothing() {
        assert!(AnalyzeResponse::default().to_detector_result().is_none());
    }

    #[tokio::test]
    async fn errors_degrade_to_none() {
        let out = analyze_with_timeout(&Failing, &request(), Duration::from_millis(100)).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn timeout_degrades_to_none() {
        let out = analyze_with_timeout(&Slow, &request(), Duration::from_millis(20)).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn offline_has_no_opinion() {
        let out = analyze_with_timeout(&Offline, &request(), Duration::from_millis(20)).await;
        assert!(out.is_none());
    }
}
