//! Page snapshot: the unified input every detector consumes.
//!
//! The host glue serializes the live document into a `PageSnapshot`.
//! Detectors never touch the DOM directly, so a scan is a pure function
//! of the snapshot.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SentryError};

/// Snapshot of a web page at the moment a scan cycle starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Full URL of the active page.
    pub url: String,
    /// `document.referrer`, if any.
    #[serde(default)]
    pub referrer: Option<String>,
    /// `document.title`.
    #[serde(default)]
    pub title: String,
    /// Visible body text.
    #[serde(default)]
    pub body_text: String,
    /// All `<script>` elements in document order.
    #[serde(default)]
    pub scripts: Vec<ScriptSource>,
    /// All `<form>` elements in document order.
    #[serde(default)]
    pub forms: Vec<FormInfo>,
    /// `content` attributes of `<meta http-equiv="refresh">` tags.
    #[serde(default)]
    pub meta_refresh: Vec<String>,
    /// Whether any `input[type=password]` exists anywhere on the page.
    #[serde(default)]
    pub has_password_field: bool,
}

/// A single script element: its `src` attribute and inline text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub content: String,
}

impl ScriptSource {
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            src: String::new(),
            content: content.into(),
        }
    }
}

/// A form element reduced to the attributes the form-risk check needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInfo {
    /// Raw `action` attribute.
    #[serde(default)]
    pub action: Option<String>,
    /// Raw `method` attribute.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub has_password_field: bool,
    #[serde(default)]
    pub has_email_field: bool,
}

impl FormInfo {
    /// Upper-cased method, defaulting to `GET` like the DOM does.
    pub fn method_upper(&self) -> String {
        self.method
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("GET")
            .trim()
            .to_uppercase()
    }
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Load a snapshot serialized as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: PageSnapshot = serde_json::from_str(&content)?;
        if snapshot.url.trim().is_empty() {
            return Err(SentryError::Page(format!(
                "{}: snapshot has no url",
                path.display()
            )));
        }
        Ok(snapshot)
    }

    /// Parsed page URL, if it is well-formed.
    pub fn parsed_url(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }

    /// Lower-cased hostname of the page, empty when the URL has none.
    pub fn hostname(&self) -> String {
        self.parsed_url()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default()
    }

    /// Resolve a possibly-relative reference against the page URL.
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        match self.parsed_url() {
            Some(base) => base.join(reference).ok(),
            None => Url::parse(reference).ok(),
        }
    }

    /// Whether `reference` points at a host other than the page's own.
    /// Unparseable references count as same-origin.
    pub fn is_external(&self, reference: &str) -> bool {
        let host = self.hostname();
        self.resolve(reference)
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .map(|target| target != host)
            .unwrap_or(false)
    }
}

/// True when `host` equals `domain` or is one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    let domain = domain.trim_end_matches('.').to_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_lowercased() {
        let page = PageSnapshot::new("https://Login.Example.COM/path");
        assert_eq!(page.hostname(), "login.example.com");
    }

    #[test]
    fn relative_reference_is_same_origin() {
        let page = PageSnapshot::new("https://example.com/a/b");
        assert!(!page.is_external("/submit"));
        assert!(!page.is_external("api/data"));
        assert!(page.is_external("https://evil.net/collect"));
    }

    #[test]
    fn subdomain_matching() {
        assert!(host_matches("accounts.google.com", "google.com"));
        assert!(host_matches("google.com", "google.com"));
        assert!(!host_matches("notgoogle.com", "google.com"));
        assert!(!host_matches("google.com", ""));
    }

    #[test]
    fn form_method_defaults_to_get() {
        let form = FormInfo::default();
        assert_eq!(form.method_upper(), "GET");
        let post = FormInfo {
            method: Some("post".into()),
            ..Default::default()
        };
        assert_eq!(post.method_upper(), "POST");
    }
}
