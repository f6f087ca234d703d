//! Drive-by download classification.
//!
//! `classify` is an ordered decision list: the first matching rule decides
//! the verdict. Every call updates the process-lifetime counters in
//! [`DownloadStats`].

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::page::host_matches;

/// Executable and installer extensions treated as dangerous.
pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    ".exe",
    ".bat",
    ".cmd",
    ".com",
    ".scr",
    ".pif",
    ".vbs",
    ".js",
    ".jar",
    ".app",
    ".deb",
    ".pkg",
    ".dmg",
    ".msi",
    ".apk",
    ".ps1",
    ".hta",
    ".gadget",
    ".application",
    ".cpl",
    ".msc",
];

/// Filename keywords associated with malware and cracking tools, checked
/// in this order.
pub const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "virus",
    "trojan",
    "malware",
    "ransomware",
    "keylogger",
    "crack",
    "keygen",
    "patch",
    "activator",
    "loader",
    "backdoor",
    "exploit",
    "payload",
    "rootkit",
];

/// Hosts whose executables are allowed in smart-monitor mode.
pub const TRUSTED_DOWNLOAD_DOMAINS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "google.com",
    "microsoft.com",
    "apple.com",
    "mozilla.org",
    "debian.org",
    "ubuntu.com",
    "sourceforge.net",
    "npmjs.com",
    "pypi.org",
    "aws.amazon.com",
    "cloud.google.com",
    "azure.microsoft.com",
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "unpkg.com",
];

static RANDOM_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-f0-9]{16,}").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadMode {
    /// Every download is cancelled.
    FullBlock,
    /// Downloads are evaluated by the heuristic decision list.
    #[default]
    SmartMonitor,
}

impl DownloadMode {
    /// Mode selected by the persisted `enableDbd` flag.
    pub fn from_enable_dbd(enabled: bool) -> Self {
        if enabled {
            Self::FullBlock
        } else {
            Self::SmartMonitor
        }
    }

    pub fn is_full_block(self) -> bool {
        matches!(self, Self::FullBlock)
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullBlock => write!(f, "full block"),
            Self::SmartMonitor => write!(f, "smart monitor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Block,
    Allow,
}

/// Why a verdict was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BlockReason {
    FullBlockMode,
    DataUri,
    BlobUri,
    SuspiciousKeyword(String),
    DangerousExtension(String),
    RandomFilename,
    Clean,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullBlockMode => write!(f, "Full-block mode is active"),
            Self::DataUri => write!(f, "Download from a data URI (typical drive-by pattern)"),
            Self::BlobUri => write!(f, "File generated dynamically by JavaScript (blob URL)"),
            Self::SuspiciousKeyword(kw) => write!(f, "Suspicious keyword \"{kw}\" in filename"),
            Self::DangerousExtension(ext) => write!(f, "Dangerous executable file ({ext})"),
            Self::RandomFilename => write!(f, "Unnatural filename (possibly randomly generated)"),
            Self::Clean => write!(f, "No risk indicators"),
        }
    }
}

/// A download as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEvent {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub url: String,
    /// Target path; may include directories.
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl DownloadEvent {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Final path component of `filename`, splitting on both separators.
    pub fn basename(&self) -> &str {
        basename(&self.filename)
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: Verdict,
    pub reason: BlockReason,
}

impl Classification {
    pub fn is_block(&self) -> bool {
        self.verdict == Verdict::Block
    }
}

/// Running counters. Lives as long as the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    pub total_blocked: u64,
    pub total_allowed: u64,
    pub last_blocked_file: Option<String>,
    pub last_blocked_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadClassifier {
    stats: DownloadStats,
}

impl DownloadClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Decide on `event` under `mode` and record the outcome.
    pub fn classify(&mut self, event: &DownloadEvent, mode: DownloadMode) -> Classification {
        let reason = match mode {
            DownloadMode::FullBlock => Some(BlockReason::FullBlockMode),
            DownloadMode::SmartMonitor => smart_monitor(event),
        };

        match reason {
            Some(reason) => {
                self.stats.total_blocked += 1;
                self.stats.last_blocked_file = Some(event.basename().to_string());
                self.stats.last_blocked_time = Some(Utc::now());
                tracing::warn!(
                    file = %event.basename(),
                    url = %event.url,
                    reason = %reason,
                    total_blocked = self.stats.total_blocked,
                    "download blocked"
                );
                Classification {
                    verdict: Verdict::Block,
                    reason,
                }
            }
            None => {
                self.stats.total_allowed += 1;
                tracing::debug!(
                    file = %event.basename(),
                    total_allowed = self.stats.total_allowed,
                    "download allowed"
                );
                Classification {
                    verdict: Verdict::Allow,
                    reason: BlockReason::Clean,
                }
            }
        }
    }
}

/// Smart-monitor decision list. `None` means allow.
fn smart_monitor(event: &DownloadEvent) -> Option<BlockReason> {
    if event.url.starts_with("data:") {
        return Some(BlockReason::DataUri);
    }
    if event.url.starts_with("blob:") {
        return Some(BlockReason::BlobUri);
    }

    let name = event.basename().to_lowercase();

    if let Some(kw) = SUSPICIOUS_KEYWORDS.iter().find(|kw| name.contains(*kw)) {
        return Some(BlockReason::SuspiciousKeyword((*kw).to_string()));
    }

    let dangerous_ext = DANGEROUS_EXTENSIONS.iter().find(|ext| name.ends_with(*ext));

    if let Some(ext) = dangerous_ext {
        if !is_trusted_domain(&event.url) {
            return Some(BlockReason::DangerousExtension((*ext).to_string()));
        }
    }

    if dangerous_ext.is_some() && RANDOM_NAME.is_match(&name) {
        return Some(BlockReason::RandomFilename);
    }

    None
}

/// Host of `url` equals or is a subdomain of a trusted download domain.
/// Unparseable URLs are untrusted.
pub fn is_trusted_domain(url: &str) -> bool {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    else {
        return false;
    };
    TRUSTED_DOWNLOAD_DOMAINS
        .iter()
        .any(|d| host_matches(&host, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn smart(classifier: &mut DownloadClassifier, url: &str, file: &str) -> Classification {
        classifier.classify(&DownloadEvent::new(url, file), DownloadMode::SmartMonitor)
    }

    #[test]
    fn keyword_rule_fires_before_extension_rule() {
        let mut c = DownloadClassifier::new();
        let result = smart(&mut c, "https://files.example.net/dl", "invoice_crack_keygen.exe");
        assert_eq!(result.verdict, Verdict::Block);
        assert_eq!(result.reason, BlockReason::SuspiciousKeyword("crack".into()));
        assert!(result.reason.to_string().contains("crack"));
    }

    #[test]
    fn full_block_blocks_everything() {
        let mut c = DownloadClassifier::new();
        let result = c.classify(
            &DownloadEvent::new("https://github.com/x/y/report.pdf", "report.pdf"),
            DownloadMode::FullBlock,
        );
        assert_eq!(result.reason, BlockReason::FullBlockMode);
    }

    #[test]
    fn data_and_blob_uris_blocked() {
        let mut c = DownloadClassifier::new();
        assert_eq!(
            smart(&mut c, "data:application/octet-stream;base64,AAAA", "a.txt").reason,
            BlockReason::DataUri
        );
        assert_eq!(
            smart(&mut c, "blob:https://evil.example/1234", "a.txt").reason,
            BlockReason::BlobUri
        );
    }

    #[test]
    fn executable_from_trusted_domain_allowed() {
        let mut c = DownloadClassifier::new();
        let result = smart(
            &mut c,
            "https://objects.github.com/releases/setup.exe",
            "C:\\Users\\me\\Downloads\\setup.exe",
        );
        assert_eq!(result.verdict, Verdict::Allow);
    }

    #[test]
    fn executable_from_unknown_domain_blocked() {
        let mut c = DownloadClassifier::new();
        let result = smart(&mut c, "https://cheap-soft.example/setup.msi", "setup.msi");
        assert_eq!(result.reason, BlockReason::DangerousExtension(".msi".into()));
    }

    #[test]
    fn random_name_needs_dangerous_extension() {
        let mut c = DownloadClassifier::new();
        let hashed = "3f9a0b1c2d3e4f5a6b7c.css";
        assert_eq!(
            smart(&mut c, "https://cdn.example/x", hashed).verdict,
            Verdict::Allow
        );
        let result = smart(
            &mut c,
            "https://github.com/release",
            "3f9a0b1c2d3e4f5a6b7c.exe",
        );
        assert_eq!(result.reason, BlockReason::RandomFilename);
    }

    #[test]
    fn stats_track_outcomes() {
        let mut c = DownloadClassifier::new();
        smart(&mut c, "https://example.com/a", "notes.txt");
        smart(&mut c, "https://example.com/b", "/tmp/dl/trojan.zip");
        let stats = c.stats();
        assert_eq!(stats.total_allowed, 1);
        assert_eq!(stats.total_blocked, 1);
        assert_eq!(stats.last_blocked_file.as_deref(), Some("trojan.zip"));
        assert!(stats.last_blocked_time.is_some());
    }

    #[test]
    fn trusted_domain_is_suffix_not_substring() {
        assert!(is_trusted_domain("https://github.com/a"));
        assert!(!is_trusted_domain("https://github.com.evil.io/a"));
        assert!(!is_trusted_domain("not a url"));
    }
}
