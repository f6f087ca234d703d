use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SentryError};
use crate::page::host_matches;
use crate::rules::Severity;
use crate::scoring::AnalysisResult;

/// Most recent detections kept in the log.
pub const DETECTION_LOG_CAP: usize = 50;

/// Top-level configuration from `.pagesentry.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Plugin ids to run. Ids without a local detector are forwarded to
    /// the backend.
    #[serde(default = "default_enabled_plugins")]
    pub enabled_plugins: Vec<String>,
    /// Minimum total score that interrupts the user.
    #[serde(default = "default_min_score")]
    pub min_score_to_warn: u32,
    #[serde(default = "default_true")]
    pub show_detailed_warnings: bool,
    /// Trusted domains; subdomains are trusted too.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Cancel every download instead of classifying it.
    #[serde(default)]
    pub enable_dbd: bool,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Trailing-edge debounce for rescans triggered by inserted forms.
    #[serde(default = "default_debounce_ms")]
    pub rescan_debounce_ms: u64,
    #[serde(default, skip_serializing_if = "DetectionLog::is_empty")]
    pub detection_log: DetectionLog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis backend. Unset means offline.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_enabled_plugins() -> Vec<String> {
    [
        "whois-checker",
        "url-pattern",
        "form-analyzer",
        "script-analyzer",
        "redirect-detector",
        "impersonation-detector",
        "typosquat-detector",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_score() -> u32 {
    35
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_plugins: default_enabled_plugins(),
            min_score_to_warn: default_min_score(),
            show_detailed_warnings: true,
            whitelist: Vec::new(),
            enable_dbd: false,
            backend: BackendConfig::default(),
            rescan_debounce_ms: default_debounce_ms(),
            detection_log: DetectionLog::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend.timeout_ms == 0 {
            return Err(SentryError::Config("backend.timeout_ms must be > 0".into()));
        }
        if let Some(url) = &self.backend.url {
            url::Url::parse(url)
                .map_err(|e| SentryError::Config(format!("backend.url {url:?}: {e}")))?;
        }
        Ok(())
    }

    /// Hostname equals a whitelist entry or is a subdomain of one.
    pub fn is_whitelisted(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.whitelist.iter().any(|w| host_matches(&host, w))
    }

    /// Trust `domain`. Returns false when it was already present.
    pub fn add_to_whitelist(&mut self, domain: &str) -> bool {
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() || self.whitelist.iter().any(|w| w.eq_ignore_ascii_case(&domain)) {
            return false;
        }
        self.whitelist.push(domain);
        true
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# PageSentry configuration

# Plugin ids to run. Ids without a local detector are sent to the backend.
enabled_plugins = [
    "whois-checker",
    "url-pattern",
    "form-analyzer",
    "script-analyzer",
    "redirect-detector",
    "impersonation-detector",
    "typosquat-detector",
]

# Pages scoring at or above this interrupt the user.
min_score_to_warn = 35
show_detailed_warnings = true

# Trusted domains (subdomains included).
# whitelist = ["example.com"]

# Cancel every download instead of classifying it.
enable_dbd = false

[backend]
# url = "http://127.0.0.1:5000"
timeout_ms = 2000
"#
    }
}

/// One entry of the detection log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub url: String,
    pub score: u32,
    pub severity: Severity,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn from_result(url: &str, result: &AnalysisResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            score: result.total_score,
            severity: result.severity,
            reasons: result.warnings.iter().map(|w| w.description.clone()).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// Newest-first log capped at [`DETECTION_LOG_CAP`]. Stored logs longer
/// than the cap are truncated on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LogEntry>", into = "Vec<LogEntry>")]
pub struct DetectionLog(Vec<LogEntry>);

impl From<Vec<LogEntry>> for DetectionLog {
    fn from(mut entries: Vec<LogEntry>) -> Self {
        entries.truncate(DETECTION_LOG_CAP);
        Self(entries)
    }
}

impl From<DetectionLog> for Vec<LogEntry> {
    fn from(log: DetectionLog) -> Self {
        log.0
    }
}

impl DetectionLog {
    pub fn push(&mut self, entry: LogEntry) {
        self.0.insert(0, entry);
        self.0.truncate(DETECTION_LOG_CAP);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The storage collaborator's JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    #[serde(default)]
    pub enable_dbd: bool,
    #[serde(default)]
    pub secuti_config: Option<StoredConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfig {
    #[serde(default)]
    pub enabled_plugins: Option<Vec<String>>,
    #[serde(default)]
    pub min_score_to_warn: Option<u32>,
    #[serde(default)]
    pub show_detailed_warnings: Option<bool>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub detection_log: DetectionLog,
}

impl StoredSettings {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Snapshot of `config` in storage shape.
    pub fn from_config(config: &Config) -> Self {
        Self {
            enable_dbd: config.enable_dbd,
            secuti_config: Some(StoredConfig {
                enabled_plugins: Some(config.enabled_plugins.clone()),
                min_score_to_warn: Some(config.min_score_to_warn),
                show_detailed_warnings: Some(config.show_detailed_warnings),
                whitelist: config.whitelist.clone(),
                detection_log: config.detection_log.clone(),
            }),
        }
    }

    /// Merge stored values over `config`; keys absent from storage keep
    /// their current value.
    pub fn apply_to(&self, config: &mut Config) {
        config.enable_dbd = self.enable_dbd;
        let Some(stored) = &self.secuti_config else {
            return;
        };
        if let Some(plugins) = &stored.enabled_plugins {
            config.enabled_plugins = plugins.clone();
        }
        if let Some(min) = stored.min_score_to_warn {
            config.min_score_to_warn = min;
        }
        if let Some(show) = stored.show_detailed_warnings {
            config.show_detailed_warnings = show;
        }
        config.whitelist = stored.whitelist.clone();
        config.detection_log = stored.detection_log.clone();
    }
}
