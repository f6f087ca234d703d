use serde::{Deserialize, Serialize};

/// A user-facing warning produced by exactly one detector.
///
/// Warnings are immutable once created. Their order in an
/// `AnalysisResult` is detector-invocation order, not score order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub icon: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Score this warning contributed to its detector's total.
    pub score: u32,
    /// Detector that produced the warning.
    pub source: DetectorId,
    /// Short excerpt of the matched content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Evidence>,
}

impl Warning {
    pub fn new(
        source: DetectorId,
        severity: Severity,
        score: u32,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            icon: severity.icon().into(),
            title: title.into(),
            description: description.into(),
            severity,
            score,
            source,
            snippet: None,
            details: None,
        }
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.snippet = Some(snippet);
        self
    }

    pub fn with_details(mut self, details: Evidence) -> Self {
        self.details = Some(details);
        self
    }
}

/// Supporting evidence attached to a warning (e.g. network targets).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Critical => "🚨",
            Self::High | Self::Medium => "⚠️",
            Self::Low => "ℹ️",
            Self::Info => "💡",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Identifier of a score source. Serialized with the plugin ids the
/// settings UI and the backend use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DetectorId {
    #[serde(rename = "remote-backend")]
    Remote,
    #[serde(rename = "form-analyzer")]
    FormRisk,
    #[serde(rename = "script-analyzer")]
    ScriptPatterns,
    #[serde(rename = "redirect-detector")]
    Redirect,
    #[serde(rename = "impersonation-detector")]
    Impersonation,
    #[serde(rename = "typosquat-detector")]
    Typosquat,
    #[serde(rename = "rule-pack")]
    RulePack,
}

impl DetectorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote-backend",
            Self::FormRisk => "form-analyzer",
            Self::ScriptPatterns => "script-analyzer",
            Self::Redirect => "redirect-detector",
            Self::Impersonation => "impersonation-detector",
            Self::Typosquat => "typosquat-detector",
            Self::RulePack => "rule-pack",
        }
    }

    /// Whether the detector only runs when its id is in the enabled
    /// plugin list. Form, redirect, brand and lookalike checks always run.
    pub fn is_plugin_gated(&self) -> bool {
        matches!(self, Self::ScriptPatterns)
    }

    pub fn from_plugin_id(s: &str) -> Option<Self> {
        match s {
            "remote-backend" => Some(Self::Remote),
            "form-analyzer" => Some(Self::FormRisk),
            "script-analyzer" => Some(Self::ScriptPatterns),
            "redirect-detector" => Some(Self::Redirect),
            "impersonation-detector" => Some(Self::Impersonation),
            "typosquat-detector" => Some(Self::Typosquat),
            "rule-pack" => Some(Self::RulePack),
            _ => None,
        }
    }
}

impl std::fmt::Display for DetectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a single detector for one scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub detector: DetectorId,
    /// Contribution to the page total. Detectors that self-cap apply
    /// their cap before reporting.
    pub score: u32,
    pub warnings: Vec<Warning>,
}

impl DetectorResult {
    /// Result whose score is the sum of its warnings' scores.
    pub fn from_warnings(detector: DetectorId, warnings: Vec<Warning>) -> Self {
        let score = warnings
            .iter()
            .fold(0u32, |acc, w| acc.saturating_add(w.score));
        Self {
            detector,
            score,
            warnings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.score == 0 && self.warnings.is_empty()
    }
}

/// Metadata about a detector, used for `list-detectors` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorMetadata {
    pub id: DetectorId,
    pub name: String,
    pub description: String,
    pub default_severity: Severity,
}
