//! Score aggregation and severity tiering.
//!
//! Aggregation is a plain sum over detector results: no weighting, no
//! normalization, and no caps beyond what a detector applies to itself.

use serde::{Deserialize, Serialize};

use crate::rules::{DetectorResult, Severity, Warning};

pub const CRITICAL_THRESHOLD: u32 = 80;
pub const HIGH_THRESHOLD: u32 = 60;
pub const MEDIUM_THRESHOLD: u32 = 35;

/// Final result of one page-check cycle, handed to the warning UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub total_score: u32,
    pub severity: Severity,
    pub warnings: Vec<Warning>,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub message: String,
}

/// Sum of all detector contributions.
pub fn aggregate(results: &[DetectorResult]) -> u32 {
    results
        .iter()
        .fold(0u32, |acc, r| acc.saturating_add(r.score))
}

/// Map a total score to a severity tier. A zero score with no warnings is
/// `Info`; otherwise the tiers are evaluated high to low.
pub fn classify(total_score: u32, has_warnings: bool) -> Severity {
    if total_score >= CRITICAL_THRESHOLD {
        Severity::Critical
    } else if total_score >= HIGH_THRESHOLD {
        Severity::High
    } else if total_score >= MEDIUM_THRESHOLD {
        Severity::Medium
    } else if total_score == 0 && !has_warnings {
        Severity::Info
    } else {
        Severity::Low
    }
}

/// Build the `AnalysisResult` for a set of detector results. Warnings
/// keep detector-invocation order. `remote_message` wins over the
/// generated recommendation when present.
pub fn build_result(results: &[DetectorResult], remote_message: Option<String>) -> AnalysisResult {
    let total_score = aggregate(results);
    let warnings: Vec<Warning> = results
        .iter()
        .flat_map(|r| r.warnings.iter().cloned())
        .collect();
    let severity = classify(total_score, !warnings.is_empty());
    let message = remote_message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| recommendation_message(total_score, warnings.len()));

    AnalysisResult {
        total_score,
        severity,
        warnings,
        recommendation: Recommendation { message },
    }
}

/// Recommendation text for a score tier.
pub fn recommendation_message(total_score: u32, warning_count: usize) -> String {
    if total_score >= CRITICAL_THRESHOLD {
        format!(
            "This site is extremely dangerous. {warning_count} serious issue(s) were detected. \
             Leaving this page is strongly recommended."
        )
    } else if total_score >= HIGH_THRESHOLD {
        format!(
            "This site is likely phishing or malware. {warning_count} issue(s) were detected."
        )
    } else if total_score >= MEDIUM_THRESHOLD {
        format!(
            "This site contains suspicious elements. {warning_count} issue(s) were detected. \
             Avoid entering personal information."
        )
    } else {
        "This site has minor concerns. Use it with care.".into()
    }
}
