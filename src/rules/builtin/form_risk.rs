use crate::page::{FormInfo, PageSnapshot};
use crate::rules::{Detector, DetectorId, DetectorMetadata, DetectorResult, Severity, Warning};

/// Form Exfiltration Risk
///
/// Flags forms that submit to a foreign host, send passwords over plain
/// HTTP, or put credentials into the query string. The detector score is
/// the sum of the individual warning scores.
pub struct FormRiskDetector;

pub const CROSS_DOMAIN_SCORE: u32 = 30;
pub const PHISHING_WORD_BONUS: u32 = 50;
pub const HYPHENATED_HOST_BONUS: u32 = 20;
pub const PLAINTEXT_PASSWORD_SCORE: u32 = 50;
pub const GET_CREDENTIALS_SCORE: u32 = 20;

/// Payment and identity providers that legitimately receive form posts.
const TRUSTED_SERVICES: &[&str] = &["paypal.com", "stripe.com", "google.com"];

/// Words that make a foreign submission host look like a phishing kit.
const PHISHING_HOST_WORDS: &[&str] = &[
    "login", "signin", "verify", "secure", "account", "update", "support", "confirm", "bank",
    "wallet",
];

impl Detector for FormRiskDetector {
    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            id: DetectorId::FormRisk,
            name: "Form Exfiltration".into(),
            description: "Forms posting to foreign hosts or leaking credentials in transit".into(),
            default_severity: Severity::High,
        }
    }

    fn analyze(&self, page: &PageSnapshot) -> Option<DetectorResult> {
        let warnings: Vec<Warning> = page
            .forms
            .iter()
            .flat_map(|form| evaluate_form(form, page))
            .collect();

        if warnings.is_empty() {
            return None;
        }
        Some(DetectorResult::from_warnings(DetectorId::FormRisk, warnings))
    }
}

/// Evaluate one form. Forms without an action, with a `javascript:`
/// action, or with an action that does not parse are skipped.
pub fn evaluate_form(form: &FormInfo, page: &PageSnapshot) -> Vec<Warning> {
    let mut warnings = Vec::new();

    let action = match form.action.as_deref().map(str::trim) {
        Some(a) if !a.is_empty() && !a.to_lowercase().starts_with("javascript:") => a,
        _ => return warnings,
    };

    let Some(action_url) = page.resolve(action) else {
        tracing::debug!(action, "skipping form with unparseable action");
        return warnings;
    };
    let action_host = action_url.host_str().unwrap_or_default().to_lowercase();
    let current_host = page.hostname();

    if action_host != current_host && !TRUSTED_SERVICES.iter().any(|s| action_host.contains(s)) {
        let mut score = CROSS_DOMAIN_SCORE;
        let mut description = format!("Form sends data to an external site ({action_host}).");

        if let Some(word) = PHISHING_HOST_WORDS.iter().find(|w| action_host.contains(*w)) {
            score += PHISHING_WORD_BONUS;
            description = format!(
                "Danger: form directs you to an external \"{word}\" site. \
                 This is very likely phishing."
            );
        }

        if action_host.matches('-').count() >= 3 {
            score += HYPHENATED_HOST_BONUS;
            description.push_str(" (unnatural domain structure)");
        }

        warnings.push(
            Warning::new(
                DetectorId::FormRisk,
                if score >= 50 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                score,
                "External data submission",
                description,
            )
            .with_icon("📤"),
        );
    }

    if action_url.scheme() == "http" && form.has_password_field {
        warnings.push(
            Warning::new(
                DetectorId::FormRisk,
                Severity::High,
                PLAINTEXT_PASSWORD_SCORE,
                "Unencrypted submission",
                "Password is sent in plain text over HTTP",
            )
            .with_icon("🔓"),
        );
    }

    if form.method_upper() == "GET" && (form.has_password_field || form.has_email_field) {
        warnings.push(
            Warning::new(
                DetectorId::FormRisk,
                Severity::Medium,
                GET_CREDENTIALS_SCORE,
                "Improper submission method",
                "Personal data may be exposed in the URL (GET method)",
            )
            .with_icon("⚠️"),
        );
    }

    warnings
}
