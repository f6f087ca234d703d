use crate::page::PageSnapshot;
use crate::rules::{Detector, DetectorId, DetectorMetadata, DetectorResult, Severity, Warning};

/// Domain Typosquatting
///
/// Compares the page hostname against well-known domains by Levenshtein
/// distance. Distance 1-2 is confusable; exact matches are the real site
/// and larger distances are too noisy to flag.
pub struct TyposquatDetector;

pub const TYPOSQUAT_SCORE: u32 = 100;

/// Maximum edit distance treated as confusable.
const MAX_CONFUSABLE_DISTANCE: usize = 2;

/// Well-known domains protected against lookalikes.
pub const PROTECTED_DOMAINS: &[&str] = &[
    "google.com",
    "google.co.jp",
    "amazon.com",
    "amazon.co.jp",
    "youtube.com",
    "yahoo.co.jp",
    "rakuten.co.jp",
    "microsoft.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "facebook.com",
];

/// Check `current_domain` against `protected`. The first confusable
/// target in list order wins; there is no best-match ranking.
pub fn check<S: AsRef<str>>(current_domain: &str, protected: &[S]) -> Option<Warning> {
    let current = current_domain.to_lowercase();
    if current.is_empty() || protected.iter().any(|d| d.as_ref() == current) {
        return None;
    }

    for target in protected {
        let target = target.as_ref();
        let distance = levenshtein::levenshtein(&current, target);
        if distance > 0 && distance <= MAX_CONFUSABLE_DISTANCE {
            tracing::warn!(
                domain = %current,
                target,
                distance,
                "hostname is confusable with a protected domain"
            );
            return Some(
                Warning::new(
                    DetectorId::Typosquat,
                    Severity::Critical,
                    TYPOSQUAT_SCORE,
                    "Suspected fake site (URL spoofing)",
                    format!(
                        "The URL closely resembles {target}. Were you trying to reach the official site?"
                    ),
                )
                .with_icon("👺"),
            );
        }
    }

    None
}

impl Detector for TyposquatDetector {
    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            id: DetectorId::Typosquat,
            name: "Typosquatting".into(),
            description: "Hostname within edit distance 1-2 of a protected brand domain".into(),
            default_severity: Severity::Critical,
        }
    }

    fn analyze(&self, page: &PageSnapshot) -> Option<DetectorResult> {
        let warning = check(&page.hostname(), PROTECTED_DOMAINS)?;
        Some(DetectorResult::from_warnings(
            DetectorId::Typosquat,
            vec![warning],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goggle_is_confusable_with_google() {
        let w = check("goggle.com", PROTECTED_DOMAINS).unwrap();
        assert_eq!(w.severity, Severity::Critical);
        assert!(w.description.contains("google.com"));
    }

    #[test]
    fn exact_match_short_circuits() {
        assert!(check("google.com", PROTECTED_DOMAINS).is_none());
        assert!(check("GOOGLE.COM", PROTECTED_DOMAINS).is_none());
    }

    #[test]
    fn distant_domains_not_flagged() {
        assert!(check("example.org", PROTECTED_DOMAINS).is_none());
        assert!(check("", PROTECTED_DOMAINS).is_none());
    }

    #[test]
    fn first_confusable_target_wins() {
        // distance 1 from both entries; list order decides
        let list = ["abc.com", "abd.com"];
        let w = check("abx.com", &list).unwrap();
        assert!(w.description.contains("abc.com"));
    }

    #[test]
    fn detector_uses_page_hostname() {
        let page = PageSnapshot::new("https://amazom.com/ap/signin");
        let result = TyposquatDetector.analyze(&page).unwrap();
        assert_eq!(result.score, TYPOSQUAT_SCORE);
    }
}
