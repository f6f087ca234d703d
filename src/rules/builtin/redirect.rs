use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::PageSnapshot;
use crate::rules::{Detector, DetectorId, DetectorMetadata, DetectorResult, Severity, Warning};

/// Automatic Redirects
///
/// Flags meta-refresh tags that bounce the user to a foreign site within
/// a few seconds, and scripts that assign `location` to an external URL.
pub struct RedirectDetector;

pub const REDIRECT_SCORE: u32 = 15;

/// Meta refreshes slower than this many seconds are left alone.
const MAX_META_DELAY_SECS: u64 = 3;

static META_REFRESH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+);?\s*url=(.+)").unwrap());

static JS_REDIRECT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"window\.location\s*=\s*['"]([^'"]+)['"]"#).unwrap(),
        Regex::new(r#"window\.location\.href\s*=\s*['"]([^'"]+)['"]"#).unwrap(),
        Regex::new(r#"location\.replace\s*\(\s*['"]([^'"]+)['"]\)"#).unwrap(),
    ]
});

impl Detector for RedirectDetector {
    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            id: DetectorId::Redirect,
            name: "Automatic Redirect".into(),
            description: "Meta refresh or script redirects to an external site".into(),
            default_severity: Severity::Medium,
        }
    }

    fn analyze(&self, page: &PageSnapshot) -> Option<DetectorResult> {
        let host = page.hostname();
        let mut warnings = Vec::new();

        for content in &page.meta_refresh {
            if let Some(w) = check_meta_refresh(content, &host) {
                warnings.push(w);
            }
        }

        for script in &page.scripts {
            warnings.extend(check_script_redirects(&script.content, &host));
        }

        if warnings.is_empty() {
            return None;
        }
        Some(DetectorResult::from_warnings(DetectorId::Redirect, warnings))
    }
}

/// Check one `<meta http-equiv="refresh">` content attribute.
pub fn check_meta_refresh(content: &str, host: &str) -> Option<Warning> {
    let cap = META_REFRESH_RE.captures(content)?;
    let delay: u64 = cap.get(1)?.as_str().parse().ok()?;
    let target = cap.get(2)?.as_str().trim();

    if delay > MAX_META_DELAY_SECS || !is_external_absolute(target, host) {
        return None;
    }

    Some(
        Warning::new(
            DetectorId::Redirect,
            Severity::Medium,
            REDIRECT_SCORE,
            "Automatic redirect",
            format!(
                "Redirects to an external site after {delay}s: {}",
                preview(target)
            ),
        )
        .with_icon("🔀"),
    )
}

/// Check one script body. Each redirect form contributes at most once.
pub fn check_script_redirects(content: &str, host: &str) -> Vec<Warning> {
    JS_REDIRECT_PATTERNS
        .iter()
        .filter_map(|re| re.captures(content))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .filter(|target| is_external_absolute(target, host))
        .map(|target| {
            Warning::new(
                DetectorId::Redirect,
                Severity::Medium,
                REDIRECT_SCORE,
                "JavaScript redirect",
                format!("Script forwards to an external site: {}", preview(&target)),
            )
            .with_icon("🔀")
        })
        .collect()
}

fn is_external_absolute(target: &str, host: &str) -> bool {
    target.starts_with("http") && (host.is_empty() || !target.contains(host))
}

fn preview(target: &str) -> String {
    let cut: String = target.chars().take(50).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ScriptSource;

    #[test]
    fn fast_external_meta_refresh_flagged() {
        let w = check_meta_refresh("0; url=https://evil.net/land", "news.example.com").unwrap();
        assert_eq!(w.score, REDIRECT_SCORE);
        assert!(w.description.contains("after 0s"));
    }

    #[test]
    fn slow_or_internal_meta_refresh_ignored() {
        assert!(check_meta_refresh("10; url=https://evil.net/", "example.com").is_none());
        assert!(check_meta_refresh("0; url=https://example.com/next", "example.com").is_none());
        assert!(check_meta_refresh("0; url=/relative", "example.com").is_none());
        assert!(check_meta_refresh("garbage", "example.com").is_none());
    }

    #[test]
    fn script_redirect_forms_counted_independently() {
        let content = "window.location = 'https://a.evil.net/'; \
                       location.replace('https://b.evil.net/');";
        let warnings = check_script_redirects(content, "example.com");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn detector_sums_redirect_scores() {
        let page = PageSnapshot {
            meta_refresh: vec!["1;url=https://evil.net".into()],
            scripts: vec![ScriptSource::inline(
                "window.location.href = \"https://phish.example.org/login\";",
            )],
            ..PageSnapshot::new("https://example.com/")
        };
        let result = RedirectDetector.analyze(&page).unwrap();
        assert_eq!(result.score, 2 * REDIRECT_SCORE);
    }
}
