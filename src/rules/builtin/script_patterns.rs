use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::page::{PageSnapshot, ScriptSource};
use crate::rules::{Detector, DetectorId, DetectorMetadata, DetectorResult, Severity, Warning};

use super::network_calls;

/// Script Pattern Analysis
///
/// Runs an ordered list of weighted heuristics over every inline script.
/// Each heuristic contributes its fixed score at most once per script.
/// A script must reach `SCRIPT_SCORE_FLOOR` before its warnings are
/// surfaced; weaker matches are discarded as boilerplate noise.
pub struct ScriptPatternDetector;

/// Scripts shorter than this are too small to classify.
pub const MIN_CONTENT_LEN: usize = 50;

/// Per-script score needed before findings are reported.
pub const SCRIPT_SCORE_FLOOR: u32 = 15;

/// `src` substrings of well-known libraries and CDNs that are skipped.
/// This trades precision for speed; it is not a security boundary.
const TRUSTED_LIBRARIES: &[&str] = &[
    "jquery",
    "react",
    "vue",
    "angular",
    "backbone",
    "ember",
    "lodash",
    "underscore",
    "moment",
    "dayjs",
    "axios",
    "superagent",
    "bootstrap",
    "foundation",
    "bulma",
    "tailwind",
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "unpkg.com",
    "ajax.googleapis.com",
    "code.jquery.com",
    "google-analytics",
    "googletagmanager",
    "facebook.net",
    "doubleclick.net",
    "googlesyndication",
    "adservice.google",
    "polyfill",
    "stripe",
    "paypal",
    "recaptcha",
    "gstatic.com",
];

/// A weighted regex heuristic.
pub struct PatternRule {
    pub id: &'static str,
    pub score: u32,
    pub severity: Severity,
    pub reason: &'static str,
    regex: Regex,
}

/// A single heuristic hit inside one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub rule_id: &'static str,
    pub score: u32,
    pub severity: Severity,
    pub reason: String,
    pub snippet: Option<String>,
    pub details: Option<crate::rules::Evidence>,
}

impl PatternRule {
    fn new(
        id: &'static str,
        pattern: &str,
        score: u32,
        severity: Severity,
        reason: &'static str,
    ) -> Self {
        Self {
            id,
            score,
            severity,
            reason,
            regex: Regex::new(pattern).unwrap(),
        }
    }

    /// Evaluate this rule against script content.
    pub fn evaluate(&self, content: &str) -> Option<PatternMatch> {
        let m = self.regex.find(content)?;
        Some(PatternMatch {
            rule_id: self.id,
            score: self.score,
            severity: self.severity,
            reason: self.reason.into(),
            snippet: Some(extract_snippet(content, m.start(), m.end())),
            details: None,
        })
    }
}

static PATTERN_RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        PatternRule::new(
            "eval-long-argument",
            r"\beval\s*\([^)]{10,}\)",
            35,
            Severity::Critical,
            "Executes complex code through eval()",
        ),
        PatternRule::new(
            "obfuscated-identifiers",
            r"(?i)_0x[0-9a-f]{4,}[^a-zA-Z0-9_]{1,5}_0x[0-9a-f]{4,}",
            50,
            Severity::Critical,
            "Obfuscation pattern (multiple _0x identifiers)",
        ),
        PatternRule::new(
            "obfuscated-function",
            r"(?i)function\s*\(\s*_0x[0-9a-f]+",
            45,
            Severity::Critical,
            "Obfuscated function definition",
        ),
        PatternRule::new(
            "dynamic-function",
            r#"new\s+Function\s*\([^)]*['"`]"#,
            30,
            Severity::High,
            "Builds a function dynamically from a string",
        ),
        PatternRule::new(
            "timer-eval",
            r#"(?i)setTimeout\s*\(\s*['"`][^)]*\beval\b"#,
            35,
            Severity::High,
            "Runs eval inside setTimeout",
        ),
        PatternRule::new(
            "document-write-script",
            r"(?i)document\.write\s*\([^)]*<script",
            30,
            Severity::High,
            "Injects a script via document.write",
        ),
        PatternRule::new(
            "hex-window-access",
            r#"(?i)window\[['"`]\\x[0-9a-f]{2}"#,
            28,
            Severity::High,
            "Accesses window properties through hex escapes",
        ),
        PatternRule::new(
            "char-code-string",
            r"String\.fromCharCode\s*\([^)]{30,}\)",
            18,
            Severity::Medium,
            "Builds a long string from character codes (possible obfuscation)",
        ),
        PatternRule::new(
            "hex-escape-run",
            r"\\x[0-9A-Fa-f]{2}.{5,}\\x[0-9A-Fa-f]{2}",
            20,
            Severity::Medium,
            "Consecutive hex escape sequences",
        ),
        PatternRule::new(
            "keystroke-credential",
            r#"(?i)addEventListener\s*\(\s*['"]key(down|press|up)['"][^}]{50,}(password|pass|pwd)"#,
            25,
            Severity::Medium,
            "Watches keystrokes near password handling",
        ),
        PatternRule::new(
            "paste-listener",
            r#"(?i)addEventListener\s*\(\s*['"]paste['"][^}]{30,}"#,
            15,
            Severity::Medium,
            "Watches clipboard paste events",
        ),
        PatternRule::new(
            "copy-listener",
            r#"(?i)document\.addEventListener\s*\(\s*['"]copy['"]"#,
            12,
            Severity::Medium,
            "Watches copy operations",
        ),
        PatternRule::new(
            "base64-decode",
            r"\batob\s*\([^)]{30,}\)",
            8,
            Severity::Low,
            "Decodes a long Base64 string",
        ),
    ]
});

/// Result of scanning a set of scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptScanReport {
    pub total_score: u32,
    pub warnings: Vec<Warning>,
    pub analyzed_count: usize,
    pub trusted_count: usize,
}

impl ScriptPatternDetector {
    /// Scan scripts belonging to `page`. External-target checks are
    /// relative to the page's own hostname.
    pub fn scan(&self, scripts: &[ScriptSource], page: &PageSnapshot) -> ScriptScanReport {
        let mut report = ScriptScanReport::default();

        for (index, script) in scripts.iter().enumerate() {
            if !script.src.is_empty() && is_trusted_library(&script.src) {
                report.trusted_count += 1;
                continue;
            }

            let content = script.content.as_str();
            if content.trim().is_empty() || content.chars().count() < MIN_CONTENT_LEN {
                continue;
            }

            report.analyzed_count += 1;
            let matches = evaluate_script(content, page);
            let script_score: u32 = matches.iter().map(|m| m.score).sum();

            if script_score < SCRIPT_SCORE_FLOOR {
                continue;
            }

            report.total_score = report.total_score.saturating_add(script_score);
            report
                .warnings
                .extend(matches.into_iter().map(|m| to_warning(m, index + 1)));
        }

        if !report.warnings.is_empty() {
            tracing::debug!(
                analyzed = report.analyzed_count,
                trusted = report.trusted_count,
                score = report.total_score,
                "script analysis flagged patterns"
            );
        }

        report
    }
}

impl Detector for ScriptPatternDetector {
    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            id: DetectorId::ScriptPatterns,
            name: "Script Patterns".into(),
            description: "Obfuscation, dynamic code execution and suspicious network calls in inline scripts"
                .into(),
            default_severity: Severity::High,
        }
    }

    fn analyze(&self, page: &PageSnapshot) -> Option<DetectorResult> {
        let report = self.scan(&page.scripts, page);
        if report.total_score == 0 {
            return None;
        }
        Some(DetectorResult {
            detector: DetectorId::ScriptPatterns,
            score: report.total_score,
            warnings: report.warnings,
        })
    }
}

/// Run every heuristic, including the network-call check, against one
/// script body. Pure function of `(content, page host)`.
pub fn evaluate_script(content: &str, page: &PageSnapshot) -> Vec<PatternMatch> {
    let mut matches: Vec<PatternMatch> = PATTERN_RULES
        .iter()
        .filter_map(|rule| rule.evaluate(content))
        .collect();
    if let Some(network) = network_calls::check_network_targets(content, page) {
        matches.push(network);
    }
    matches
}

fn to_warning(m: PatternMatch, script_index: usize) -> Warning {
    let mut warning = Warning::new(
        DetectorId::ScriptPatterns,
        m.severity,
        m.score,
        format!("Suspicious script pattern (script #{script_index})"),
        m.reason,
    );
    if let Some(snippet) = m.snippet {
        warning = warning.with_snippet(snippet);
    }
    if let Some(details) = m.details {
        warning = warning.with_details(details);
    }
    warning
}

fn is_trusted_library(src: &str) -> bool {
    let lower = src.to_lowercase();
    TRUSTED_LIBRARIES.iter().any(|lib| lower.contains(lib))
}

/// Up to 15 bytes of context either side of a match, whitespace collapsed.
pub(crate) fn extract_snippet(content: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(15);
    while !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + 15).min(content.len());
    while !content.is_char_boundary(to) {
        to += 1;
    }
    let collapsed = content[from..to].split_whitespace().collect::<Vec<_>>().join(" ");
    format!("...{collapsed}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page() -> PageSnapshot {
        PageSnapshot::new("https://shop.example.com/checkout")
    }

    const OBFUSCATED: &str = "var _0x1a2b = _0x3c4d + 1; var data = ['alpha','beta']; \
                              function(_0xabc){ return 1; }";

    #[test]
    fn flags_obfuscated_script() {
        let report = ScriptPatternDetector.scan(&[ScriptSource::inline(OBFUSCATED)], &page());
        assert_eq!(report.analyzed_count, 1);
        assert!(report.total_score >= 50);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.description.contains("_0x identifiers")));
        assert!(report.warnings.iter().all(|w| w.snippet.is_some()));
    }

    #[test]
    fn skips_trusted_library_by_src() {
        let script = ScriptSource {
            src: "https://code.jquery.com/jquery-3.7.1.min.js".into(),
            content: OBFUSCATED.into(),
        };
        let report = ScriptPatternDetector.scan(&[script], &page());
        assert_eq!(report.trusted_count, 1);
        assert_eq!(report.analyzed_count, 0);
        assert_eq!(report.total_score, 0);
    }

    #[test]
    fn skips_short_content() {
        let report =
            ScriptPatternDetector.scan(&[ScriptSource::inline("eval(someLongArgument1)")], &page());
        assert_eq!(report.analyzed_count, 0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn sub_floor_script_is_discounted() {
        // copy listener alone scores 12, below the floor of 15
        let content = "document.addEventListener('copy', function(e) { console.log('copied text'); });";
        let report = ScriptPatternDetector.scan(&[ScriptSource::inline(content)], &page());
        assert_eq!(report.analyzed_count, 1);
        assert_eq!(report.total_score, 0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn rule_contributes_once_per_script() {
        let content = "eval(decodeURIComponent(payloadOne)); eval(decodeURIComponent(payloadTwo)); //pad";
        let matches = evaluate_script(content, &page());
        let evals = matches
            .iter()
            .filter(|m| m.rule_id == "eval-long-argument")
            .count();
        assert_eq!(evals, 1);
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let content = "ああああああああ eval(x) ああああああああ";
        let start = content.find("eval").unwrap();
        let snippet = extract_snippet(content, start, start + 7);
        assert!(snippet.starts_with("..."));
        assert!(snippet.contains("eval(x)"));
    }

    proptest! {
        #[test]
        fn scan_is_idempotent(body in "[ -~]{0,200}") {
            let scripts = vec![
                ScriptSource::inline(format!("{body} {OBFUSCATED}")),
                ScriptSource::inline(body.clone()),
            ];
            let first = ScriptPatternDetector.scan(&scripts, &page());
            let second = ScriptPatternDetector.scan(&scripts, &page());
            prop_assert_eq!(first, second);
        }
    }
}
