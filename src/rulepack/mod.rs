//! Declarative rule packs.
//!
//! A rule pack is a JSON document `{manifest_version, meta: {name}, rules: [...]}`
//! supplied by the user. Packs are validated as a whole: one bad rule or
//! an unknown manifest version rejects the entire pack and leaves the
//! previously loaded rules untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use walkdir::WalkDir;

use crate::error::{Result, SentryError};
use crate::page::host_matches;
use crate::rules::{DetectorId, DetectorResult, Severity, Warning};

/// The only manifest version this engine understands.
pub const MANIFEST_VERSION: i64 = 1;

/// Score used when a rule omits one (or sets it to zero).
const DEFAULT_RULE_SCORE: u32 = 10;

/// How many `dom_content` keywords must be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[default]
    Any,
    All,
}

/// A validated rule. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionRule {
    pub id: String,
    pub kind: RuleKind,
    pub score: u32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Host equals or is a subdomain of `pattern`: suppress the warning.
    Allowlist { pattern: String },
    /// `pattern` is a substring of the full URL.
    UrlKeyword { pattern: String },
    /// Page text contains any/all of `keywords`.
    DomContent {
        keywords: Vec<String>,
        condition: Condition,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawRuleType {
    Allowlist,
    UrlKeyword,
    DomContent,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    rule_type: RawRuleType,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    condition: Condition,
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    manifest_version: Option<i64>,
    #[serde(default)]
    meta: RawMeta,
    #[serde(default)]
    rules: Option<Vec<serde_json::Value>>,
}

/// Summary of an accepted pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSummary {
    pub name: String,
    pub rule_count: usize,
    /// SHA-256 of the pack source, hex encoded.
    pub digest: String,
}

/// Outcome of evaluating all loaded rules against a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    pub score: u32,
    pub warnings: Vec<Warning>,
    /// Set by any matching allowlist rule. Callers treat it as an
    /// override that suppresses the warning even when `score > 0`.
    pub is_allowed: bool,
}

impl RuleOutcome {
    pub fn into_result(self) -> Option<DetectorResult> {
        if self.score == 0 && self.warnings.is_empty() {
            return None;
        }
        Some(DetectorResult {
            detector: DetectorId::RulePack,
            score: self.score,
            warnings: self.warnings,
        })
    }
}

/// Evaluates user-supplied declarative rules.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    loaded_rules: Vec<DetectionRule>,
    packs: Vec<PackSummary>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded_rules(&self) -> &[DetectionRule] {
        &self.loaded_rules
    }

    pub fn packs(&self) -> &[PackSummary] {
        &self.packs
    }

    /// Parse, validate and load a serialized rule pack. Fails closed: on
    /// any error no rule from the pack is added.
    pub fn load_plugin(&mut self, source: &str) -> Result<PackSummary> {
        let (name, rules) = parse_manifest(source)?;

        let summary = PackSummary {
            name: name.unwrap_or_else(|| "unnamed".into()),
            rule_count: rules.len(),
            digest: hex::encode(Sha256::digest(source.as_bytes())),
        };

        let short_digest = &summary.digest[..12];
        tracing::info!(
            pack = %summary.name,
            rules = summary.rule_count,
            digest = short_digest,
            "rule pack loaded"
        );

        self.loaded_rules.extend(rules);
        self.packs.push(summary.clone());
        Ok(summary)
    }

    /// Load every `*.json` pack under `dir`. Rejected packs are logged and
    /// skipped; the accepted summaries are returned.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<PackSummary>> {
        let mut loaded = Vec::new();
        let mut paths: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|x| x == "json").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            let source = std::fs::read_to_string(&path)?;
            match self.load_plugin(&source) {
                Ok(summary) => loaded.push(summary),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "rule pack rejected, skipping"
                    );
                }
            }
        }

        Ok(loaded)
    }

    /// Evaluate all loaded rules. Every matching rule contributes; an
    /// allowlist hit does not stop evaluation.
    pub fn execute_rules(&self, url: &str, page_text: &str) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        let text = page_text.to_lowercase();

        for rule in &self.loaded_rules {
            match &rule.kind {
                RuleKind::Allowlist { pattern } => {
                    if !host.is_empty() && host_matches(&host, pattern) {
                        outcome.is_allowed = true;
                    }
                }
                RuleKind::UrlKeyword { pattern } => {
                    if url.contains(pattern.as_str()) {
                        let description = rule.message.clone().unwrap_or_else(|| {
                            format!("URL contains suspicious pattern \"{pattern}\"")
                        });
                        push_hit(&mut outcome, rule, description);
                    }
                }
                RuleKind::DomContent {
                    keywords,
                    condition,
                } => {
                    let hits = keywords
                        .iter()
                        .filter(|k| text.contains(&k.to_lowercase()))
                        .count();
                    let matched = match condition {
                        Condition::All => hits == keywords.len(),
                        Condition::Any => hits > 0,
                    };
                    if matched {
                        let description = rule.message.clone().unwrap_or_else(|| {
                            "Page contains a suspicious set of keywords".into()
                        });
                        push_hit(&mut outcome, rule, description);
                    }
                }
            }
        }

        outcome
    }
}

fn push_hit(outcome: &mut RuleOutcome, rule: &DetectionRule, description: String) {
    outcome.score = outcome.score.saturating_add(rule.score);
    outcome.warnings.push(
        Warning::new(
            DetectorId::RulePack,
            Severity::Medium,
            rule.score,
            format!("Plugin rule: {}", rule.id),
            description,
        )
        .with_icon("🧩"),
    );
}

/// Validate a pack without loading it.
pub fn parse_pack(source: &str) -> Result<Vec<DetectionRule>> {
    parse_manifest(source).map(|(_, rules)| rules)
}

fn parse_manifest(source: &str) -> Result<(Option<String>, Vec<DetectionRule>)> {
    let manifest: RawManifest = serde_json::from_str(source)?;

    let version = manifest.manifest_version.unwrap_or(0);
    if version != MANIFEST_VERSION {
        return Err(SentryError::UnsupportedManifestVersion {
            found: version,
            expected: MANIFEST_VERSION,
        });
    }

    let raw_rules = manifest.rules.ok_or(SentryError::MissingRules)?;

    let rules = raw_rules
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let raw: RawRule =
                serde_json::from_value(value).map_err(|e| SentryError::InvalidRule {
                    index,
                    message: e.to_string(),
                })?;
            validate_rule(index, raw)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((manifest.meta.name, rules))
}

fn validate_rule(index: usize, raw: RawRule) -> Result<DetectionRule> {
    let invalid = |message: &str| SentryError::InvalidRule {
        index,
        message: message.into(),
    };

    let pattern = raw.pattern.filter(|p| !p.is_empty());
    let kind = match raw.rule_type {
        RawRuleType::DomContent => {
            let keywords: Vec<String> = raw.keywords.into_iter().filter(|k| !k.is_empty()).collect();
            if keywords.is_empty() {
                return Err(invalid("dom_content rule requires non-empty keywords"));
            }
            RuleKind::DomContent {
                keywords,
                condition: raw.condition,
            }
        }
        RawRuleType::Allowlist => RuleKind::Allowlist {
            pattern: pattern
                .ok_or_else(|| invalid("allowlist rule requires a pattern"))?
                .to_lowercase(),
        },
        RawRuleType::UrlKeyword => RuleKind::UrlKeyword {
            pattern: pattern.ok_or_else(|| invalid("url_keyword rule requires a pattern"))?,
        },
    };

    Ok(DetectionRule {
        id: raw.id.unwrap_or_else(|| format!("rule-{}", index + 1)),
        kind,
        score: raw.score.filter(|s| *s > 0).unwrap_or(DEFAULT_RULE_SCORE),
        message: raw.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PACK: &str = r#"{
        "manifest_version": 1,
        "meta": { "name": "crypto-scams" },
        "rules": [
            { "id": "trusted", "type": "allowlist", "pattern": "example.com" },
            { "id": "airdrop", "type": "url_keyword", "pattern": "free-airdrop", "score": 40,
              "message": "Airdrop scam URL" },
            { "id": "seed", "type": "dom_content", "keywords": ["seed phrase", "wallet"],
              "condition": "all", "score": 30 },
            { "id": "giveaway", "type": "dom_content", "keywords": ["giveaway", "double your"] }
        ]
    }"#;

    fn engine() -> RuleEngine {
        let mut engine = RuleEngine::new();
        engine.load_plugin(PACK).unwrap();
        engine
    }

    #[test]
    fn loads_pack_and_records_digest() {
        let engine = engine();
        assert_eq!(engine.loaded_rules().len(), 4);
        assert_eq!(engine.packs()[0].name, "crypto-scams");
        assert_eq!(engine.packs()[0].digest.len(), 64);
    }

    #[test]
    fn version_mismatch_rejected_atomically() {
        let mut engine = engine();
        let before = engine.loaded_rules().to_vec();
        let bad = PACK.replace("\"manifest_version\": 1", "\"manifest_version\": 2");
        let err = engine.load_plugin(&bad).unwrap_err();
        assert!(matches!(
            err,
            SentryError::UnsupportedManifestVersion {
                found: 2,
                expected: 1
            }
        ));
        assert_eq!(engine.loaded_rules(), before.as_slice());
    }

    #[test]
    fn missing_rules_array_rejected() {
        let err = RuleEngine::new()
            .load_plugin(r#"{"manifest_version": 1, "meta": {"name": "x"}}"#)
            .unwrap_err();
        assert!(matches!(err, SentryError::MissingRules));
    }

    #[test]
    fn one_bad_rule_rejects_whole_pack() {
        let mut engine = RuleEngine::new();
        let src = r#"{"manifest_version": 1, "rules": [
            {"id": "ok", "type": "url_keyword", "pattern": "x"},
            {"id": "bad", "type": "dom_content", "keywords": []}
        ]}"#;
        let err = engine.load_plugin(src).unwrap_err();
        assert!(matches!(err, SentryError::InvalidRule { index: 1, .. }));
        assert!(engine.loaded_rules().is_empty());
    }

    #[test]
    fn unknown_rule_type_rejected() {
        let src = r#"{"manifest_version": 1, "rules": [{"type": "exec", "pattern": "x"}]}"#;
        assert!(parse_pack(src).is_err());
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(RuleEngine::new().load_plugin("{not json").is_err());
    }

    #[test]
    fn allowlist_does_not_stop_scoring() {
        let outcome = engine().execute_rules(
            "https://promo.example.com/free-airdrop",
            "Enter your SEED PHRASE to unlock the wallet",
        );
        assert!(outcome.is_allowed);
        assert_eq!(outcome.score, 40 + 30);
        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(outcome.warnings[0].description, "Airdrop scam URL");
    }

    #[test]
    fn condition_all_requires_every_keyword() {
        let outcome = engine().execute_rules("https://other.net/", "your wallet is ready");
        assert_eq!(outcome.score, 0);
        assert!(!outcome.is_allowed);
    }

    #[test]
    fn condition_any_uses_default_score() {
        let outcome = engine().execute_rules("https://other.net/", "Huge GIVEAWAY today");
        assert_eq!(outcome.score, DEFAULT_RULE_SCORE);
    }

    #[test]
    fn huge_rule_scores_saturate() {
        let mut engine = RuleEngine::new();
        engine
            .load_plugin(
                r#"{"manifest_version": 1, "rules": [
                    {"type": "url_keyword", "pattern": "ab", "score": 4000000000},
                    {"type": "url_keyword", "pattern": "example", "score": 4000000000}
                ]}"#,
            )
            .unwrap();
        let outcome = engine.execute_rules("https://ab.example/", "");
        assert_eq!(outcome.score, u32::MAX);
        assert_eq!(outcome.into_result().unwrap().score, u32::MAX);
    }

    #[test]
    fn allowlist_is_suffix_match_not_substring() {
        let outcome = engine().execute_rules("https://example.com.evil.net/", "");
        assert!(!outcome.is_allowed);
    }

    #[test]
    fn load_dir_skips_rejected_packs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), PACK).unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            PACK.replace("\"manifest_version\": 1", "\"manifest_version\": 7"),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut engine = RuleEngine::new();
        let loaded = engine.load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(engine.loaded_rules().len(), 4);
    }
}
