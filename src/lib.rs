//! PageSentry: phishing, malicious-script and drive-by download detection
//! for web pages.
//!
//! A page is captured as a [`page::PageSnapshot`], scored by the built-in
//! detectors, optional user rule packs and an optional remote backend, and
//! turned into a warn/suppress [`controller::Decision`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use pagesentry::{scan_page, page::PageSnapshot, ScanOptions};
//!
//! # async fn run() -> pagesentry::error::Result<()> {
//! let page = PageSnapshot::load(Path::new("snapshot.json"))?;
//! let report = scan_page(&page, &ScanOptions::default()).await?;
//! println!("Score: {:?}", report.decision.result().map(|r| r.total_score));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod gesture;
pub mod guard;
pub mod output;
pub mod page;
pub mod rulepack;
pub mod rules;
pub mod scoring;

use std::path::{Path, PathBuf};

use backend::{Offline, RemoteAnalyzer};
use config::Config;
use controller::{Decision, DecisionController};
use error::Result;
use output::OutputFormat;
use page::PageSnapshot;
use rulepack::{PackSummary, RuleEngine};

/// Options for a page scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Path to config file (defaults to `.pagesentry.toml` in the working directory).
    pub config_path: Option<PathBuf>,
    /// Overrides the configured backend URL.
    pub backend_url: Option<String>,
    /// Rule-pack files or directories to load.
    pub rules: Vec<PathBuf>,
}

/// Result of scanning one page.
#[derive(Debug)]
pub struct PageReport {
    pub url: String,
    pub decision: Decision,
    pub packs: Vec<PackSummary>,
    pub show_detailed_warnings: bool,
}

/// Run the full decision pipeline over one snapshot.
pub async fn scan_page(page: &PageSnapshot, options: &ScanOptions) -> Result<PageReport> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(".pagesentry.toml"));
    let mut config = Config::load(&config_path)?;

    if let Some(url) = &options.backend_url {
        config.backend.url = Some(url.clone());
    }

    let mut engine = RuleEngine::new();
    let mut packs = Vec::new();
    for path in &options.rules {
        packs.extend(load_rules(&mut engine, path)?);
    }

    let show_detailed_warnings = config.show_detailed_warnings;
    let backend = build_backend(&config)?;
    let mut controller = DecisionController::new(config, backend).with_rule_engine(engine);
    let decision = controller.check_page(page).await;

    Ok(PageReport {
        url: page.url.clone(),
        decision,
        packs,
        show_detailed_warnings,
    })
}

/// Load one rule-pack file, or every pack under a directory.
pub fn load_rules(engine: &mut RuleEngine, path: &Path) -> Result<Vec<PackSummary>> {
    if path.is_dir() {
        engine.load_dir(path)
    } else {
        let source = std::fs::read_to_string(path)?;
        Ok(vec![engine.load_plugin(&source)?])
    }
}

/// Backend selected by the configuration.
pub fn build_backend(config: &Config) -> Result<Box<dyn RemoteAnalyzer>> {
    match &config.backend.url {
        #[cfg(feature = "http-backend")]
        Some(url) => Ok(Box::new(backend::HttpBackend::new(
            url,
            config.backend.timeout(),
        )?)),
        #[cfg(not(feature = "http-backend"))]
        Some(url) => {
            tracing::warn!(url = %url, "built without http-backend, running offline");
            Ok(Box::new(Offline))
        }
        None => Ok(Box::new(Offline)),
    }
}

/// Render a page report in the specified format.
pub fn render_report(report: &PageReport, format: OutputFormat) -> Result<String> {
    output::render(
        &report.url,
        &report.decision,
        format,
        report.show_detailed_warnings,
    )
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::page::{FormInfo, ScriptSource};
    use crate::rules::Severity;

    fn options_in(dir: &Path) -> ScanOptions {
        ScanOptions {
            config_path: Some(dir.join(".pagesentry.toml")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn clean_page_is_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let page = PageSnapshot {
            title: "Recipes".into(),
            body_text: "Slow-cooked beans with garlic".into(),
            ..PageSnapshot::new("https://recipes.example.org/beans")
        };
        let report = scan_page(&page, &options_in(dir.path())).await.unwrap();
        assert!(!report.decision.is_warned());
        assert_eq!(report.decision.result().unwrap().severity, Severity::Info);
    }

    #[tokio::test]
    async fn phishing_kit_page_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let page = PageSnapshot {
            title: "Microsoft account".into(),
            has_password_field: true,
            forms: vec![FormInfo {
                action: Some("http://secure-login-verify-now.example/collect".into()),
                method: Some("post".into()),
                has_password_field: true,
                has_email_field: true,
            }],
            scripts: vec![ScriptSource::inline(
                "document.addEventListener('copy', function(){ var t = 'x'; report(t); });",
            )],
            ..PageSnapshot::new("https://ms-office365-signin.example/")
        };
        let report = scan_page(&page, &options_in(dir.path())).await.unwrap();
        let result = report.decision.result().unwrap();
        assert!(report.decision.is_warned());
        assert_eq!(result.severity, Severity::Critical);
        let rendered = render_report(&report, OutputFormat::Console).unwrap();
        assert!(rendered.contains("Decision: WARN"));
    }

    #[tokio::test]
    async fn rule_packs_contribute_and_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let pack = dir.path().join("pack.json");
        std::fs::write(
            &pack,
            r#"{"manifest_version": 1, "meta": {"name": "lottery"},
                "rules": [{"type": "dom_content", "keywords": ["you won"], "score": 40}]}"#,
        )
        .unwrap();
        let page = PageSnapshot {
            body_text: "Congratulations, YOU WON a prize".into(),
            ..PageSnapshot::new("https://prize.example.net/")
        };
        let options = ScanOptions {
            rules: vec![pack],
            ..options_in(dir.path())
        };
        let report = scan_page(&page, &options).await.unwrap();
        assert_eq!(report.packs[0].name, "lottery");
        assert!(report.decision.is_warned());
        assert_eq!(report.decision.result().unwrap().total_score, 40);
    }
}
