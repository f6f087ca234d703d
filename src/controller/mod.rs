//! Page-level decision pipeline.
//!
//! One `DecisionController` lives per page context. A check cycle runs
//! `Idle -> Scanning -> Scored` and ends either `Suppressed` (returning to
//! `Idle`) or `Warned`, where it stays until the user dismisses the
//! warning, trusts the domain or navigates away.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{analyze_with_timeout, AnalyzeRequest, Offline, RemoteAnalyzer};
use crate::config::{Config, LogEntry};
use crate::gesture::{Anchor, AnchorOutcome, GestureRateLimiter, WindowOpenVerdict};
use crate::page::PageSnapshot;
use crate::rulepack::RuleEngine;
use crate::rules::{DetectorRegistry, DetectorResult};
use crate::scoring::{build_result, AnalysisResult};

/// URL prefixes of browser-internal pages that are never scanned.
const SKIPPED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "moz-extension://",
    "edge://",
    "about:",
    "file://",
];

/// Local hosts that are never scanned.
const SKIPPED_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Browser-internal and local pages are left alone.
pub fn is_skipped_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    if SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    url::Url::parse(&lower)
        .ok()
        .and_then(|u| u.host_str().map(|h| SKIPPED_HOSTS.contains(&h)))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
    Scored,
    Suppressed,
    Warned,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Scored => "scored",
            Self::Suppressed => "suppressed",
            Self::Warned => "warned",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Browser-internal or local page; nothing was scanned.
    UnsupportedUrl,
    Whitelisted,
    BelowThreshold,
    /// A rule-pack allowlist rule matched.
    AllowlistOverride,
    /// A warning is already on screen.
    WarningActive,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedUrl => "page is not scannable",
            Self::Whitelisted => "domain is trusted",
            Self::BelowThreshold => "score is below the warning threshold",
            Self::AllowlistOverride => "allowed by a rule pack",
            Self::WarningActive => "a warning is already displayed",
        };
        f.write_str(s)
    }
}

/// Outcome of one check cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Warned {
        result: AnalysisResult,
    },
    Suppressed {
        reason: SuppressReason,
        result: Option<AnalysisResult>,
    },
}

impl Decision {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Warned { result } => Some(result),
            Self::Suppressed { result, .. } => result.as_ref(),
        }
    }

    pub fn is_warned(&self) -> bool {
        matches!(self, Self::Warned { .. })
    }
}

/// Trailing-edge debounce over millisecond timestamps.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: u64,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Each trigger pushes the deadline back.
    pub fn trigger(&mut self, now_ms: u64) {
        self.deadline = Some(now_ms + self.delay_ms);
    }

    /// Fires once when the deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

pub struct DecisionController {
    config: Config,
    registry: DetectorRegistry,
    rule_engine: RuleEngine,
    backend: Box<dyn RemoteAnalyzer>,
    state: ScanState,
    active_warning: Option<AnalysisResult>,
    initialized: bool,
    rescan: Debouncer,
    gestures: GestureRateLimiter,
}

impl DecisionController {
    /// Controller with the given backend. Timestamps passed to the
    /// time-dependent methods are milliseconds since the page context
    /// started.
    pub fn new(config: Config, backend: Box<dyn RemoteAnalyzer>) -> Self {
        let registry = DetectorRegistry::with_enabled(&config.enabled_plugins);
        let rescan = Debouncer::new(config.rescan_debounce_ms);
        Self {
            config,
            registry,
            rule_engine: RuleEngine::new(),
            backend,
            state: ScanState::Idle,
            active_warning: None,
            initialized: false,
            rescan,
            gestures: GestureRateLimiter::new(0),
        }
    }

    pub fn offline(config: Config) -> Self {
        Self::new(config, Box::new(Offline))
    }

    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.rule_engine = engine;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn active_warning(&self) -> Option<&AnalysisResult> {
        self.active_warning.as_ref()
    }

    pub fn rule_engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.rule_engine
    }

    /// A real input event on the page (click, keydown, touchstart).
    pub fn record_gesture(&mut self, now_ms: u64) {
        self.gestures.record_gesture(now_ms);
    }

    /// Gate an anchor the page just inserted.
    pub fn on_anchor_inserted(&mut self, anchor: &mut Anchor, now_ms: u64) -> AnchorOutcome {
        self.gestures.inspect_anchor(anchor, now_ms)
    }

    /// Gate a programmatic `window.open`.
    pub fn on_window_open(&mut self, now_ms: u64) -> WindowOpenVerdict {
        self.gestures.on_window_open(now_ms)
    }

    /// First page-ready check. Later calls are no-ops and return `None`.
    pub async fn initialize(&mut self, page: &PageSnapshot) -> Option<Decision> {
        if self.initialized {
            tracing::debug!("controller already initialized");
            return None;
        }
        self.initialized = true;
        Some(self.check_page(page).await)
    }

    /// Record a newly inserted form; the rescan fires from `poll_rescan`.
    pub fn notify_form_inserted(&mut self, now_ms: u64) {
        self.rescan.trigger(now_ms);
    }

    /// Run the debounced rescan if it is due.
    pub async fn poll_rescan(&mut self, now_ms: u64, page: &PageSnapshot) -> Option<Decision> {
        if !self.rescan.poll(now_ms) {
            return None;
        }
        Some(self.check_page(page).await)
    }

    /// Run a full check cycle over `page`.
    pub async fn check_page(&mut self, page: &PageSnapshot) -> Decision {
        if is_skipped_url(&page.url) {
            tracing::debug!(url = %page.url, "skipping unsupported page");
            return Decision::Suppressed {
                reason: SuppressReason::UnsupportedUrl,
                result: None,
            };
        }

        let warning_active = self.active_warning.is_some();
        if !warning_active {
            self.transition(ScanState::Scanning);
        }

        let (result, allowed) = self.score(page).await;

        if warning_active {
            tracing::debug!(
                score = result.total_score,
                "warning already displayed, not stacking another"
            );
            return Decision::Suppressed {
                reason: SuppressReason::WarningActive,
                result: Some(result),
            };
        }

        self.transition(ScanState::Scored);

        let suppress = if self.config.is_whitelisted(&page.hostname()) {
            Some(SuppressReason::Whitelisted)
        } else if allowed {
            Some(SuppressReason::AllowlistOverride)
        } else if result.total_score < self.config.min_score_to_warn {
            Some(SuppressReason::BelowThreshold)
        } else {
            None
        };

        if let Some(reason) = suppress {
            self.transition(ScanState::Suppressed);
            self.transition(ScanState::Idle);
            tracing::debug!(score = result.total_score, %reason, "page check suppressed");
            return Decision::Suppressed {
                reason,
                result: Some(result),
            };
        }

        tracing::warn!(
            url = %page.url,
            score = result.total_score,
            severity = %result.severity,
            warnings = result.warnings.len(),
            "page flagged"
        );
        self.config
            .detection_log
            .push(LogEntry::from_result(&page.url, &result));
        self.active_warning = Some(result.clone());
        self.transition(ScanState::Warned);
        Decision::Warned { result }
    }

    /// Collect remote, local and rule-pack results in that order.
    async fn score(&self, page: &PageSnapshot) -> (AnalysisResult, bool) {
        let mut results: Vec<DetectorResult> = Vec::new();

        let request = AnalyzeRequest::from_page(page, &self.config.enabled_plugins);
        let remote = analyze_with_timeout(
            self.backend.as_ref(),
            &request,
            self.config.backend.timeout(),
        )
        .await;
        let remote_message = remote.as_ref().and_then(|r| r.recommendation_message());
        if let Some(r) = remote.as_ref().and_then(|r| r.to_detector_result()) {
            results.push(r);
        }

        results.extend(self.registry.run(page));

        let outcome = self.rule_engine.execute_rules(&page.url, &page.body_text);
        let allowed = outcome.is_allowed;
        if let Some(r) = outcome.into_result() {
            results.push(r);
        }

        (build_result(&results, remote_message), allowed)
    }

    /// Close the warning without trusting the domain.
    pub fn dismiss(&mut self) {
        if self.active_warning.take().is_some() {
            self.transition(ScanState::Idle);
        }
    }

    /// Add `domain` to the whitelist and close the warning.
    pub fn trust_domain(&mut self, domain: &str) {
        if self.config.add_to_whitelist(domain) {
            tracing::info!(domain, "domain added to whitelist");
        }
        self.dismiss();
    }

    /// Leave the page: all per-page state starts over.
    pub fn navigate_away(&mut self) {
        self.active_warning = None;
        self.initialized = false;
        self.rescan.cancel();
        self.gestures = GestureRateLimiter::new(0);
        self.transition(ScanState::Idle);
    }

    fn transition(&mut self, to: ScanState) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "scan state");
            self.state = to;
        }
    }
}
