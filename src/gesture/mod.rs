//! Gesture-gated rate limiting for automated downloads and popups.
//!
//! The limiter is a fixed-interval leaky bucket: the automated-action
//! counter is zeroed at every multiple of [`OBSERVE_WINDOW_MS`] since the
//! limiter was created, whatever happened in between. A burst that
//! straddles a boundary is split across two windows and may slip under
//! the threshold.
//!
//! All methods take the current time in milliseconds so the limiter is
//! deterministic under test.

use serde::{Deserialize, Serialize};

/// Automated download links tolerated per window.
pub const MAX_AUTO_LINKS: u32 = 5;
/// Automated window opens tolerated before blocking starts.
pub const MAX_AUTO_WINDOW_OPENS: u32 = 2;
/// Counter reset interval.
pub const OBSERVE_WINDOW_MS: u64 = 3000;
/// A gesture counts as recent for this long.
pub const GESTURE_GRACE_MS: u64 = 1000;

/// Replacement `href` for a neutralized link.
pub const INERT_HREF: &str = "javascript:void(0)";

/// An anchor element as seen by the mutation observer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub href: String,
    pub has_download: bool,
    #[serde(default)]
    pub pointer_events_disabled: bool,
    /// Set once the anchor has been inspected.
    #[serde(default)]
    pub checked: bool,
}

impl Anchor {
    pub fn download(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            has_download: true,
            ..Default::default()
        }
    }

    fn neutralize(&mut self) {
        self.href = INERT_HREF.to_string();
        self.pointer_events_disabled = true;
        self.has_download = false;
    }

    pub fn is_neutralized(&self) -> bool {
        self.href == INERT_HREF && !self.has_download
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorOutcome {
    /// Inspected on an earlier call.
    AlreadyChecked,
    /// Left intact.
    Passed,
    Neutralized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowOpenVerdict {
    Allow,
    /// The open call yields no window handle.
    Block,
}

#[derive(Debug, Clone)]
pub struct GestureRateLimiter {
    origin_ms: u64,
    window_index: u64,
    auto_count: u32,
    last_gesture_ms: Option<u64>,
}

impl GestureRateLimiter {
    pub fn new(now_ms: u64) -> Self {
        Self {
            origin_ms: now_ms,
            window_index: 0,
            auto_count: 0,
            last_gesture_ms: None,
        }
    }

    /// Record a real input event (click, keydown, touchstart).
    pub fn record_gesture(&mut self, now_ms: u64) {
        self.last_gesture_ms = Some(now_ms);
    }

    pub fn has_recent_gesture(&self, now_ms: u64) -> bool {
        self.last_gesture_ms
            .map(|t| now_ms.saturating_sub(t) < GESTURE_GRACE_MS)
            .unwrap_or(false)
    }

    /// Automated actions seen in the current window.
    pub fn automated_count(&mut self, now_ms: u64) -> u32 {
        self.roll_window(now_ms);
        self.auto_count
    }

    /// True when the current window has exceeded the link threshold and
    /// no gesture is recent.
    pub fn should_suppress_automated_action(&mut self, now_ms: u64) -> bool {
        self.roll_window(now_ms);
        !self.has_recent_gesture(now_ms) && self.auto_count > MAX_AUTO_LINKS
    }

    /// Inspect a newly inserted anchor. Only `download` anchors without a
    /// recent gesture are counted; once the count passes
    /// [`MAX_AUTO_LINKS`] they are neutralized.
    pub fn inspect_anchor(&mut self, anchor: &mut Anchor, now_ms: u64) -> AnchorOutcome {
        if anchor.checked {
            return AnchorOutcome::AlreadyChecked;
        }
        anchor.checked = true;

        if !anchor.has_download || self.has_recent_gesture(now_ms) {
            return AnchorOutcome::Passed;
        }

        self.roll_window(now_ms);
        self.auto_count += 1;
        if self.auto_count > MAX_AUTO_LINKS {
            tracing::warn!(
                href = %anchor.href,
                count = self.auto_count,
                "download spam detected, link neutralized"
            );
            anchor.neutralize();
            AnchorOutcome::Neutralized
        } else {
            AnchorOutcome::Passed
        }
    }

    /// Gate a programmatic `window.open`. The first opens in a window
    /// pass; after [`MAX_AUTO_WINDOW_OPENS`] automated actions further
    /// opens without a gesture are blocked. Links and opens share one
    /// counter.
    pub fn on_window_open(&mut self, now_ms: u64) -> WindowOpenVerdict {
        self.roll_window(now_ms);
        let gesture = self.has_recent_gesture(now_ms);
        if !gesture && self.auto_count > MAX_AUTO_WINDOW_OPENS {
            tracing::warn!(count = self.auto_count, "window.open without user gesture blocked");
            return WindowOpenVerdict::Block;
        }
        if !gesture {
            self.auto_count += 1;
        }
        WindowOpenVerdict::Allow
    }

    fn roll_window(&mut self, now_ms: u64) {
        let index = now_ms.saturating_sub(self.origin_ms) / OBSERVE_WINDOW_MS;
        if index != self.window_index {
            self.window_index = index;
            self.auto_count = 0;
        }
    }
}
