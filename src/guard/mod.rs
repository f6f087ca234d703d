//! Download guard and its messaging surface.
//!
//! The guard owns the download mode and the classifier, applies verdicts
//! through a [`DownloadHost`] and answers status queries from the
//! settings UI.

use serde::{Deserialize, Serialize};

use crate::download::{
    Classification, DownloadClassifier, DownloadEvent, DownloadMode, DownloadStats,
};

/// Browser-side operations the guard needs.
pub trait DownloadHost {
    /// Cancel an in-flight download.
    fn cancel(&mut self, id: u64) -> Result<(), String>;
    /// Show a user notification.
    fn notify(&mut self, title: &str, message: &str);
}

/// Request from the popup or settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetDbdStatus,
    DbdModeChanged { enabled: bool },
    TestDownloadBlock,
    GetStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    Status {
        enable_dbd: bool,
        stats: DownloadStats,
    },
    #[serde(rename_all = "camelCase")]
    ModeChanged { success: bool, current_mode: bool },
    Ack { success: bool },
    Stats { stats: DownloadStats },
}

/// What happened to a download after the verdict was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardOutcome {
    pub classification: Classification,
    /// Set when the host failed to cancel a blocked download.
    pub cancel_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadGuard {
    mode: DownloadMode,
    classifier: DownloadClassifier,
}

impl DownloadGuard {
    pub fn new(enable_dbd: bool) -> Self {
        Self {
            mode: DownloadMode::from_enable_dbd(enable_dbd),
            classifier: DownloadClassifier::new(),
        }
    }

    pub fn mode(&self) -> DownloadMode {
        self.mode
    }

    pub fn stats(&self) -> &DownloadStats {
        self.classifier.stats()
    }

    /// Classify a newly created download and apply the verdict. A failed
    /// cancel is reported to the user; the counters keep the block.
    pub fn on_download_created<H: DownloadHost>(
        &mut self,
        event: &DownloadEvent,
        host: &mut H,
    ) -> GuardOutcome {
        let classification = self.classifier.classify(event, self.mode);
        let mut cancel_error = None;

        if classification.is_block() {
            match host.cancel(event.id) {
                Ok(()) => host.notify(
                    "Download blocked",
                    &format!("{}\nFile: {}", classification.reason, event.basename()),
                ),
                Err(e) => {
                    tracing::warn!(id = event.id, error = %e, "failed to cancel blocked download");
                    host.notify(
                        "Download could not be stopped",
                        &format!("{}\nFile: {} ({e})", classification.reason, event.basename()),
                    );
                    cancel_error = Some(e);
                }
            }
        }

        GuardOutcome {
            classification,
            cancel_error,
        }
    }

    /// A storage change of `enableDbd`.
    pub fn on_storage_changed<H: DownloadHost>(&mut self, enable_dbd: bool, host: &mut H) {
        let previous = self.mode;
        self.mode = DownloadMode::from_enable_dbd(enable_dbd);
        tracing::info!(from = %previous, to = %self.mode, "download mode changed");
        host.notify("Mode changed", &format!("Switched to {} mode", self.mode));
    }

    /// Answer a request from the settings UI.
    pub fn handle<H: DownloadHost>(&mut self, request: &Request, host: &mut H) -> Response {
        match request {
            Request::GetDbdStatus => Response::Status {
                enable_dbd: self.mode.is_full_block(),
                stats: self.stats().clone(),
            },
            Request::DbdModeChanged { enabled } => {
                self.mode = DownloadMode::from_enable_dbd(*enabled);
                tracing::info!(mode = %self.mode, "download mode set by settings UI");
                Response::ModeChanged {
                    success: true,
                    current_mode: *enabled,
                }
            }
            Request::TestDownloadBlock => {
                host.notify(
                    "Test notification",
                    &format!(
                        "Current mode: {}\nBlocked downloads: {}",
                        self.mode,
                        self.stats().total_blocked
                    ),
                );
                Response::Ack { success: true }
            }
            Request::GetStats => Response::Stats {
                stats: self.stats().clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{BlockReason, Verdict};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingHost {
        cancelled: Vec<u64>,
        notices: Vec<(String, String)>,
        fail_cancel: bool,
    }

    impl DownloadHost for RecordingHost {
        fn cancel(&mut self, id: u64) -> Result<(), String> {
            if self.fail_cancel {
                return Err("download already removed".into());
            }
            self.cancelled.push(id);
            Ok(())
        }

        fn notify(&mut self, title: &str, message: &str) {
            self.notices.push((title.into(), message.into()));
        }
    }

    fn event(id: u64, url: &str, file: &str) -> DownloadEvent {
        DownloadEvent {
            id,
            ..DownloadEvent::new(url, file)
        }
    }

    #[test]
    fn blocked_download_is_cancelled_and_reported() {
        let mut guard = DownloadGuard::new(false);
        let mut host = RecordingHost::default();
        let outcome = guard.on_download_created(
            &event(7, "https://warez.example/x", "keygen.zip"),
            &mut host,
        );
        assert_eq!(outcome.classification.verdict, Verdict::Block);
        assert_eq!(host.cancelled, vec![7]);
        assert!(host.notices[0].1.contains("keygen.zip"));
    }

    #[test]
    fn allowed_download_untouched() {
        let mut guard = DownloadGuard::new(false);
        let mut host = RecordingHost::default();
        let outcome =
            guard.on_download_created(&event(1, "https://example.com/a", "a.pdf"), &mut host);
        assert_eq!(outcome.classification.reason, BlockReason::Clean);
        assert!(host.cancelled.is_empty());
        assert!(host.notices.is_empty());
    }

    #[test]
    fn failed_cancel_is_non_fatal_and_keeps_counters() {
        let mut guard = DownloadGuard::new(true);
        let mut host = RecordingHost {
            fail_cancel: true,
            ..Default::default()
        };
        let outcome =
            guard.on_download_created(&event(3, "https://example.com/a", "a.pdf"), &mut host);
        assert!(outcome.cancel_error.is_some());
        assert_eq!(guard.stats().total_blocked, 1);
        assert_eq!(host.notices.len(), 1);
    }

    #[test]
    fn mode_change_message_switches_to_full_block() {
        let mut guard = DownloadGuard::new(false);
        let mut host = RecordingHost::default();
        let response = guard.handle(&Request::DbdModeChanged { enabled: true }, &mut host);
        assert_eq!(
            response,
            Response::ModeChanged {
                success: true,
                current_mode: true
            }
        );
        assert_eq!(guard.mode(), DownloadMode::FullBlock);
    }

    #[test]
    fn messages_use_action_tag() {
        let request: Request = serde_json::from_str(r#"{"action": "getDbdStatus"}"#).unwrap();
        assert_eq!(request, Request::GetDbdStatus);
        let request: Request =
            serde_json::from_str(r#"{"action": "dbdModeChanged", "enabled": false}"#).unwrap();
        assert_eq!(request, Request::DbdModeChanged { enabled: false });

        let mut guard = DownloadGuard::new(true);
        let mut host = RecordingHost::default();
        let json = serde_json::to_value(guard.handle(&Request::GetDbdStatus, &mut host)).unwrap();
        assert_eq!(json["enableDbd"], true);
        assert_eq!(json["stats"]["totalBlocked"], 0);
    }

    #[test]
    fn storage_change_emits_notice() {
        let mut guard = DownloadGuard::new(false);
        let mut host = RecordingHost::default();
        guard.on_storage_changed(true, &mut host);
        assert!(guard.mode().is_full_block());
        assert_eq!(host.notices[0].0, "Mode changed");
    }

    #[test]
    fn test_block_reports_mode() {
        let mut guard = DownloadGuard::new(false);
        let mut host = RecordingHost::default();
        let response = guard.handle(&Request::TestDownloadBlock, &mut host);
        assert_eq!(response, Response::Ack { success: true });
        assert!(host.notices[0].1.contains("smart monitor"));
    }
}
