pub mod builtin;
pub mod warning;

use std::collections::BTreeSet;

use crate::page::PageSnapshot;

pub use warning::{DetectorId, DetectorMetadata, DetectorResult, Evidence, Severity, Warning};

/// A detector analyzes a `PageSnapshot` and produces a scored result,
/// or `None` when it found nothing.
pub trait Detector: Send + Sync {
    /// Metadata about this detector (id, name, severity).
    fn metadata(&self) -> DetectorMetadata;

    /// Run the detector against a page snapshot.
    fn analyze(&self, page: &PageSnapshot) -> Option<DetectorResult>;
}

/// Static registry of the built-in detectors. Only plugin-gated detectors
/// are dropped when absent from the enabled plugin ids; the rest always run.
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    /// Registry with every built-in detector registered.
    pub fn new() -> Self {
        Self {
            detectors: builtin::all_detectors(),
        }
    }

    /// Registry with plugin-gated detectors restricted to those named in
    /// `enabled`. Unknown ids (backend-side plugins) are ignored here.
    pub fn with_enabled<S: AsRef<str>>(enabled: &[S]) -> Self {
        let ids: BTreeSet<DetectorId> = enabled
            .iter()
            .filter_map(|s| DetectorId::from_plugin_id(s.as_ref()))
            .collect();
        Self {
            detectors: builtin::all_detectors()
                .into_iter()
                .filter(|d| {
                    let id = d.metadata().id;
                    !id.is_plugin_gated() || ids.contains(&id)
                })
                .collect(),
        }
    }

    /// Run all registered detectors in registration order.
    pub fn run(&self, page: &PageSnapshot) -> Vec<DetectorResult> {
        self.detectors
            .iter()
            .filter_map(|d| {
                let result = d.analyze(page)?;
                tracing::debug!(
                    detector = %result.detector,
                    score = result.score,
                    warnings = result.warnings.len(),
                    "detector produced findings"
                );
                Some(result)
            })
            .collect()
    }

    /// List metadata for all registered detectors.
    pub fn list(&self) -> Vec<DetectorMetadata> {
        self.detectors.iter().map(|d| d.metadata()).collect()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_script_analyzer_is_plugin_gated() {
        let registry = DetectorRegistry::with_enabled(&["whois-checker", "url-pattern"]);
        let ids: Vec<DetectorId> = registry.list().iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![
                DetectorId::FormRisk,
                DetectorId::Redirect,
                DetectorId::Impersonation,
                DetectorId::Typosquat,
            ]
        );

        let empty: &[&str] = &[];
        assert_eq!(DetectorRegistry::with_enabled(empty).list().len(), 4);
        assert_eq!(
            DetectorRegistry::with_enabled(&["script-analyzer"]).list().len(),
            5
        );
    }

    #[test]
    fn default_registry_order_is_fixed() {
        let ids: Vec<DetectorId> = DetectorRegistry::new().list().iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![
                DetectorId::FormRisk,
                DetectorId::ScriptPatterns,
                DetectorId::Redirect,
                DetectorId::Impersonation,
                DetectorId::Typosquat,
            ]
        );
    }
}
