mod form_risk;
mod impersonation;
mod network_calls;
mod redirect;
mod script_patterns;
pub mod typosquat;

pub use form_risk::FormRiskDetector;
pub use impersonation::{protected_brands, ImpersonationDetector, ProtectedBrand};
pub use redirect::RedirectDetector;
pub use script_patterns::{ScriptPatternDetector, ScriptScanReport};
pub use typosquat::TyposquatDetector;

use super::Detector;

/// Returns all built-in detectors in invocation order.
pub fn all_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(FormRiskDetector),
        Box::new(ScriptPatternDetector),
        Box::new(RedirectDetector),
        Box::new(ImpersonationDetector),
        Box::new(TyposquatDetector),
    ]
}
