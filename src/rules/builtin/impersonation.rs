use serde::{Deserialize, Serialize};

use crate::page::{host_matches, PageSnapshot};
use crate::rules::{Detector, DetectorId, DetectorMetadata, DetectorResult, Severity, Warning};

/// Brand Impersonation
///
/// A page impersonates a brand when it names the brand, asks for a
/// password, and is not served from one of the brand's official domains.
/// Pages without a password field are never flagged.
pub struct ImpersonationDetector;

pub const IMPERSONATION_SCORE: u32 = 70;

/// Only the start of the body is searched.
const BODY_SCAN_CHARS: usize = 2000;

/// A protected brand and the domains it officially operates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBrand {
    pub name: String,
    pub official_domains: Vec<String>,
}

/// Ordered brand table; the first brand that matches wins.
const PROTECTED_BRANDS: &[(&str, &[&str])] = &[
    ("zoom", &["zoom.us", "zoom.com", "zoom.gov"]),
    (
        "microsoft",
        &[
            "microsoft.com",
            "live.com",
            "office.com",
            "sharepoint.com",
            "microsoftonline.com",
        ],
    ),
    (
        "google",
        &["google.com", "accounts.google.com", "youtube.com", "gmail.com"],
    ),
    ("amazon", &["amazon.co.jp", "amazon.com"]),
    ("rakuten", &["rakuten.co.jp", "rakuten.ne.jp"]),
    ("teams", &["microsoft.com", "teams.live.com"]),
    ("dropbox", &["dropbox.com"]),
    ("docomo", &["docomo.ne.jp", "nttdocomo.co.jp"]),
];

/// The built-in brand table as owned values.
pub fn protected_brands() -> Vec<ProtectedBrand> {
    PROTECTED_BRANDS
        .iter()
        .map(|(name, domains)| ProtectedBrand {
            name: (*name).into(),
            official_domains: domains.iter().map(|d| (*d).into()).collect(),
        })
        .collect()
}

impl ImpersonationDetector {
    /// Check the page against `brands`. Returns the first impersonated brand.
    pub fn check(&self, page: &PageSnapshot, brands: &[ProtectedBrand]) -> Option<Warning> {
        if !page.has_password_field {
            return None;
        }

        let host = page.hostname();
        let title = page.title.to_lowercase();
        let body: String = page
            .body_text
            .chars()
            .take(BODY_SCAN_CHARS)
            .collect::<String>()
            .to_lowercase();

        let brand = brands.iter().find(|brand| {
            let name = brand.name.to_lowercase();
            let mentioned = title.contains(&name) || body.contains(&name);
            mentioned && !brand.official_domains.iter().any(|d| host_matches(&host, d))
        })?;

        tracing::warn!(brand = %brand.name, host = %host, "possible brand impersonation");

        Some(
            Warning::new(
                DetectorId::Impersonation,
                Severity::Critical,
                IMPERSONATION_SCORE,
                "Suspected impersonation",
                format!(
                    "This site may be posing as {}, but the URL is not an official one.",
                    brand.name.to_uppercase()
                ),
            )
            .with_icon("🎭"),
        )
    }
}

impl Detector for ImpersonationDetector {
    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            id: DetectorId::Impersonation,
            name: "Brand Impersonation".into(),
            description: "Login page naming a well-known brand on a non-official domain".into(),
            default_severity: Severity::Critical,
        }
    }

    fn analyze(&self, page: &PageSnapshot) -> Option<DetectorResult> {
        let warning = self.check(page, &protected_brands())?;
        Some(DetectorResult::from_warnings(
            DetectorId::Impersonation,
            vec![warning],
        ))
    }
}
