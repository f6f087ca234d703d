use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentryError>;

#[derive(Error, Debug)]
pub enum SentryError {
    #[error("Unsupported manifest version {found} (expected {expected})")]
    UnsupportedManifestVersion { found: i64, expected: i64 },

    #[error("Rule pack has no rules array")]
    MissingRules,

    #[error("Invalid rule at index {index}: {message}")]
    InvalidRule { index: usize, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Page snapshot error: {0}")]
    Page(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "http-backend")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SentryError {
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Whether this error came from rule-pack validation.
    pub fn is_rule_pack_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedManifestVersion { .. }
                | Self::MissingRules
                | Self::InvalidRule { .. }
                | Self::Json(_)
        )
    }
}
