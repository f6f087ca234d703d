pub mod console;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::controller::Decision;
use crate::error::Result;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Render the decision for `url` into the specified format.
pub fn render(url: &str, decision: &Decision, format: OutputFormat, detailed: bool) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render(url, decision, detailed)),
        OutputFormat::Json => json::render(url, decision),
    }
}
