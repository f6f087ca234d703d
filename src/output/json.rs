use crate::controller::Decision;
use crate::error::Result;

use serde::Serialize;

#[derive(Serialize)]
struct JsonReport<'a> {
    url: &'a str,
    #[serde(flatten)]
    decision: &'a Decision,
}

/// Render a page decision as a JSON report.
pub fn render(url: &str, decision: &Decision) -> Result<String> {
    let report = JsonReport { url, decision };
    let json = serde_json::to_string_pretty(&report)?;
    Ok(json)
}
