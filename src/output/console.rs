use crate::controller::Decision;
use crate::rules::Severity;
use crate::scoring::AnalysisResult;

/// Render a page decision as console output. Warnings keep detector
/// order; `detailed` adds the matched snippet and evidence.
pub fn render(url: &str, decision: &Decision, detailed: bool) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n  {url}\n"));

    let result = match decision {
        Decision::Warned { result } => {
            output.push_str("  Decision: WARN\n");
            result
        }
        Decision::Suppressed { reason, result } => {
            output.push_str(&format!("  Decision: no warning ({reason})\n"));
            match result {
                Some(result) => result,
                None => {
                    output.push('\n');
                    return output;
                }
            }
        }
    };

    render_result(&mut output, result, detailed);
    output
}

fn render_result(output: &mut String, result: &AnalysisResult, detailed: bool) {
    output.push_str(&format!(
        "  Score: {} ({})\n",
        result.total_score, result.severity
    ));

    if result.warnings.is_empty() {
        output.push_str("\n  No suspicious elements detected.\n\n");
        return;
    }

    output.push_str(&format!("\n  {} warning(s):\n\n", result.warnings.len()));

    for warning in &result.warnings {
        let severity_tag = match warning.severity {
            Severity::Critical => "[CRITICAL]",
            Severity::High => "[HIGH]    ",
            Severity::Medium => "[MEDIUM]  ",
            Severity::Low => "[LOW]     ",
            Severity::Info => "[INFO]    ",
        };

        output.push_str(&format!(
            "  {} {} {} (+{})\n",
            severity_tag, warning.icon, warning.title, warning.score
        ));
        output.push_str(&format!("           {}\n", warning.description));
        if detailed {
            if let Some(snippet) = &warning.snippet {
                output.push_str(&format!("           code: {}\n", snippet));
            }
            if let Some(details) = &warning.details {
                for target in &details.targets {
                    output.push_str(&format!("           target: {}\n", target));
                }
            }
        }
        output.push_str(&format!("           source: {}\n\n", warning.source));
    }

    output.push_str(&format!("  {}\n\n", result.recommendation.message));
}
