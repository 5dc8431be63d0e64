use parapal_protocol::{truncate_with_ellipsis, EvidenceItem, GradeReport};

use super::reconcile::Reconciled;

pub const CATEGORY_LABEL_MAX_CHARS: usize = 50;
pub const EVIDENCE_HEADING: &str = "Evidence:";

/// Renders a report as the transcript layout: score header, feedback, then
/// the evidence block, separated by one blank line. Absent sections are
/// left out together with their separator.
pub fn format_report(report: &GradeReport) -> String {
    let mut sections = Vec::new();

    let header = header_tokens(report).join(" ");
    if !header.is_empty() {
        sections.push(header);
    }

    if let Some(feedback) = report.feedback_text() {
        sections.push(feedback.to_string());
    }

    if !report.evidence.is_empty() {
        let mut block = vec![EVIDENCE_HEADING.to_string()];
        block.extend(report.evidence.iter().map(format_evidence_item));
        sections.push(block.join("\n"));
    }

    sections.join("\n\n")
}

/// Display text for a reconciled response, or `fallback` unchanged when
/// nothing could be extracted.
pub fn render(reconciled: Option<&Reconciled>, fallback: &str) -> String {
    match reconciled {
        Some(Reconciled::Report(report)) if !report.is_empty() => format_report(report),
        Some(Reconciled::Verbatim(text)) if !text.is_empty() => text.clone(),
        _ => fallback.to_string(),
    }
}

fn header_tokens(report: &GradeReport) -> Vec<String> {
    let mut tokens = Vec::with_capacity(report.categories.len() + 1);
    if let Some(overall) = report.overall.as_ref() {
        tokens.push(format!("[Overall: {overall}]"));
    }
    for category in &report.categories {
        let label = truncate_with_ellipsis(&category.label, CATEGORY_LABEL_MAX_CHARS);
        tokens.push(format!("[{label}: {}]", category.score));
    }
    tokens
}

fn format_evidence_item(item: &EvidenceItem) -> String {
    match item {
        EvidenceItem::Quoted { quote, explanation } => format!("\"{quote}\" — {explanation}"),
        EvidenceItem::Plain { text } => text.clone(),
    }
}
