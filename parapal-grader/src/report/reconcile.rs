use once_cell::sync::Lazy;
use parapal_protocol::{CategoryScore, EvidenceItem, GradeReport, Score};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use super::decode::decode;

const OVERALL_KEYS: &[&str] = &["overall_score", "overallScore"];
const CATEGORY_KEYS: &[&str] = &["category_scores", "categoryScores"];
const FEEDBACK_KEYS: &[&str] = &["feedback", "comments"];

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

/// What the reconciler could recover from a grading response.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Structured report with at least one non-empty field.
    Report(GradeReport),
    /// Text the service sent in place of a report; shown as-is.
    Verbatim(String),
}

type ShapeMatcher = fn(&Value) -> Option<Reconciled>;

/// Tried in order against the report root; the first match wins.
const SHAPE_MATCHERS: &[(&str, ShapeMatcher)] = &[
    ("flat_report", match_flat_report),
    ("chat_completion", match_chat_completion),
    ("content_string", match_content_string),
];

/// Resolves any known response shape into a report. `None` means nothing was
/// extractable and the caller should show `raw_body` unchanged.
pub fn reconcile(parsed: Option<&Value>, raw_body: &str) -> Option<Reconciled> {
    let Some(parsed) = parsed else {
        return match_fenced_body(raw_body);
    };

    let root = report_root(parsed);
    SHAPE_MATCHERS.iter().find_map(|(shape, matcher)| {
        let reconciled = matcher(root)?;
        trace!(shape, "grade response shape matched");
        Some(reconciled)
    })
}

fn report_root(parsed: &Value) -> &Value {
    match parsed.get("grade") {
        Some(grade) if !grade.is_null() => grade,
        _ => parsed,
    }
}

fn match_flat_report(value: &Value) -> Option<Reconciled> {
    let report = extract_report(value.as_object()?);
    if report.is_empty() {
        return None;
    }
    Some(Reconciled::Report(report))
}

fn match_chat_completion(value: &Value) -> Option<Reconciled> {
    let object = value.as_object()?;
    let content = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .or_else(|| object.get("message").and_then(Value::as_str))
        .or_else(|| value.pointer("/message/content").and_then(Value::as_str))
        .or_else(|| object.get("result").and_then(Value::as_str))?;
    reconcile_content(content)
}

fn match_content_string(value: &Value) -> Option<Reconciled> {
    reconcile_content(value.as_str()?)
}

fn match_fenced_body(raw_body: &str) -> Option<Reconciled> {
    let fenced = extract_fenced_block(raw_body)?;
    let decoded = decode(fenced).into_value()?;
    match_flat_report(report_root(&decoded))
}

/// Model output may wrap its JSON in a fenced block. Content that does not
/// decode is passed through trimmed; decoded JSON without report fields
/// yields nothing so the raw body is shown instead.
fn reconcile_content(content: &str) -> Option<Reconciled> {
    let candidate = extract_fenced_block(content).unwrap_or(content);
    if let Some(decoded) = decode(candidate).into_value() {
        return match_flat_report(report_root(&decoded));
    }

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(Reconciled::Verbatim(trimmed.to_string()))
}

pub(crate) fn extract_fenced_block(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|inner| inner.as_str().trim())
}

fn extract_report(object: &Map<String, Value>) -> GradeReport {
    GradeReport {
        overall: first_present(object, OVERALL_KEYS).and_then(Score::from_value),
        categories: first_present(object, CATEGORY_KEYS)
            .map(parse_categories)
            .unwrap_or_default(),
        feedback: parse_feedback(object),
        evidence: object
            .get("evidence")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_evidence_item).collect())
            .unwrap_or_default(),
    }
}

fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

fn parse_categories(value: &Value) -> Vec<CategoryScore> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse_category_item).collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(key, score)| {
                Some(CategoryScore {
                    label: humanize_key(key),
                    score: Score::from_value(score)?,
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_category_item(item: &Value) -> Option<CategoryScore> {
    let label = item
        .get("category")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())?;
    let score = Score::from_value(item.get("score")?)?;
    Some(CategoryScore {
        label: label.to_string(),
        score,
    })
}

fn parse_feedback(object: &Map<String, Value>) -> Option<String> {
    FEEDBACK_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(ToString::to_string)
}

fn parse_evidence_item(item: &Value) -> Option<EvidenceItem> {
    match item {
        Value::String(text) if !text.trim().is_empty() => {
            Some(EvidenceItem::Plain { text: text.clone() })
        }
        Value::Object(object) => {
            let quote = non_empty_str(object.get("quote"))?;
            let explanation = non_empty_str(object.get("explanation"))?;
            Some(EvidenceItem::Quoted {
                quote: quote.to_string(),
                explanation: explanation.to_string(),
            })
        }
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

/// `overall_clarity` -> `Overall Clarity`. Every letter that starts a word is
/// upper-cased; the rest of the word is left alone.
fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut at_word_start = true;
    for ch in spaced.trim().chars() {
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}
