use serde_json::Value;

use super::decode::decode;
use super::format::render;
use super::reconcile::reconcile;

pub const SERVICE_ERROR_MARKER: &str = "⚠️ The grading service reported an error.";

/// A grading failure reported by the service together with its best-effort
/// output. Detected on `grade.raw_output` plus `grade.error`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceErrorEnvelope {
    pub error_message: String,
    pub raw_output: Value,
}

impl ServiceErrorEnvelope {
    pub fn detect(decoded: Option<&Value>) -> Option<Self> {
        let grade = decoded?.get("grade")?.as_object()?;
        let raw_output = grade.get("raw_output").filter(|value| !value.is_null())?;
        let error = grade.get("error").filter(|value| !value.is_null())?;
        Some(Self {
            error_message: error_message_text(error),
            raw_output: raw_output.clone(),
        })
    }

    /// Raw output rendered through the report pipeline. String output may be
    /// JSON encoded a second time.
    pub fn display_text(&self) -> String {
        match &self.raw_output {
            Value::String(text) => {
                let decoded = decode(text);
                render(reconcile(decoded.value(), text).as_ref(), text)
            }
            other => {
                let pretty =
                    serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
                render(reconcile(Some(other), &pretty).as_ref(), &pretty)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeOutcome {
    ServiceError { message: String, display_text: String },
    TransportFailure { message: String },
    Success { display_text: String },
}

impl GradeOutcome {
    /// The single string shown to the user for this outcome.
    pub fn user_message(&self) -> String {
        match self {
            Self::ServiceError {
                message,
                display_text,
            } => compose_service_error_message(message, display_text),
            Self::TransportFailure { message } => message.clone(),
            Self::Success { display_text } => display_text.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Classifies a grading response. A service error envelope wins regardless of
/// status, then a non-2xx status, then success.
pub fn interpret_outcome(http_status: u16, decoded: Option<&Value>, raw_body: &str) -> GradeOutcome {
    if let Some(envelope) = ServiceErrorEnvelope::detect(decoded) {
        return GradeOutcome::ServiceError {
            display_text: envelope.display_text(),
            message: envelope.error_message,
        };
    }

    if !(200..300).contains(&http_status) {
        return GradeOutcome::TransportFailure {
            message: transport_failure_message(http_status, decoded),
        };
    }

    GradeOutcome::Success {
        display_text: render(reconcile(decoded, raw_body).as_ref(), raw_body),
    }
}

pub fn compose_service_error_message(message: &str, display_text: &str) -> String {
    format!("{SERVICE_ERROR_MARKER}\n\nError: {message}\n\nRaw Output:\n{display_text}")
}

fn transport_failure_message(http_status: u16, decoded: Option<&Value>) -> String {
    let mut message = format!("Request failed with status {http_status}");
    let grade_error = decoded
        .and_then(|value| value.get("grade"))
        .and_then(|grade| grade.get("error"))
        .filter(|value| !value.is_null());
    let top_level_error = decoded
        .and_then(|value| value.get("error"))
        .filter(|value| !value.is_null());
    for error in [grade_error, top_level_error].into_iter().flatten() {
        message.push_str("\n\n⚠️ Error: ");
        message.push_str(&error_message_text(error));
    }
    message
}

fn error_message_text(error: &Value) -> String {
    match error {
        Value::String(text) => text.trim().to_string(),
        Value::Object(object) => object
            .get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpret_body(status: u16, body: &str) -> GradeOutcome {
        let decoded = decode(body);
        interpret_outcome(status, decoded.value(), body)
    }

    #[test]
    fn canonical_success_is_formatted() {
        let body = json!({
            "grade": {
                "overall_score": 88,
                "category_scores": [{"category": "Clarity", "score": 4}],
                "feedback": "Good work.",
                "evidence": [{"quote": "x", "explanation": "y"}]
            }
        })
        .to_string();
        assert_eq!(
            interpret_body(200, &body),
            GradeOutcome::Success {
                display_text: "[Overall: 88] [Clarity: 4]\n\nGood work.\n\nEvidence:\n\"x\" — y"
                    .to_string()
            }
        );
    }

    #[test]
    fn service_error_wins_even_with_success_status() {
        let body = json!({
            "grade": {"raw_output": "model said something", "error": "model timeout"}
        })
        .to_string();
        for status in [200, 500] {
            let outcome = interpret_body(status, &body);
            assert_eq!(
                outcome,
                GradeOutcome::ServiceError {
                    message: "model timeout".to_string(),
                    display_text: "model said something".to_string(),
                }
            );
            assert!(!outcome.is_success());
        }
    }

    #[test]
    fn double_encoded_raw_output_is_reconciled() {
        let inner = json!({
            "inferred_scale_min": 0,
            "inferred_scale_max": 100,
            "category_scores": [{"category": "clarity", "score": 5}],
            "overall_score": 20,
            "feedback": "Too short.",
            "evidence": []
        });
        let body = json!({
            "id": "res-1",
            "grade": {
                "raw_output": inner.to_string(),
                "error": "'overall_score' does not equal the sum of 'category_scores'."
            }
        })
        .to_string();

        let outcome = interpret_body(500, &body);
        assert_eq!(
            outcome.user_message(),
            "⚠️ The grading service reported an error.\n\n\
             Error: 'overall_score' does not equal the sum of 'category_scores'.\n\n\
             Raw Output:\n[Overall: 20] [clarity: 5]\n\nToo short."
        );
    }

    #[test]
    fn structured_raw_output_without_report_is_pretty_printed() {
        let body = json!({
            "grade": {"raw_output": {"output": {"unexpected": true}}, "error": "Received unexpected format"}
        })
        .to_string();
        let GradeOutcome::ServiceError { display_text, .. } = interpret_body(500, &body) else {
            panic!("expected service error");
        };
        assert_eq!(
            display_text,
            serde_json::to_string_pretty(&json!({"output": {"unexpected": true}}))
                .expect("pretty json")
        );
    }

    #[test]
    fn unparseable_raw_output_text_is_kept_verbatim() {
        let body = json!({
            "grade": {"raw_output": "I cannot grade this essay.", "error": "Failed to parse JSON from model output"}
        })
        .to_string();
        let GradeOutcome::ServiceError { display_text, message } = interpret_body(200, &body)
        else {
            panic!("expected service error");
        };
        assert_eq!(message, "Failed to parse JSON from model output");
        assert_eq!(display_text, "I cannot grade this essay.");
    }

    #[test]
    fn transport_failure_appends_both_errors() {
        let body = json!({
            "grade": {"error": "quota exceeded"},
            "error": "Internal server error."
        })
        .to_string();
        assert_eq!(
            interpret_body(502, &body),
            GradeOutcome::TransportFailure {
                message: "Request failed with status 502\n\n⚠️ Error: quota exceeded\n\n⚠️ Error: Internal server error."
                    .to_string()
            }
        );
    }

    #[test]
    fn transport_failure_reads_error_object_message() {
        let body = json!({"error": {"message": "Unauthorized"}}).to_string();
        assert_eq!(
            interpret_body(401, &body).user_message(),
            "Request failed with status 401\n\n⚠️ Error: Unauthorized"
        );
    }

    #[test]
    fn transport_failure_with_plain_body_has_status_only() {
        assert_eq!(
            interpret_body(503, "Service Unavailable"),
            GradeOutcome::TransportFailure {
                message: "Request failed with status 503".to_string()
            }
        );
    }

    #[test]
    fn plain_text_success_is_shown_verbatim() {
        let body = "  Grader is warming up, here is a note.\n";
        assert_eq!(
            interpret_body(200, body),
            GradeOutcome::Success {
                display_text: body.to_string()
            }
        );
    }

    #[test]
    fn unrecognised_json_success_falls_back_to_body() {
        let body = r#"{"id":"abc","grade":{}}"#;
        assert_eq!(interpret_body(200, body).user_message(), body);
    }

    #[test]
    fn chat_content_without_report_shows_whole_body() {
        let body = json!({"grade": {"choices": [{"message": {"content": "{\"status\":\"queued\"}"}}]}})
            .to_string();
        assert_eq!(
            interpret_body(200, &body),
            GradeOutcome::Success {
                display_text: body.clone()
            }
        );
    }

    #[test]
    fn raw_output_without_error_is_not_a_service_error() {
        let body = json!({"grade": {"raw_output": "partial"}}).to_string();
        assert!(matches!(
            interpret_body(500, &body),
            GradeOutcome::TransportFailure { .. }
        ));
        assert!(interpret_body(200, &body).is_success());
    }
}
