use std::collections::HashSet;

use parapal_protocol::{GradeRequestPayload, Rubric, Standard};

pub(crate) fn build_grade_request_payload(
    essay_text: &str,
    rubric: Option<&Rubric>,
    standards: &[Standard],
    default_rubric: &str,
) -> GradeRequestPayload {
    let rubric_text = rubric
        .and_then(Rubric::content_text)
        .unwrap_or(default_rubric)
        .to_string();

    GradeRequestPayload {
        essay_text: essay_text.to_string(),
        rubric: rubric_text,
        standards: sanitize_standards(standards),
    }
}

fn sanitize_standards(standards: &[Standard]) -> Vec<Standard> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for standard in standards {
        let code = standard.code.trim();
        let description = standard.description.trim();
        if code.is_empty() && description.is_empty() {
            continue;
        }
        if !code.is_empty() && !seen.insert(code.to_string()) {
            continue;
        }
        out.push(Standard {
            code: code.to_string(),
            description: description.to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFAULT_RUBRIC: &str = "Grade on clarity.";

    fn standard(code: &str, description: &str) -> Standard {
        Standard {
            code: code.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn payload_uses_rubric_content_and_standard_wire_names() {
        let rubric = Rubric {
            id: "r1".to_string(),
            name: "Opinion Writing".to_string(),
            content: Some("  Score thesis 1-4.  ".to_string()),
            ..Rubric::default()
        };
        let payload = build_grade_request_payload(
            "My essay",
            Some(&rubric),
            &[standard("W.5.1", "Write opinion pieces")],
            DEFAULT_RUBRIC,
        );

        assert_eq!(
            serde_json::to_value(&payload).expect("serialize payload"),
            json!({
                "essay_text": "My essay",
                "rubric": "Score thesis 1-4.",
                "standards": [{"StandardCode": "W.5.1", "Description": "Write opinion pieces"}]
            })
        );
    }

    #[test]
    fn payload_falls_back_to_default_rubric_and_empty_standards() {
        let nameless = Rubric {
            id: "r2".to_string(),
            name: "Has a name but no content".to_string(),
            ..Rubric::default()
        };
        for rubric in [None, Some(&nameless)] {
            let payload = build_grade_request_payload("essay", rubric, &[], DEFAULT_RUBRIC);
            assert_eq!(payload.rubric, DEFAULT_RUBRIC);
            assert!(payload.standards.is_empty());
        }
    }

    #[test]
    fn standards_are_trimmed_and_deduplicated_by_code() {
        let payload = build_grade_request_payload(
            "essay",
            None,
            &[
                standard(" W.4.3 ", "Narratives"),
                standard("", "  "),
                standard("W.4.3", "Duplicate"),
                standard("", "Free-form standard"),
            ],
            DEFAULT_RUBRIC,
        );
        assert_eq!(
            payload.standards,
            vec![
                standard("W.4.3", "Narratives"),
                standard("", "Free-form standard"),
            ]
        );
    }
}
