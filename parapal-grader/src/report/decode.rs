use serde_json::Value;

/// Outcome of decoding a response body. Parse errors are swallowed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDecodeResult {
    Decoded(Value),
    Failed,
}

impl RawDecodeResult {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::Failed => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::Failed => None,
        }
    }
}

pub fn decode(text: &str) -> RawDecodeResult {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => RawDecodeResult::Decoded(value),
        Err(_) => RawDecodeResult::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_objects_and_scalars() {
        assert_eq!(
            decode(r#"{"grade":{"overall_score":88}}"#),
            RawDecodeResult::Decoded(json!({"grade":{"overall_score":88}}))
        );
        assert_eq!(decode("\"plain\""), RawDecodeResult::Decoded(json!("plain")));
        assert_eq!(decode(" 42 "), RawDecodeResult::Decoded(json!(42)));
    }

    #[test]
    fn malformed_input_is_failed_not_an_error() {
        for input in [
            "",
            "   ",
            "Internal Server Error",
            "{\"grade\":",
            "{'single': 'quotes'}",
            "```json\n{}\n```",
            "\u{0}\u{1}binary",
        ] {
            assert_eq!(decode(input), RawDecodeResult::Failed, "input: {input:?}");
        }
    }

    #[test]
    fn value_accessors_follow_variant() {
        let decoded = decode("[1,2]");
        assert_eq!(decoded.value(), Some(&json!([1, 2])));
        assert_eq!(decoded.into_value(), Some(json!([1, 2])));
        assert!(decode("nope").value().is_none());
    }
}
