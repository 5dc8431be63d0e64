use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

pub const CUSTOM_RUBRIC_LABEL: &str = "Custom rubric";
pub const RUBRIC_LABEL_MAX_CHARS: usize = 60;
const ELLIPSIS: &str = "...";

/// A score exactly as the grading service reported it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Score {
    Number(Number),
    Text(String),
}

impl Score {
    /// Null means "not reported"; any other non-numeric value is kept as its
    /// JSON text so nothing the service sent is dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Bool(flag) => Some(Self::Text(flag.to_string())),
            other => Some(Self::Text(other.to_string())),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => {
                if let Some(value) = number.as_i64() {
                    return write!(f, "{value}");
                }
                if let Some(value) = number.as_u64() {
                    return write!(f, "{value}");
                }
                match number.as_f64() {
                    Some(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                        write!(f, "{}", value as i64)
                    }
                    Some(value) => write!(f, "{value}"),
                    None => write!(f, "{number}"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CategoryScore {
    pub label: String,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceItem {
    Quoted { quote: String, explanation: String },
    Plain { text: String },
}

/// Canonical grading result, built fresh for every response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GradeReport {
    #[serde(default)]
    pub overall: Option<Score>,
    #[serde(default)]
    pub categories: Vec<CategoryScore>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

impl GradeReport {
    /// Feedback that is blank after trimming counts as absent.
    pub fn feedback_text(&self) -> Option<&str> {
        self.feedback
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.overall.is_none()
            && self.categories.is_empty()
            && self.feedback_text().is_none()
            && self.evidence.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rubric {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub criteria: Vec<String>,
}

impl Rubric {
    /// Stored rubric text, if any survives trimming.
    pub fn content_text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Standard {
    #[serde(rename = "StandardCode")]
    pub code: String,
    #[serde(rename = "Description")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GradeRequestPayload {
    pub essay_text: String,
    pub rubric: String,
    pub standards: Vec<Standard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GradingReply {
    pub reply_text: String,
    pub rubric_label: String,
}

/// Display name for a rubric: its name, else its content shortened to
/// [`RUBRIC_LABEL_MAX_CHARS`], else [`CUSTOM_RUBRIC_LABEL`].
pub fn rubric_label(rubric: Option<&Rubric>) -> String {
    let Some(rubric) = rubric else {
        return CUSTOM_RUBRIC_LABEL.to_string();
    };
    let name = rubric.name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    rubric
        .content_text()
        .map(|content| truncate_with_ellipsis(content, RUBRIC_LABEL_MAX_CHARS))
        .unwrap_or_else(|| CUSTOM_RUBRIC_LABEL.to_string())
}

/// Keeps `text` whole when it fits in `max_chars`; otherwise keeps the first
/// `max_chars - 3` characters and appends `...`.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.chars().count());
    let mut out = text.chars().take(keep).collect::<String>();
    out.push_str(ELLIPSIS);
    out
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Submission {
    pub id: String,
    pub op: Op,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    GradeEssay {
        #[serde(default)]
        essay_text: Option<String>,
        #[serde(default)]
        essay_file: Option<String>,
        #[serde(default)]
        rubric_id: Option<String>,
        #[serde(default)]
        rubric: Option<Rubric>,
        #[serde(default)]
        standard_codes: Vec<String>,
        #[serde(default)]
        standards: Vec<Standard>,
    },
    SaveRubric {
        rubric: Rubric,
    },
    DeleteRubric {
        id: String,
    },
    ListRubrics,
    SaveStandard {
        standard: Standard,
    },
    DeleteStandard {
        code: String,
    },
    ListStandards,
    Shutdown,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub msg: EventMsg,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMsg {
    SessionConfigured(SessionConfiguredEvent),
    EssayExtracted(EssayExtractedEvent),
    GradingStarted(GradingStartedEvent),
    Transcript(TranscriptMessage),
    RubricSaved(RubricSavedEvent),
    RubricDeleted(DeletedEvent),
    RubricList(RubricListEvent),
    StandardSaved(StandardSavedEvent),
    StandardDeleted(DeletedEvent),
    StandardList(StandardListEvent),
    ShutdownComplete,
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionConfiguredEvent {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EssayExtractedEvent {
    pub file_name: String,
    pub chars: usize,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GradingStartedEvent {
    pub rubric_label: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: Role,
    pub meta: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RubricSavedEvent {
    pub rubric: Rubric,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeletedEvent {
    pub id: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RubricListEvent {
    pub rubrics: Vec<Rubric>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StandardSavedEvent {
    pub standard: Standard,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StandardListEvent {
    pub standards: Vec<Standard>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
}
