use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parapal_extract::{DocumentTextExtractor, TextExtractor};
use parapal_protocol::{
    rubric_label, DeletedEvent, ErrorEvent, EssayExtractedEvent, Event, EventMsg, GradingReply,
    GradingStartedEvent, Op, Role, Rubric, RubricListEvent, RubricSavedEvent,
    SessionConfiguredEvent, Standard, StandardListEvent, StandardSavedEvent, Submission,
    TranscriptMessage,
};
use parapal_rubric_store::RubricStore;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const ESSAY_PREVIEW_MAX_CHARS: usize = 1200;
pub const TEACHER_META: &str = "Teacher";
pub const ERROR_META: &str = "Error";
pub const GENERIC_GRADING_FAILURE: &str = "Failed to grade essay.";
pub const EMPTY_ESSAY_MESSAGE: &str = "essay_text cannot be blank.";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub session_id: String,
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_id: "parapal".to_string(),
            channel_capacity: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRequest {
    pub essay_text: String,
    pub rubric: Option<Rubric>,
    pub standards: Vec<Standard>,
}

#[async_trait]
pub trait GradingEngine: Send + Sync {
    /// Grades one essay. The error string is shown to the user as is.
    async fn grade(&self, request: &GradeRequest) -> Result<GradingReply, String>;
}

/// Engine used when no grading service is configured.
pub struct OfflineGradingEngine {
    reason: String,
}

impl OfflineGradingEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GradingEngine for OfflineGradingEngine {
    async fn grade(&self, _request: &GradeRequest) -> Result<GradingReply, String> {
        Err(self.reason.clone())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to send submission: runtime channel closed")]
    SubmissionChannelClosed,
    #[error("runtime join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct RuntimeServices {
    pub engine: Arc<dyn GradingEngine>,
    pub store: RubricStore,
    pub extractor: Arc<dyn TextExtractor>,
}

impl RuntimeServices {
    pub fn new(engine: Arc<dyn GradingEngine>, store: RubricStore) -> Self {
        Self {
            engine,
            store,
            extractor: Arc::new(DocumentTextExtractor::new()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

/// A grading session. Submissions are handled one at a time in arrival order
/// and every resulting event carries the submission id.
pub struct GradingRuntime {
    submission_tx: mpsc::Sender<Submission>,
    event_rx: mpsc::Receiver<Event>,
    loop_handle: JoinHandle<()>,
}

impl GradingRuntime {
    pub fn spawn(config: RuntimeConfig, services: RuntimeServices) -> Self {
        let (submission_tx, submission_rx) = mpsc::channel(config.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);

        let loop_handle = tokio::spawn(submission_loop(config, submission_rx, event_tx, services));

        Self {
            submission_tx,
            event_rx,
            loop_handle,
        }
    }

    pub async fn submit(&self, submission: Submission) -> Result<(), RuntimeError> {
        self.submission_tx
            .send(submission)
            .await
            .map_err(|_| RuntimeError::SubmissionChannelClosed)
    }

    pub fn submission_sender(&self) -> mpsc::Sender<Submission> {
        self.submission_tx.clone()
    }

    pub fn events_mut(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.event_rx
    }

    pub async fn join(self) -> Result<(), RuntimeError> {
        self.loop_handle.await?;
        Ok(())
    }
}

struct EssayInput {
    essay_text: Option<String>,
    essay_file: Option<String>,
    rubric_id: Option<String>,
    rubric: Option<Rubric>,
    standard_codes: Vec<String>,
    standards: Vec<Standard>,
}

async fn submission_loop(
    config: RuntimeConfig,
    mut submission_rx: mpsc::Receiver<Submission>,
    event_tx: mpsc::Sender<Event>,
    services: RuntimeServices,
) {
    let _ = send_event(
        &event_tx,
        "session".to_string(),
        EventMsg::SessionConfigured(SessionConfiguredEvent {
            session_id: config.session_id.clone(),
        }),
    )
    .await;

    while let Some(submission) = submission_rx.recv().await {
        let sub_id = submission.id;
        match submission.op {
            Op::GradeEssay {
                essay_text,
                essay_file,
                rubric_id,
                rubric,
                standard_codes,
                standards,
            } => {
                let input = EssayInput {
                    essay_text,
                    essay_file,
                    rubric_id,
                    rubric,
                    standard_codes,
                    standards,
                };
                grade_essay(&sub_id, input, &services, &event_tx).await;
            }
            Op::SaveRubric { rubric } => {
                let msg = match services.store.save_rubric(&rubric) {
                    Ok(rubric) => EventMsg::RubricSaved(RubricSavedEvent { rubric }),
                    Err(err) => error_msg(err.to_string()),
                };
                let _ = send_event(&event_tx, sub_id, msg).await;
            }
            Op::DeleteRubric { id } => {
                let msg = match services.store.delete_rubric(&id) {
                    Ok(removed) => EventMsg::RubricDeleted(DeletedEvent { id, removed }),
                    Err(err) => error_msg(err.to_string()),
                };
                let _ = send_event(&event_tx, sub_id, msg).await;
            }
            Op::ListRubrics => {
                let msg = match services.store.list_rubrics() {
                    Ok(rubrics) => EventMsg::RubricList(RubricListEvent { rubrics }),
                    Err(err) => error_msg(err.to_string()),
                };
                let _ = send_event(&event_tx, sub_id, msg).await;
            }
            Op::SaveStandard { standard } => {
                let msg = match services.store.save_standard(&standard) {
                    Ok(standard) => EventMsg::StandardSaved(StandardSavedEvent { standard }),
                    Err(err) => error_msg(err.to_string()),
                };
                let _ = send_event(&event_tx, sub_id, msg).await;
            }
            Op::DeleteStandard { code } => {
                let msg = match services.store.delete_standard(&code) {
                    Ok(removed) => EventMsg::StandardDeleted(DeletedEvent { id: code, removed }),
                    Err(err) => error_msg(err.to_string()),
                };
                let _ = send_event(&event_tx, sub_id, msg).await;
            }
            Op::ListStandards => {
                let msg = match services.store.list_standards() {
                    Ok(standards) => EventMsg::StandardList(StandardListEvent { standards }),
                    Err(err) => error_msg(err.to_string()),
                };
                let _ = send_event(&event_tx, sub_id, msg).await;
            }
            Op::Shutdown => {
                let _ = send_event(&event_tx, sub_id, EventMsg::ShutdownComplete).await;
                break;
            }
        }
    }
}

async fn grade_essay(
    sub_id: &str,
    input: EssayInput,
    services: &RuntimeServices,
    event_tx: &mpsc::Sender<Event>,
) {
    let rubric = match resolve_rubric(input.rubric, input.rubric_id.as_deref(), &services.store) {
        Ok(rubric) => rubric,
        Err(message) => {
            let _ = send_event(event_tx, sub_id.to_string(), error_msg(message)).await;
            return;
        }
    };

    let mut standards = input.standards;
    if !input.standard_codes.is_empty() {
        match services.store.standards_by_codes(&input.standard_codes) {
            Ok(stored) => standards.extend(stored),
            Err(err) => {
                let _ = send_event(event_tx, sub_id.to_string(), error_msg(err.to_string())).await;
                return;
            }
        }
    }

    let file_name = input.essay_file.as_deref().map(display_file_name);
    let typed_text = input
        .essay_text
        .filter(|text| !text.trim().is_empty());

    let essay_text = match (typed_text, input.essay_file.as_deref()) {
        (Some(text), _) => text,
        (None, Some(file)) => {
            let name = display_file_name(file);
            match services.extractor.extract_text(Path::new(file)).await {
                Ok(text) => {
                    let extracted = text.trim().to_string();
                    let status = if extracted.is_empty() { "empty" } else { "extracted" };
                    let _ = send_event(
                        event_tx,
                        sub_id.to_string(),
                        EventMsg::EssayExtracted(EssayExtractedEvent {
                            file_name: name.clone(),
                            chars: extracted.chars().count(),
                            status: status.to_string(),
                        }),
                    )
                    .await;
                    if extracted.is_empty() {
                        format!("(No text extracted from {name})")
                    } else {
                        extracted
                    }
                }
                Err(err) => {
                    warn!(file = %file, error = %err, "essay extraction failed");
                    let message =
                        format!("Could not read {name}. Please paste text or try another file.");
                    let _ = send_event(event_tx, sub_id.to_string(), error_msg(message)).await;
                    return;
                }
            }
        }
        (None, None) => {
            let message = EMPTY_ESSAY_MESSAGE.to_string();
            let _ = send_event(event_tx, sub_id.to_string(), error_msg(message)).await;
            return;
        }
    };

    let label = rubric_label(rubric.as_ref());
    let _ = send_event(
        event_tx,
        sub_id.to_string(),
        EventMsg::Transcript(TranscriptMessage {
            role: Role::User,
            meta: TEACHER_META.to_string(),
            text: compose_user_message(&essay_text, file_name.as_deref(), &label),
        }),
    )
    .await;
    let _ = send_event(
        event_tx,
        sub_id.to_string(),
        EventMsg::GradingStarted(GradingStartedEvent {
            rubric_label: label.clone(),
        }),
    )
    .await;

    debug!(submission = %sub_id, rubric = %label, standards = standards.len(), "grading essay");
    let request = GradeRequest {
        essay_text,
        rubric,
        standards,
    };
    let reply = match services.engine.grade(&request).await {
        Ok(reply) => TranscriptMessage {
            role: Role::Agent,
            meta: format!("Using {}", reply.rubric_label),
            text: reply.reply_text,
        },
        Err(message) => {
            let text = if message.trim().is_empty() {
                GENERIC_GRADING_FAILURE.to_string()
            } else {
                message
            };
            TranscriptMessage {
                role: Role::Agent,
                meta: ERROR_META.to_string(),
                text,
            }
        }
    };
    let _ = send_event(event_tx, sub_id.to_string(), EventMsg::Transcript(reply)).await;
}

/// An inline rubric wins over a stored one named by id.
fn resolve_rubric(
    inline: Option<Rubric>,
    rubric_id: Option<&str>,
    store: &RubricStore,
) -> Result<Option<Rubric>, String> {
    if inline.is_some() {
        return Ok(inline);
    }
    let Some(id) = rubric_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    match store.get_rubric(id) {
        Ok(Some(rubric)) => Ok(Some(rubric)),
        Ok(None) => Err(format!("rubric '{id}' not found")),
        Err(err) => Err(err.to_string()),
    }
}

/// The user's side of the transcript for a grading request.
pub fn compose_user_message(essay_text: &str, file_name: Option<&str>, rubric_label: &str) -> String {
    let mut message = String::from("Essay:\n");
    message.extend(essay_text.chars().take(ESSAY_PREVIEW_MAX_CHARS));
    if essay_text.chars().count() > ESSAY_PREVIEW_MAX_CHARS {
        message.push_str("...");
    }
    if let Some(name) = file_name {
        message.push_str("\nAttached file: ");
        message.push_str(name);
    }
    message.push_str("\nRubric: ");
    message.push_str(rubric_label);
    message.trim().to_string()
}

fn display_file_name(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

fn error_msg(message: String) -> EventMsg {
    EventMsg::Error(ErrorEvent { message })
}

async fn send_event(
    event_tx: &mpsc::Sender<Event>,
    id: String,
    msg: EventMsg,
) -> Result<(), mpsc::error::SendError<Event>> {
    event_tx.send(Event { id, msg }).await
}
