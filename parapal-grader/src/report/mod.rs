//! Interpretation of grading-service responses: decode, reconcile the known
//! response shapes into a [`GradeReport`](parapal_protocol::GradeReport),
//! format it for the transcript, and classify the HTTP outcome.

mod decode;
mod format;
mod outcome;
mod reconcile;

pub use decode::{decode, RawDecodeResult};
pub use format::{format_report, render, CATEGORY_LABEL_MAX_CHARS, EVIDENCE_HEADING};
pub use outcome::{
    compose_service_error_message, interpret_outcome, GradeOutcome, ServiceErrorEnvelope,
    SERVICE_ERROR_MARKER,
};
pub use reconcile::{reconcile, Reconciled};
