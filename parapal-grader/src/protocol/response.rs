use crate::report::{decode, interpret_outcome, GradeOutcome};

/// Status and body of one grading call, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WireResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

impl WireResponse {
    pub(crate) fn interpret(&self) -> GradeOutcome {
        let decoded = decode(&self.body);
        interpret_outcome(self.status, decoded.value(), &self.body)
    }
}
