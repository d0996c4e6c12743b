use serde::Serialize;

use crate::record::Record;

use super::error::{PipelineError, PipelineWarning};

/// How far a document got. Terminal stages are `Rejected` and `Accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Preprocessed,
    Extracted,
    Normalized,
    Rejected,
    Accepted,
}

/// Outcome of processing one document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub stage: Stage,

    // Set only when accepted
    pub record: Option<Record>,

    // Why the document was rejected
    pub rejection: Option<String>,

    // Output of validate_extraction, soft warnings included
    pub messages: Vec<String>,

    // Non-fatal findings
    pub warnings: Vec<PipelineWarning>,

    // From the extraction response, once there is one
    pub confidence: Option<f64>,
    pub provider: Option<String>,
}

impl ProcessReport {
    pub fn new() -> Self {
        Self {
            stage: Stage::Received,
            record: None,
            rejection: None,
            messages: Vec::new(),
            warnings: Vec::new(),
            confidence: None,
            provider: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.stage == Stage::Accepted
    }

    pub(crate) fn reject(&mut self, error: &PipelineError) {
        self.stage = Stage::Rejected;
        self.record = None;
        self.rejection = Some(error.to_string());
    }
}

impl Default for ProcessReport {
    fn default() -> Self {
        Self::new()
    }
}
