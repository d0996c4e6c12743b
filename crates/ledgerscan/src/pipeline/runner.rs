use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, info_span, warn};

use crate::extraction::{self, ExtractionProvider, ExtractionResponse};
use crate::record::{Jurisdiction, Record};
use crate::sanitize;

use super::context::{ProcessReport, Stage};
use super::error::{PipelineError, PipelineWarning};
use super::preprocess::{self, PreparedDocument};
use super::validation;

/// Document-to-record pipeline over a swappable extraction backend.
pub struct ExtractionPipeline {
    provider: RwLock<Arc<dyn ExtractionProvider>>,
    jurisdiction: Jurisdiction,
}

impl ExtractionPipeline {
    pub fn new(provider: Arc<dyn ExtractionProvider>, jurisdiction: Jurisdiction) -> Self {
        Self {
            provider: RwLock::new(provider),
            jurisdiction,
        }
    }

    /// The backend the next document will use.
    pub fn provider(&self) -> Arc<dyn ExtractionProvider> {
        Arc::clone(&self.provider.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the backend. Calls already running keep the old one.
    pub fn set_provider(&self, provider: Arc<dyn ExtractionProvider>) {
        info!(provider = provider.name(), "Extraction provider switched");
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) = provider;
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        self.jurisdiction
    }

    pub fn supported_formats(&self) -> BTreeSet<&'static str> {
        preprocess::supported_formats()
    }

    pub fn validate_extraction(&self, record: &Record) -> (bool, Vec<String>) {
        validation::validate_extraction(record, self.jurisdiction)
    }

    /// Runs one document through the pipeline. Every failure is logged
    /// and yields `None`.
    pub fn process(&self, document_path: &Path, validate: bool) -> Option<Record> {
        self.process_detailed(document_path, validate).record
    }

    /// Like [`process`](Self::process) but reports how far the document got
    /// and what was found on the way.
    pub fn process_detailed(&self, document_path: &Path, validate: bool) -> ProcessReport {
        let filename = sanitize::redact_path(document_path);
        let _pipeline_span = info_span!("pipeline",
            filename = %filename,
            jurisdiction = self.jurisdiction.tag(),
        )
        .entered();

        let mut report = ProcessReport::new();
        match self.run(document_path, validate, &mut report) {
            Ok(()) => {
                report.stage = Stage::Accepted;
                info!(confidence = report.confidence, "Document accepted");
            }
            Err(e) => {
                warn!(stage = ?report.stage, error = %e, "Document rejected");
                report.reject(&e);
            }
        }
        report
    }

    fn run(
        &self,
        document_path: &Path,
        validate: bool,
        report: &mut ProcessReport,
    ) -> Result<(), PipelineError> {
        // Step 1: Preprocess
        let prepared = {
            let _step = info_span!("preprocess").entered();
            self.step_preprocess(document_path)?
        };
        report.stage = Stage::Preprocessed;

        // Step 2: Extract
        let response = {
            let _step = info_span!("extract").entered();
            let response = self.step_extract(&prepared);
            // Converted files are not needed past this point.
            drop(prepared);
            response?
        };
        report.stage = Stage::Extracted;
        report.confidence = Some(response.confidence);
        report.provider = Some(response.provider.clone());

        // Step 3: Consistency check
        {
            let _step = info_span!("consistency_check").entered();
            self.step_consistency_check(&response, report);
        }

        // Step 4: Normalize
        let record = {
            let _step = info_span!("normalize").entered();
            let source_name = document_path.file_name().and_then(|n| n.to_str());
            let fields = validation::normalize_fields(&response.data, source_name)?;
            Record::new(fields)?
        };
        report.stage = Stage::Normalized;

        // Step 5: Validate
        if validate {
            let _step = info_span!("validate").entered();
            let (valid, messages) = self.validate_extraction(&record);
            report.messages = messages;
            if !valid {
                return Err(PipelineError::Validation(report.messages.join("; ")));
            }
            for message in &report.messages {
                debug!("{}", message);
            }
        }

        report.record = Some(record);
        Ok(())
    }

    fn step_preprocess(&self, document_path: &Path) -> Result<PreparedDocument, PipelineError> {
        if !document_path.is_file() {
            return Err(PipelineError::NotFound(sanitize::redact_path(document_path)));
        }
        catch_panic("preprocess", || PreparedDocument::prepare(document_path))?
    }

    fn step_extract(&self, prepared: &PreparedDocument) -> Result<ExtractionResponse, PipelineError> {
        let provider = self.provider();
        let categories = self.jurisdiction.categories();
        let response = catch_panic("extract", || provider.extract(prepared.path(), categories))?;

        if !response.success {
            return Err(PipelineError::Extraction(
                response
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            ));
        }
        debug!(
            provider = %response.provider,
            elapsed_ms = response.elapsed.as_millis() as u64,
            "Extraction response received"
        );
        Ok(response)
    }

    fn step_consistency_check(&self, response: &ExtractionResponse, report: &mut ProcessReport) {
        if let Some(warning) = validation::consistency_check(&response.data) {
            report.warnings.push(warning);
        }
        if !extraction::validate_response(&response.data) {
            warn!("Extraction response is incomplete");
            report.warnings.push(PipelineWarning::IncompleteResponse);
        }
    }
}

/// Runs `f`, turning a panic into a pipeline error for `step`.
fn catch_panic<T>(step: &'static str, f: impl FnOnce() -> T) -> Result<T, PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PipelineError::Panicked {
        step,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
