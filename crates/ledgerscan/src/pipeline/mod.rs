//! Document-to-record pipeline: format normalization, extraction through the
//! active backend, normalization of the raw fields and validation.

pub mod context;
pub mod error;
pub mod preprocess;
pub mod runner;
pub mod validation;

pub use context::{ProcessReport, Stage};
pub use error::{PipelineError, PipelineWarning};
pub use preprocess::{supported_formats, DocumentKind, PreparedDocument};
pub use runner::ExtractionPipeline;
pub use validation::{consistency_check, normalize_fields, validate_extraction};
