pub mod config;
pub mod error;
pub mod extraction;
pub mod import;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod sanitize;
pub mod secrets;
pub mod store;

pub use config::{load_config, Config, ImportConfig, LoggingConfig, ProviderConfig, ProviderKind};
pub use error::{ConfigError, ImportError, LedgerError, Result};
pub use extraction::{
    provider_from_config, AnthropicProvider, ExtractionProvider, ExtractionResponse,
    OpenAiProvider, ProviderError, ProviderStats, StatsSnapshot,
};
pub use import::{collect_documents, import_paths, ImportSummary};
pub use logging::init_logging;
pub use pipeline::{ExtractionPipeline, ProcessReport, Stage};
pub use record::{
    categories_for, is_valid_category, Jurisdiction, Record, RecordError, RecordFields,
    RecordId, TransactionType,
};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{
    Database, RecordFilter, RecordStore, ReportMetadata, ReportSummary, ReportType, Statistics,
    StoreError,
};
