use std::path::PathBuf;
use thiserror::Error;

use crate::extraction::{ProviderError, ProviderSetupError};
use crate::logging::LoggingError;
use crate::pipeline::PipelineError;
use crate::record::{CategoryError, RecordError};
use crate::secrets::SecretError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Category error: {0}")]
    Category(#[from] CategoryError),

    #[error("Extraction error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider setup error: {0}")]
    ProviderSetup(#[from] ProviderSetupError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Directory scan failed for '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to store record from '{document}': {source}")]
    Store {
        document: String,
        #[source]
        source: StoreError,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
