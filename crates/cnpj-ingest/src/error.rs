//! Ingestion errors

use crate::storage::StoreError;
use cnpj_common::CnpjError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Common(#[from] CnpjError),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No location serves {file} as a zip archive")]
    NoArchiveSource { file: String },

    #[error("Archive {0} contains no files")]
    EmptyArchive(String),

    #[error("Archive entry '{0}' escapes the extraction directory")]
    UnsafeArchiveEntry(String),

    #[error("Unknown record kind for file {0}")]
    UnknownRecordKind(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Reference document error: {0}")]
    ReferenceDocument(String),

    #[error("Missing required field '{field}' in {kind} record")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
