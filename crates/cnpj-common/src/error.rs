//! Error types shared across the CNPJ workspace

use thiserror::Error;

/// Result type alias for CNPJ operations
pub type Result<T> = std::result::Result<T, CnpjError>;

/// Main error type for shared CNPJ helpers
#[derive(Error, Debug)]
pub enum CnpjError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid date '{value}': expected {layout}")]
    InvalidDate { value: String, layout: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),
}
