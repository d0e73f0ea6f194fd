//! CNPJ Common Library
//!
//! Shared types, utilities, and error handling for the CNPJ ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `CnpjError` and the `Result` alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: registry entities (companies, establishments, lookup tables)
//!
//! # Example
//!
//! ```no_run
//! use cnpj_common::{Result, types::parse_br_date};
//!
//! fn release_date(marker: &str) -> Result<chrono::NaiveDate> {
//!     parse_br_date(marker)
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CnpjError, Result};
