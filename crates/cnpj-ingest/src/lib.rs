//! CNPJ Ingest Library
//!
//! Loads the Brazilian CNPJ open-data release (zipped, semicolon-delimited
//! tables plus the NR-04 risk table PDF) into a keyed document store.
//!
//! # Pipeline
//!
//! - **Catalog**: discovers the release files and their publication date
//! - **Freshness**: skips releases that were already ingested
//! - **Reference**: status reasons, cities and risk grades used for enrichment
//! - **Fetch**: downloads each file from its own location or a mirror
//! - **Schema / Importer**: maps rows to companies and establishments
//! - **Storage**: idempotent upserts behind the `Storage` trait
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cnpj_ingest::{
//!     catalog::HtmlCatalogResolver,
//!     config::DownloadConfig,
//!     fetch::{build_http_client, Fetcher},
//!     pipeline::{IngestPipeline, RunOptions},
//!     schema::Schema,
//!     storage::InMemoryStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let download = DownloadConfig::load("config/companies-download.json")?;
//!     let client = build_http_client(Duration::from_secs(30))?;
//!     let fetcher = Fetcher::new(client.clone(), download.mirror_urls, "./data", Duration::from_secs(30));
//!     let pipeline = IngestPipeline::new(
//!         Arc::new(InMemoryStorage::new()),
//!         Arc::new(HtmlCatalogResolver::new(client, &download.main_url)?),
//!         fetcher,
//!         Arc::new(Schema::load("config/cnpj-schema.json")?),
//!         download.reference_doc_url,
//!     )?;
//!     let report = pipeline.run(&RunOptions::default()).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod importer;
pub mod pipeline;
pub mod reference;
pub mod schema;
pub mod storage;
pub mod table;

pub use error::{IngestError, Result};
