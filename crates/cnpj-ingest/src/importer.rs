//! Imports one extracted data table into the store
//!
//! A blocking task reads and decodes rows and streams them, in file order,
//! over a bounded channel to the async side, which maps, enriches and
//! upserts each row in turn.

use crate::enrichment::Enricher;
use crate::error::{IngestError, Result};
use crate::schema::{to_base_company, to_establishment, CpfPattern, RecordKind, RecordSchema, Schema};
use crate::storage::{Storage, StorageExt};
use crate::table::{self, SourceEncoding};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Rows buffered between the reader and the writer
const ROW_CHANNEL_CAPACITY: usize = 1024;

/// Per-file import counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Rows read successfully
    pub rows: u64,
    /// Records that did not exist before
    pub created: u64,
    /// Records merged into an existing document
    pub updated: u64,
    /// Rows that could not be mapped or stored
    pub failed: u64,
    /// Malformed rows the reader could not decode
    pub skipped: u64,
}

impl ImportStats {
    pub fn merge(&mut self, other: &ImportStats) {
        self.rows += other.rows;
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

#[derive(Clone)]
pub struct CompanyImporter {
    store: Arc<dyn Storage>,
    schema: Arc<Schema>,
    enricher: Enricher,
    cpf: CpfPattern,
}

impl CompanyImporter {
    pub fn new(store: Arc<dyn Storage>, schema: Arc<Schema>) -> Result<Self> {
        Ok(Self {
            enricher: Enricher::new(store.clone()),
            store,
            schema,
            cpf: CpfPattern::new()?,
        })
    }

    /// Import every row of the table at `path`; its file name selects the record kind
    pub async fn import_file(&self, path: &Path) -> Result<ImportStats> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = RecordKind::from_file_name(&file)
            .ok_or_else(|| IngestError::UnknownRecordKind(file.clone()))?;
        let record_schema = self
            .schema
            .for_kind(kind)
            .ok_or_else(|| IngestError::Schema(format!("no fields defined for {}", kind)))?;

        info!(file = %file, kind = %kind, "Importing data table");

        let (tx, mut rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let source = path.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || -> Result<()> {
            for row in table::rows(&source, SourceEncoding::Latin9)? {
                if tx.blocking_send(row).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let mut stats = ImportStats::default();
        let mut line = 0u64;

        while let Some(row) = rx.recv().await {
            line += 1;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(file = %file, line, error = %e, "Skipping malformed row");
                    stats.skipped += 1;
                    continue;
                },
            };
            stats.rows += 1;

            match self.import_row(record_schema, &row).await {
                Ok(true) => stats.created += 1,
                Ok(false) => stats.updated += 1,
                Err(e) => {
                    warn!(file = %file, line, error = %e, "Failed to import row");
                    stats.failed += 1;
                },
            }
        }

        reader.await??;

        info!(
            file = %file,
            rows = stats.rows,
            created = stats.created,
            updated = stats.updated,
            failed = stats.failed,
            skipped = stats.skipped,
            "Data table imported"
        );

        Ok(stats)
    }

    /// Map, enrich and upsert one row. Returns whether the record was created.
    async fn import_row(&self, schema: &RecordSchema, row: &[String]) -> Result<bool> {
        let record = schema.map_row(row);

        let upserted = match record.kind {
            RecordKind::BaseCompany => {
                let company = to_base_company(&record, &self.cpf)?;
                self.store.upsert_entity(&company).await?
            },
            RecordKind::Establishment => {
                let mut establishment = to_establishment(&record)?;
                self.enricher.enrich(&mut establishment).await;
                self.store.upsert_entity(&establishment).await?
            },
        };

        Ok(upserted.created)
    }
}
