//! CNPJ ingestion pipeline
//!
//! Orchestrates one run: catalog resolution, freshness gate, reference
//! tables, then one concurrent task per data file, and finally the
//! checkpoint.

use crate::catalog::{Catalog, CatalogResolver};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::freshness::{FreshnessGate, GateDecision};
use crate::importer::{CompanyImporter, ImportStats};
use crate::reference::{ReferenceLoader, ReferenceReport};
use crate::schema::{RecordKind, Schema};
use crate::storage::Storage;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Run modes selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Ignore the checkpoint
    pub force: bool,
    /// Load reference tables only
    pub aux_only: bool,
    /// At most this many data files per record kind (0 = unlimited)
    pub limit_files: usize,
}

/// Keep at most `limit` files of each record kind, in catalog order.
///
/// With a limit, files of no known kind are dropped.
pub fn select_data_files(files: &[String], limit: usize) -> Vec<String> {
    if limit == 0 {
        return files.to_vec();
    }

    let mut taken: HashMap<RecordKind, usize> = HashMap::new();
    files
        .iter()
        .filter(|file| {
            let Some(kind) = RecordKind::from_file_name(file) else {
                return false;
            };
            let count = taken.entry(kind).or_insert(0);
            *count += 1;
            *count <= limit
        })
        .cloned()
        .collect()
}

/// Outcome of one data file task
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: String,
    pub result: std::result::Result<ImportStats, String>,
}

/// Result of running the pipeline
#[derive(Debug, Default)]
pub struct RunReport {
    /// Release date from the catalog (None in reference-only mode)
    pub release_date: Option<NaiveDate>,
    /// Gate decision (None in reference-only mode)
    pub decision: Option<GateDecision>,
    pub references: Option<ReferenceReport>,
    pub files: Vec<FileOutcome>,
    pub checkpoint_advanced: bool,
}

impl RunReport {
    /// Whether the gate found nothing new to ingest
    pub fn skipped(&self) -> bool {
        self.decision.is_some_and(|d| !d.should_run())
    }

    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_err()).count()
    }

    pub fn totals(&self) -> ImportStats {
        let mut totals = ImportStats::default();
        for stats in self.files.iter().filter_map(|f| f.result.as_ref().ok()) {
            totals.merge(stats);
        }
        totals
    }

    /// No file, row or reference table failed
    pub fn is_success(&self) -> bool {
        self.failed_files() == 0
            && self.totals().failed == 0
            && self
                .references
                .as_ref()
                .map_or(true, ReferenceReport::all_loaded)
    }

    /// Whether the release was ingested completely, so the checkpoint may move
    pub fn is_complete(&self, options: &RunOptions) -> bool {
        !self.files.is_empty() && options.limit_files == 0 && self.is_success()
    }

    pub fn summary(&self) -> String {
        if self.skipped() {
            return "Ingestion skipped - release already ingested".to_string();
        }

        let refs = self
            .references
            .as_ref()
            .map(|r| format!("{} reference tables loaded, {} failed", r.loaded.len(), r.failed.len()))
            .unwrap_or_default();

        if self.decision.is_none() {
            return format!("Reference-only run: {}", refs);
        }

        let totals = self.totals();
        format!(
            "Ingested {} of {} data files ({} created, {} updated, {} failed rows); {}{}",
            self.files.len() - self.failed_files(),
            self.files.len(),
            totals.created,
            totals.updated,
            totals.failed,
            refs,
            if self.checkpoint_advanced {
                "; checkpoint advanced"
            } else {
                ""
            }
        )
    }
}

pub struct IngestPipeline {
    resolver: Arc<dyn CatalogResolver>,
    gate: FreshnessGate,
    references: ReferenceLoader,
    fetcher: Fetcher,
    importer: CompanyImporter,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn Storage>,
        resolver: Arc<dyn CatalogResolver>,
        fetcher: Fetcher,
        schema: Arc<Schema>,
        reference_doc_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            resolver,
            gate: FreshnessGate::new(store.clone()),
            references: ReferenceLoader::new(store.clone(), fetcher.clone(), reference_doc_url),
            importer: CompanyImporter::new(store, schema)?,
            fetcher,
        })
    }

    /// Run the pipeline
    ///
    /// Steps:
    /// 1. Resolve the release catalog
    /// 2. Check the release against the checkpoint
    /// 3. Load reference tables (best effort)
    /// 4. Fetch, extract and import every data file concurrently
    /// 5. Advance the checkpoint if every file, row and reference table loaded
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        info!("Phase 1: Resolving catalog");
        let catalog = self.resolver.resolve().await?;

        if options.aux_only {
            info!("Reference-only mode, skipping freshness check and data files");
            return Ok(RunReport {
                references: Some(self.references.load_all(&catalog).await),
                ..Default::default()
            });
        }

        info!("Phase 2: Freshness check");
        let gate = self.gate.check(&catalog.last_updated, options.force).await?;
        let mut report = RunReport {
            release_date: Some(gate.release_date),
            decision: Some(gate.decision),
            ..Default::default()
        };

        if !gate.decision.should_run() {
            info!(release = %gate.release_date, "No new release to ingest");
            return Ok(report);
        }

        info!("Phase 3: Loading reference tables");
        report.references = Some(self.references.load_all(&catalog).await);

        info!("Phase 4: Importing data files");
        report.files = self.import_data_files(&catalog, options.limit_files).await;

        if report.is_complete(options) {
            info!("Phase 5: Advancing checkpoint");
            self.gate.advance(gate.release_date).await?;
            report.checkpoint_advanced = true;
        } else {
            warn!(
                failed_files = report.failed_files(),
                failed_rows = report.totals().failed,
                failed_references = report.references.as_ref().map_or(0, |r| r.failed.len()),
                limit_files = options.limit_files,
                "Checkpoint left unchanged"
            );
        }

        info!(summary = %report.summary(), "Ingestion run finished");
        Ok(report)
    }

    async fn import_data_files(&self, catalog: &Catalog, limit: usize) -> Vec<FileOutcome> {
        let files = select_data_files(&catalog.data_files, limit);
        info!(files = files.len(), available = catalog.data_files.len(), "Dispatching data files");

        let mut tasks = JoinSet::new();
        for file in files {
            let fetcher = self.fetcher.clone();
            let importer = self.importer.clone();
            tasks.spawn(async move {
                let result = match fetcher.fetch_and_extract(&file).await {
                    Ok(payload) => importer.import_file(&payload).await,
                    Err(e) => Err(e),
                };
                (file, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((file, Ok(stats))) => FileOutcome {
                    file,
                    result: Ok(stats),
                },
                Ok((file, Err(e))) => {
                    error!(file = %file, error = %e, "Data file failed");
                    FileOutcome {
                        file,
                        result: Err(e.to_string()),
                    }
                },
                Err(e) => {
                    error!(error = %e, "Data file task panicked");
                    FileOutcome {
                        file: "<unknown>".to_string(),
                        result: Err(e.to_string()),
                    }
                },
            };
            outcomes.push(outcome);
        }

        outcomes.sort_by(|a, b| a.file.cmp(&b.file));
        outcomes
    }
}
