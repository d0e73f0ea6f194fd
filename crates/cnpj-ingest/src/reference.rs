//! Reference tables used for enrichment
//!
//! Status reasons and cities come as zipped `code;text` tables, downloaded
//! straight from the catalog link with no probe or mirror; risk grades are
//! scraped from the text of the NR-04 PDF. The three loaders run as
//! independent tasks and a failure in one never stops the others.

use crate::catalog::Catalog;
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::importer::ImportStats;
use crate::storage::{Entity, Storage, StorageExt};
use crate::table::{self, SourceEncoding};
use cnpj_common::types::{City, RiskLevel, StatusReason};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// CNAE class (`07.10-3`) followed, later on the same line, by the risk digit
const RISK_LINE_PATTERN: &str = r"([0-9]{2}\.[0-9]{2}-[0-9]).*([0-9])";

pub const STATUS_REASONS_LABEL: &str = "Importing status reasons from CSV file";
pub const CITIES_LABEL: &str = "Importing cities from CSV file";
pub const RISK_LEVELS_LABEL: &str = "Importing risk levels from PDF file";

/// Result of [`ReferenceLoader::load_all`]
#[derive(Debug, Default)]
pub struct ReferenceReport {
    pub loaded: Vec<(&'static str, ImportStats)>,
    pub failed: Vec<(&'static str, String)>,
}

impl ReferenceReport {
    pub fn all_loaded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct ReferenceLoader {
    store: Arc<dyn Storage>,
    fetcher: Fetcher,
    reference_doc_url: String,
}

impl ReferenceLoader {
    pub fn new(store: Arc<dyn Storage>, fetcher: Fetcher, reference_doc_url: impl Into<String>) -> Self {
        Self {
            store,
            fetcher,
            reference_doc_url: reference_doc_url.into(),
        }
    }

    /// Run the three loaders concurrently and wait for all of them
    pub async fn load_all(&self, catalog: &Catalog) -> ReferenceReport {
        let mut tasks = JoinSet::new();

        let loader = self.clone();
        let status_file = catalog.status_file.clone();
        tasks.spawn(async move {
            (STATUS_REASONS_LABEL, loader.load_status_reasons(status_file.as_deref()).await)
        });

        let loader = self.clone();
        let city_file = catalog.city_file.clone();
        tasks.spawn(async move { (CITIES_LABEL, loader.load_cities(city_file.as_deref()).await) });

        let loader = self.clone();
        tasks.spawn(async move { (RISK_LEVELS_LABEL, loader.load_risk_levels().await) });

        let mut report = ReferenceReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((label, Ok(stats))) => {
                    info!(
                        task = label,
                        rows = stats.rows,
                        created = stats.created,
                        updated = stats.updated,
                        failed = stats.failed,
                        "Reference table loaded"
                    );
                    report.loaded.push((label, stats));
                },
                Ok((label, Err(e))) => {
                    error!(task = label, error = %e, "Reference table load failed");
                    report.failed.push((label, e.to_string()));
                },
                Err(e) => {
                    error!(error = %e, "Reference loader task panicked");
                    report.failed.push(("reference loader", e.to_string()));
                },
            }
        }

        report
    }

    pub async fn load_status_reasons(&self, file_url: Option<&str>) -> Result<ImportStats> {
        let url = file_url
            .ok_or_else(|| IngestError::Catalog("catalog lists no status reason table".to_string()))?;
        let payload = self.fetcher.fetch_direct(url).await?;
        self.import_status_file(&payload).await
    }

    pub async fn load_cities(&self, file_url: Option<&str>) -> Result<ImportStats> {
        let url =
            file_url.ok_or_else(|| IngestError::Catalog("catalog lists no city table".to_string()))?;
        let payload = self.fetcher.fetch_direct(url).await?;
        self.import_city_file(&payload).await
    }

    pub async fn import_status_file(&self, path: &Path) -> Result<ImportStats> {
        self.import_code_table(path, |code, reason| StatusReason { code, reason })
            .await
    }

    pub async fn import_city_file(&self, path: &Path) -> Result<ImportStats> {
        self.import_code_table(path, |code, name| City { code, name })
            .await
    }

    /// Download the NR-04 PDF and upsert one risk grade per matching line
    pub async fn load_risk_levels(&self) -> Result<ImportStats> {
        info!(url = %self.reference_doc_url, "Downloading risk level reference document");

        let bytes = self
            .fetcher
            .client()
            .get(&self.reference_doc_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| IngestError::ReferenceDocument(e.to_string()))
        })
        .await??;

        let levels = parse_risk_levels(&text)?;
        if levels.is_empty() {
            return Err(IngestError::ReferenceDocument(
                "no risk grades found in document text".to_string(),
            ));
        }

        let mut stats = ImportStats::default();
        for level in &levels {
            stats.rows += 1;
            self.upsert_counted(level, &mut stats).await;
        }
        Ok(stats)
    }

    async fn import_code_table<E, F>(&self, path: &Path, build: F) -> Result<ImportStats>
    where
        E: Entity,
        F: Fn(i64, String) -> E,
    {
        let source: PathBuf = path.to_path_buf();
        let rows = tokio::task::spawn_blocking(move || -> Result<Vec<Result<Vec<String>>>> {
            Ok(table::rows(&source, SourceEncoding::Utf8)?.collect())
        })
        .await??;

        let mut stats = ImportStats::default();
        for row in rows {
            let Some((code, text)) = row.ok().as_deref().and_then(code_and_text) else {
                stats.skipped += 1;
                continue;
            };
            stats.rows += 1;
            self.upsert_counted(&build(code, text), &mut stats).await;
        }

        Ok(stats)
    }

    async fn upsert_counted<E: Entity>(&self, entity: &E, stats: &mut ImportStats) {
        match self.store.upsert_entity(entity).await {
            Ok(upserted) if upserted.created => stats.created += 1,
            Ok(_) => stats.updated += 1,
            Err(e) => {
                warn!(kind = %E::KIND, key = %entity.key(), error = %e, "Failed to upsert reference row");
                stats.failed += 1;
            },
        }
    }
}

/// `code;text` row with an integer code
fn code_and_text(row: &[String]) -> Option<(i64, String)> {
    let code = row.first()?.trim().parse().ok()?;
    let text = row.get(1).map(|t| t.trim().to_string()).unwrap_or_default();
    Some((code, text))
}

/// Risk grades from the NR-04 table text, one per matching line
pub fn parse_risk_levels(text: &str) -> Result<Vec<RiskLevel>> {
    let pattern = Regex::new(RISK_LINE_PATTERN)?;

    Ok(text
        .lines()
        .filter_map(|line| pattern.captures(line))
        .map(|caps| RiskLevel {
            activity_prefix: caps[1].replace(['.', '-'], ""),
            grade: caps[2].to_string(),
        })
        .collect())
}
