//! CNPJ Ingest - loads the CNPJ open-data release into PostgreSQL

use anyhow::{Context, Result};
use clap::Parser;
use cnpj_common::logging::{init_logging, LogConfig, LogLevel};
use cnpj_ingest::{
    catalog::HtmlCatalogResolver,
    config::{DownloadConfig, IngestConfig},
    fetch::{build_http_client, Fetcher},
    pipeline::{IngestPipeline, RunOptions},
    schema::Schema,
    storage::PgStorage,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cnpj-ingest")]
#[command(author, version, about = "CNPJ open-data ingestion tool")]
struct Cli {
    /// Download config (catalog page, mirrors, NR-04 document)
    #[arg(long, env = "CNPJ_DOWNLOAD_CONFIG", default_value = "config/companies-download.json")]
    config: PathBuf,

    /// Field position/type schema for the data tables
    #[arg(long, env = "CNPJ_SCHEMA", default_value = "config/cnpj-schema.json")]
    schema: PathBuf,

    /// Only load the reference tables (status reasons, cities, risk levels)
    #[arg(long)]
    aux_only: bool,

    /// Ingest even if the release is not newer than the checkpoint
    #[arg(long)]
    force: bool,

    /// Import at most N data files per record kind (0 = all)
    #[arg(long, default_value_t = 0)]
    limit_files: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("cnpj-ingest")
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_over(log_config)?;
    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Failed to load configuration")?;
    let download = DownloadConfig::load(&cli.config)
        .with_context(|| format!("Failed to load download config {}", cli.config.display()))?;
    let schema = Schema::load(&cli.schema)
        .with_context(|| format!("Failed to load schema {}", cli.schema.display()))?;

    let store = PgStorage::connect(&config.database())
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;

    let client = build_http_client(config.http_connect_timeout())?;
    let fetcher = Fetcher::new(
        client.clone(),
        download.mirror_urls.clone(),
        &config.data_download_path,
        config.http_probe_timeout(),
    );
    let resolver = HtmlCatalogResolver::new(client, &download.main_url)?;

    let pipeline = IngestPipeline::new(
        Arc::new(store),
        Arc::new(resolver),
        fetcher,
        Arc::new(schema),
        download.reference_doc_url.clone(),
    )?;

    let options = RunOptions {
        force: cli.force,
        aux_only: cli.aux_only,
        limit_files: cli.limit_files,
    };

    let report = pipeline.run(&options).await?;

    if report.is_success() {
        info!("{}", report.summary());
        Ok(())
    } else {
        warn!("{}", report.summary());
        anyhow::bail!("Ingestion finished with failures")
    }
}
