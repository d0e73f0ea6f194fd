//! Release catalog discovery
//!
//! The registry publishes each release as a page of links to zipped tables
//! plus a "Data da última extração: DD/MM/YYYY" paragraph. The pipeline only
//! depends on [`CatalogResolver`]; [`HtmlCatalogResolver`] scrapes that page.

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

/// Files and freshness marker of one published release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Main data tables (base companies and establishments)
    pub data_files: Vec<String>,
    /// Zipped status-reason table
    pub status_file: Option<String>,
    /// Zipped city table
    pub city_file: Option<String>,
    /// Last-updated marker, `DD/MM/YYYY`
    pub last_updated: String,
}

#[async_trait]
pub trait CatalogResolver: Send + Sync {
    async fn resolve(&self) -> Result<Catalog>;
}

const DATA_FILE_PATTERN: &str = r"(EMPRECSV|ESTABELE)\.zip";
const STATUS_FILE_PATTERN: &str = r"MOTICSV\.zip";
const CITY_FILE_PATTERN: &str = r"MUNICCSV\.zip";
const LAST_UPDATED_PATTERN: &str = r"(?s)Data.*:.*([0-9]{2}/[0-9]{2}/[0-9]{4})";

/// Scrapes the registry's public download page
pub struct HtmlCatalogResolver {
    client: Client,
    page_url: Url,
}

impl HtmlCatalogResolver {
    pub fn new(client: Client, main_url: &str) -> Result<Self> {
        let page_url = Url::parse(main_url).map_err(|e| IngestError::InvalidUrl {
            url: main_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { client, page_url })
    }
}

#[async_trait]
impl CatalogResolver for HtmlCatalogResolver {
    async fn resolve(&self) -> Result<Catalog> {
        info!(url = %self.page_url, "Resolving release catalog");

        let html = self
            .client
            .get(self.page_url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let catalog = parse_catalog(&html, &self.page_url)?;

        info!(
            data_files = catalog.data_files.len(),
            last_updated = %catalog.last_updated,
            "Catalog resolved"
        );

        Ok(catalog)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| IngestError::Catalog(format!("bad selector '{}': {}", css, e)))
}

/// Extract the release catalog from the download page HTML
pub fn parse_catalog(html: &str, page_url: &Url) -> Result<Catalog> {
    let document = Html::parse_document(html);
    let data_pattern = Regex::new(DATA_FILE_PATTERN)?;
    let status_pattern = Regex::new(STATUS_FILE_PATTERN)?;
    let city_pattern = Regex::new(CITY_FILE_PATTERN)?;
    let date_pattern = Regex::new(LAST_UPDATED_PATTERN)?;

    let mut data_files: Vec<String> = Vec::new();
    let mut status_file = None;
    let mut city_file = None;

    for element in document.select(&selector("a[href]")?) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(target) = page_url.join(href.trim()) else {
            debug!(href = %href, "Skipping unparseable link");
            continue;
        };
        let target = target.to_string();

        if data_pattern.is_match(&target) {
            if !data_files.contains(&target) {
                data_files.push(target);
            }
        } else if status_pattern.is_match(&target) {
            status_file.get_or_insert(target);
        } else if city_pattern.is_match(&target) {
            city_file.get_or_insert(target);
        }
    }

    let last_updated = document
        .select(&selector("p")?)
        .map(|p| p.text().collect::<String>())
        .find_map(|text| {
            date_pattern
                .captures(&text)
                .map(|caps| caps[1].to_string())
        })
        .ok_or_else(|| IngestError::Catalog("page has no last-updated date".to_string()))?;

    Ok(Catalog {
        data_files,
        status_file,
        city_file,
        last_updated,
    })
}
