//! Download with mirror fallback
//!
//! A release file is looked up in its own directory first, then under each
//! configured mirror. The first location whose HEAD response declares a zip
//! content type is downloaded into the working directory and extracted.

use crate::archive;
use crate::error::{IngestError, Result};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Content-type fragment a location must declare to be accepted
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Shared HTTP client with a connect deadline
pub fn build_http_client(connect_timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("cnpj-ingest/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| IngestError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Last path segment of `url`
pub fn file_name(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::InvalidUrl {
            url: url.to_string(),
            reason: "no file name in path".to_string(),
        })
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    mirrors: Vec<String>,
    work_dir: PathBuf,
    probe_timeout: Duration,
    progress: MultiProgress,
}

impl Fetcher {
    pub fn new(
        client: Client,
        mirrors: Vec<String>,
        work_dir: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            client,
            mirrors,
            work_dir: work_dir.into(),
            probe_timeout,
            progress: MultiProgress::new(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The file's own URL followed by the same file name under each mirror
    pub fn candidate_urls(&self, file_url: &str) -> Result<Vec<Url>> {
        let own = parse_url(file_url)?;
        let name = file_name(&own)?;
        let mut candidates = vec![own];

        for mirror in &self.mirrors {
            let base = if mirror.ends_with('/') {
                parse_url(mirror)?
            } else {
                parse_url(&format!("{}/", mirror))?
            };
            match base.join(&name) {
                Ok(url) => candidates.push(url),
                Err(e) => warn!(mirror = %mirror, error = %e, "Skipping unusable mirror"),
            }
        }

        Ok(candidates)
    }

    /// HEAD `url` and report whether it serves a zip archive
    pub async fn probe(&self, url: &Url) -> bool {
        let response = match self
            .client
            .head(url.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                return false;
            },
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let accepted = content_type.contains(ZIP_CONTENT_TYPE);
        debug!(url = %url, content_type = %content_type, accepted, "Probed download location");
        accepted
    }

    /// First candidate location that passes the probe
    pub async fn resolve_download_url(&self, file_url: &str) -> Result<Url> {
        for candidate in self.candidate_urls(file_url)? {
            if self.probe(&candidate).await {
                return Ok(candidate);
            }
        }

        Err(IngestError::NoArchiveSource {
            file: file_url.to_string(),
        })
    }

    /// Stream `url` into the working directory, named after the final URL
    pub async fn download(&self, url: &Url) -> Result<PathBuf> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let name = file_name(response.url())?;
        let target = self.work_dir.join(&name);

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let mut file = tokio::fs::File::create(&target).await?;

        let bar = self
            .progress
            .add(download_bar(response.content_length().unwrap_or(0), &name));
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            bar.set_position(downloaded);
        }
        file.flush().await?;
        bar.finish_and_clear();

        info!(url = %url, file = %target.display(), bytes = downloaded, "Downloaded");
        Ok(target)
    }

    /// Download `file_url` from the first qualifying location and extract it.
    ///
    /// Returns the local path of the archive's payload table.
    pub async fn fetch_and_extract(&self, file_url: &str) -> Result<PathBuf> {
        let url = self.resolve_download_url(file_url).await?;
        self.download_and_extract(&url).await
    }

    /// Download `file_url` as listed, without probing or mirrors, and extract it
    pub async fn fetch_direct(&self, file_url: &str) -> Result<PathBuf> {
        let url = parse_url(file_url)?;
        self.download_and_extract(&url).await
    }

    async fn download_and_extract(&self, url: &Url) -> Result<PathBuf> {
        let archive_path = self.download(url).await?;

        let dest = self.work_dir.clone();
        let payload = tokio::task::spawn_blocking(move || {
            archive::extract_payload(&archive_path, &dest)
        })
        .await??;

        info!(file = %payload.display(), "Extracted payload");
        Ok(payload)
    }
}

fn download_bar(total: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_message(format!("Downloading {}", name));
    bar
}
