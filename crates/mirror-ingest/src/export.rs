//! Daily catalog export retrieval
//!
//! Exports are published as `<base>/posts-YYYY-MM-DD.csv.gz`. The archive is
//! streamed to disk, decompressed next to it and then removed, leaving
//! `posts-YYYY-MM-DD.csv` for the classifier.

use crate::error::{IngestError, Result};
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// `posts-YYYY-MM-DD`
pub fn export_name(date: NaiveDate) -> String {
    format!("posts-{}", date.format("%Y-%m-%d"))
}

pub struct ExportFetcher {
    client: Client,
    base_url: String,
    show_progress: bool,
}

impl ExportFetcher {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            show_progress: true,
        }
    }

    /// Disable the download progress bar
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn export_url(&self, date: NaiveDate) -> String {
        format!("{}/{}.csv.gz", self.base_url, export_name(date))
    }

    /// Download and decompress the export for `date` into `dir`
    ///
    /// Returns the path of the uncompressed CSV.
    pub async fn fetch(&self, date: NaiveDate, dir: &Path) -> Result<PathBuf> {
        let name = export_name(date);
        let archive = dir.join(format!("{}.csv.gz", name));
        let csv = dir.join(format!("{}.csv", name));

        self.download(&self.export_url(date), &archive).await?;

        info!("Decompressing {}", archive.display());
        let (src, dst) = (archive.clone(), csv.clone());
        let written = tokio::task::spawn_blocking(move || gunzip(&src, &dst)).await??;
        info!("Decompressed export: {} bytes ({} MB)", written, written / (1024 * 1024));

        tokio::fs::remove_file(&archive).await?;
        Ok(csv)
    }

    async fn download(&self, url: &str, output: &Path) -> Result<()> {
        info!("Downloading export from: {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status,
            });
        }

        let pb = self.progress_bar(response.content_length().unwrap_or(0), output);

        let mut file = tokio::fs::File::create(output).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;

        pb.finish_and_clear();
        info!("Downloaded export: {} bytes ({} MB)", downloaded, downloaded / (1024 * 1024));
        Ok(())
    }

    fn progress_bar(&self, size: u64, output: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(size);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(format!("Downloading {}", name));
        pb
    }
}

/// Decompress a gzip file, returning the number of bytes written
fn gunzip(src: &Path, dst: &Path) -> Result<u64> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut out = BufWriter::new(File::create(dst)?);
    let written = std::io::copy(&mut decoder, &mut out)?;
    std::io::Write::flush(&mut out)?;
    debug!("Decompressed {} -> {}", src.display(), dst.display());
    Ok(written)
}
