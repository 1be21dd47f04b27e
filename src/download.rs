// src/download.rs

//! Package and catalog download functionality.
//!
//! Two modes are provided. `fetch_one` is a synchronous one-shot transfer
//! used for small critical fetches (public keys, per-update archives).
//! `fetch_many` drives up to [`MAX_CONCURRENT_TRANSFERS`] transfers through
//! a non-blocking event loop and is used for catalog and batch package
//! fetches. Both skip targets that already exist in the cache and remove
//! partial files on failure.

use crate::error::{Error, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Maximum transfers in flight at once for batch downloads.
pub const MAX_CONCURRENT_TRANSFERS: usize = 10;

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Whole-transfer timeout.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// Buffer size for streaming one-shot downloads.
const STREAM_BUFFER_SIZE: usize = 8192;

/// One download job: a source URL and its destination path.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
        }
    }
}

fn transfer_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:.cyan} [{bar:30}] {bytes}/{total_bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn ensure_parent_dir(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Download(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

fn display_name(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dest.display().to_string())
}

/// Download a single file synchronously.
///
/// A pre-existing destination counts as success. The partial file is
/// removed on any transport or HTTP error.
pub fn fetch_one(url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        debug!("Already cached, skipping download: {}", dest.display());
        return Ok(());
    }

    info!("Downloading {} -> {}", url, dest.display());
    ensure_parent_dir(dest)?;

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TRANSFER_TIMEOUT)
        .user_agent(concat!("Starpack/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Download(format!("failed to create HTTP client: {}", e)))?;

    let result = (|| -> Result<()> {
        let mut response = client
            .get(url)
            .send()
            .map_err(|e| Error::Download(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::Download(format!("HTTP {} from {}", status, url)));
        }

        let bar = ProgressBar::new(response.content_length().unwrap_or(0));
        bar.set_style(transfer_style());
        bar.set_message(display_name(dest));

        let mut file = File::create(dest).map_err(|e| {
            Error::Download(format!("failed to create {}: {}", dest.display(), e))
        })?;

        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::Download(format!("read error from {}: {}", url, e)))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| Error::Download(format!("write error to {}: {}", dest.display(), e)))?;
            bar.inc(n as u64);
        }
        bar.finish_and_clear();
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

/// Download a batch of files with up to ten concurrent transfers.
///
/// Every transfer runs to completion even after a failure so partial files
/// can be cleaned up; the batch fails if any transfer failed.
pub fn fetch_many(tasks: &[DownloadTask]) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Download(format!("failed to start download event loop: {}", e)))?;

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TRANSFER_TIMEOUT)
        .user_agent(concat!("Starpack/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Download(format!("failed to create HTTP client: {}", e)))?;

    let failures = runtime.block_on(run_batch(client, tasks.to_vec()));

    if failures.is_empty() {
        Ok(())
    } else {
        for failure in &failures {
            warn!("{}", failure);
        }
        Err(Error::Download(format!(
            "{} of {} transfers failed",
            failures.len(),
            tasks.len()
        )))
    }
}

async fn run_batch(client: reqwest::Client, tasks: Vec<DownloadTask>) -> Vec<String> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_TRANSFERS));
    let progress = MultiProgress::new();
    let mut set = tokio::task::JoinSet::new();

    for task in tasks {
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        let progress = progress.clone();

        set.spawn(async move {
            // Closed only on runtime shutdown, which cannot happen mid-batch.
            let Ok(_permit) = semaphore.acquire().await else {
                return Err(format!("transfer queue closed for {}", task.url));
            };
            transfer(&client, &task, &progress).await
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => failures.push(msg),
            Err(e) => failures.push(format!("transfer task panicked: {}", e)),
        }
    }
    failures
}

async fn transfer(
    client: &reqwest::Client,
    task: &DownloadTask,
    progress: &MultiProgress,
) -> std::result::Result<(), String> {
    if task.dest.exists() {
        debug!("Already cached, skipping download: {}", task.dest.display());
        return Ok(());
    }

    if let Err(e) = ensure_parent_dir(&task.dest) {
        return Err(e.to_string());
    }

    let result = stream_to_file(client, task, progress).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&task.dest).await;
    }
    result
}

async fn stream_to_file(
    client: &reqwest::Client,
    task: &DownloadTask,
    progress: &MultiProgress,
) -> std::result::Result<(), String> {
    let mut response = client
        .get(&task.url)
        .send()
        .await
        .map_err(|e| format!("failed to fetch {}: {}", task.url, e))?;

    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(format!("HTTP {} from {}", status, task.url));
    }

    let bar = progress.add(ProgressBar::new(response.content_length().unwrap_or(0)));
    bar.set_style(transfer_style());
    bar.set_message(display_name(&task.dest));

    let mut file = tokio::fs::File::create(&task.dest)
        .await
        .map_err(|e| format!("failed to create {}: {}", task.dest.display(), e))?;

    loop {
        let chunk = response
            .chunk()
            .await
            .map_err(|e| format!("read error from {}: {}", task.url, e))?;
        let Some(chunk) = chunk else { break };
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write error to {}: {}", task.dest.display(), e))?;
        bar.inc(chunk.len() as u64);
    }

    file.flush()
        .await
        .map_err(|e| format!("flush error for {}: {}", task.dest.display(), e))?;
    bar.finish_and_clear();
    Ok(())
}
