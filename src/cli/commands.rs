//! Command handlers
//!
//! Each subcommand maps to one function here. User-facing output goes to
//! stdout; diagnostics go through tracing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::auth::{extract_code, TokenManager};
use crate::cli::progress::{spawn_renderer, TransferStats};
use crate::config::migrate_config;
use crate::drive::{DriveClient, DriveItem};
use crate::error::DriveError;
use crate::transfer::{ProgressReporter, TransferEngine};

/// One `ls`/`search` output line: `d|f name <size>`
pub fn format_entry(item: &DriveItem) -> String {
    let kind = if item.is_folder() { 'd' } else { 'f' };
    format!("{} {} <{}>", kind, item.name, TransferStats::format_bytes(item.size))
}

/// `info` output lines
pub fn format_info(item: &DriveItem) -> Vec<String> {
    let mut lines = vec![
        format!("Name: {}", item.name),
        format!("Size: {} ({})", item.size, TransferStats::format_bytes(item.size)),
    ];
    match (&item.folder, &item.file) {
        (Some(folder), _) => {
            lines.push("Type: folder".to_string());
            lines.push(format!("Children: {}", folder.child_count));
        }
        (None, Some(file)) => {
            lines.push("Type: file".to_string());
            lines.push(format!("MIME type: {}", file.mime_type));
            if let Some(sha1) = &file.hashes.sha1 {
                lines.push(format!("SHA1: {}", sha1));
            }
            if let Some(sha256) = &file.hashes.sha256 {
                lines.push(format!("SHA256: {}", sha256));
            }
            if let Some(quick_xor) = &file.hashes.quick_xor {
                lines.push(format!("QuickXorHash: {}", quick_xor));
            }
        }
        (None, None) => lines.push("Type: unknown".to_string()),
    }
    if let Some(web_url) = &item.web_url {
        lines.push(format!("URL: {}", web_url));
    }
    lines
}

/// Interactive authorization-code login reading from stdin
pub async fn login(tokens: &TokenManager) -> Result<()> {
    login_with(tokens, BufReader::new(tokio::io::stdin())).await
}

/// Login with the redirected URL (or bare code) read from `input`
pub async fn login_with<R: AsyncBufRead + Unpin>(tokens: &TokenManager, mut input: R) -> Result<()> {
    let url = tokens.app().login_url().context("Failed to build login URL")?;
    println!("Open the following URL in a browser and sign in:");
    println!();
    println!("{}", url);
    println!();
    println!("Then paste the URL you were redirected to (or just the code):");

    let mut line = String::new();
    input.read_line(&mut line).await.context("Failed to read from stdin")?;
    let code = extract_code(line.trim())?;
    let credential = tokens.exchange_code(&code).await.context("Login failed")?;

    println!("Login successful, token valid until {}", credential.expiry);
    Ok(())
}

/// Convert an old config plus secret store into `target`
pub async fn migrate(source: &Path, target: &Path) -> Result<()> {
    migrate_config(source, target)
        .await
        .with_context(|| format!("Failed to migrate {}", source.display()))?;
    println!("Configuration migrated to {}", target.display());
    Ok(())
}

pub async fn mkdir(client: &DriveClient, path: &str) -> Result<()> {
    let item = client
        .create_dir(path)
        .await
        .with_context(|| format!("Failed to create folder {}", path))?;
    println!("Created {}", item.name);
    Ok(())
}

pub async fn remove(client: &DriveClient, path: &str) -> Result<()> {
    client
        .delete(path)
        .await
        .with_context(|| format!("Failed to delete {}", path))?;
    println!("Deleted {}", path);
    Ok(())
}

pub async fn list(client: &DriveClient, path: &str) -> Result<()> {
    let items = client
        .list(path)
        .await
        .with_context(|| format!("Failed to list {}", path))?;
    for item in &items {
        println!("{}", format_entry(item));
    }
    debug!("{} entries in {}", items.len(), path);
    Ok(())
}

pub async fn info(client: &DriveClient, path: &str) -> Result<()> {
    let item = client.info(path).await.with_context(|| format!("Failed to get info for {}", path))?;
    for line in format_info(&item) {
        println!("{}", line);
    }
    Ok(())
}

/// Which content hash `sha1`/`sha256` print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha256,
}

pub async fn hash(client: &DriveClient, path: &str, kind: HashKind) -> Result<()> {
    let item = client.info(path).await.with_context(|| format!("Failed to get info for {}", path))?;
    if item.is_folder() {
        anyhow::bail!("{} is a folder", path);
    }
    let hashes = item.hashes();
    let value = match kind {
        HashKind::Sha1 => hashes.sha1,
        HashKind::Sha256 => hashes.sha256,
    };
    match value {
        Some(value) => {
            println!("{}", value.to_lowercase());
            Ok(())
        }
        None => anyhow::bail!("the drive reports no {:?} hash for {}", kind, path),
    }
}

pub async fn search(client: &DriveClient, query: &str) -> Result<()> {
    let items = client.search(query).await.with_context(|| format!("Search for '{}' failed", query))?;
    if items.is_empty() {
        println!("No matches");
    }
    for item in &items {
        println!("{}", format_entry(item));
    }
    Ok(())
}

pub async fn share(client: &DriveClient, path: &str) -> Result<()> {
    let link = client.share(path).await.with_context(|| format!("Failed to share {}", path))?;
    println!("{}", link);
    Ok(())
}

/// Upload `files` one at a time into `dest`.
///
/// Directories and files the engine rejects up front (such as names that
/// are not valid UTF-8) are skipped with a warning; any other failure
/// aborts the batch. Returns the number of files uploaded.
pub async fn upload(engine: &TransferEngine, files: &[PathBuf], dest: &str, quiet: bool) -> Result<usize> {
    let mut uploaded = 0;
    for file in files {
        if tokio::fs::metadata(file).await.map(|m| m.is_dir()).unwrap_or(false) {
            warn!("Skipping directory {}", file.display());
            if !quiet {
                println!("Skipping directory {}", file.display());
            }
            continue;
        }

        let (reporter, rx) = ProgressReporter::channel();
        let renderer = spawn_renderer(rx, quiet);
        let result = engine.upload(file, dest, reporter).await;
        if let Err(e) = renderer.await {
            error!("Progress renderer failed: {}", e);
        }
        match result {
            Ok(()) => uploaded += 1,
            Err(e @ DriveError::ValidationError { .. }) => {
                warn!("Skipping {}: {}", file.display(), e);
                if !quiet {
                    println!("Skipping {}: {}", file.display(), e);
                }
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to upload {}", file.display())),
        }
    }

    if uploaded == 0 {
        anyhow::bail!("no files were uploaded");
    }
    info!("Uploaded {} of {} files", uploaded, files.len());
    Ok(uploaded)
}

pub async fn download(engine: &TransferEngine, remote: &str, local: &Path, quiet: bool) -> Result<PathBuf> {
    let (reporter, rx) = ProgressReporter::channel();
    let renderer = spawn_renderer(rx, quiet);
    let result = engine.download(remote, local, reporter).await;
    if let Err(e) = renderer.await {
        error!("Progress renderer failed: {}", e);
    }
    result.with_context(|| format!("Failed to download {}", remote))
}
