// src/utils.rs
//! File system helpers shared by config, database and export

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Creates `path` and its parents when missing
pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    info!("Created directory: {}", path.display());
    Ok(())
}

pub async fn read_file_safe(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Writes `content`, creating parent directories first
pub async fn write_file_safe(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent).await?;
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    info!("Written file: {}", path.display());
    Ok(())
}

/// Absolute paths pass through; relative ones are joined onto `base`
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
