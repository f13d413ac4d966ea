// Data paths for the Lifeline CLI
//
// Cross-platform storage in:
// - macOS: ~/Library/Application Support/lifeline
// - Linux: ~/.local/share/lifeline
// - Windows: %LOCALAPPDATA%\lifeline

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Application data directory, created on first use.
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Failed to determine data directory")?
        .join("lifeline");

    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    Ok(data_dir)
}

/// Directory holding the sled database (identity, vault, contacts).
pub fn storage_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("storage"))
}
