//! Atomic file writes and JSON load/save for the per-run output tree.
//!
//! Writers go through a `.tmp` sibling and a rename, so a concurrent reader
//! sees either the previous file or the complete new one, never a prefix.

use std::io;
use std::path::Path;

/// Atomically write JSON data to a file, pretty-printed.
///
/// Creates parent directories if they don't exist.
pub async fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes()).await
}

/// Atomically write raw bytes to a file.
pub async fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read a file as UTF-8 text.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub async fn read_text(path: &Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub async fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let Some(data) = read_text(path).await? else {
        return Ok(None);
    };
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}
