// Flat JSON files are the only persistence this service has. Every write goes
// through a sibling temp file and a rename so readers never see half a file.
use std::{io::ErrorKind, path::{Path, PathBuf}};
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io { path: path.to_path_buf(), source }
    }
}

/// Reads a JSON document, returning `None` if the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Format { path: path.to_path_buf(), source })
}

/// Like [`read_json`], but a missing file is created holding `T::default()`.
pub async fn read_json_or_init<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Serialize + Default,
{
    match read_json(path).await? {
        Some(value) => Ok(value),
        None => {
            let value = T::default();
            write_json_atomic(path, &value).await?;
            Ok(value)
        }
    }
}

pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| StoreError::io(parent, e))?;
    }

    let body = serde_json::to_vec_pretty(value)
        .map_err(|source| StoreError::Format { path: path.to_path_buf(), source })?;

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, &body).await.map_err(|e| StoreError::io(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        fs::remove_file(&tmp_path).await.ok();
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
