//! Persists uploads into one flat directory under collision-free names.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use super::{AssetKind, StoredAsset, UploadedAsset};
use crate::constants::TOKEN_LENGTH;
use crate::error::StorageError;

/// Attempts at finding a free name before giving up.
const NAME_ATTEMPTS: usize = 4;

/// Writes uploaded assets as `{kind}-{timestamp}-{token}.{ext}`.
#[derive(Clone, Debug)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    /// A store rooted at `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory assets land in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves an asset under a fresh unique name.
    ///
    /// Files are opened with `create_new`, so an existing file is never overwritten even
    /// if two names were somehow to collide.
    #[instrument(level = "debug", skip_all, fields(kind = %kind, filename = %asset.filename))]
    pub async fn save(
        &self,
        asset: &UploadedAsset,
        kind: AssetKind,
    ) -> Result<StoredAsset, StorageError> {
        // create_dir_all tolerates another caller creating the directory first
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let ext = extension_for(asset);
        let mut last_err = None;
        for _ in 0..NAME_ATTEMPTS {
            let path = self.dir.join(asset_file_name(kind, &ext));
            match write_new(&path, &asset.bytes).await {
                Ok(()) => {
                    debug!("Stored {} asset at {}", kind, path.display());
                    return Ok(StoredAsset { path, kind });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    warn!("Asset name {} already taken, retrying", path.display());
                    last_err = Some((path, err));
                }
                Err(source) => return Err(StorageError::Write { path, source }),
            }
        }
        let (path, source) = last_err.unwrap_or_else(|| {
            (
                self.dir.clone(),
                std::io::Error::from(ErrorKind::AlreadyExists),
            )
        });
        Err(StorageError::Write { path, source })
    }

    /// Deletes a stored asset, ignoring ones that are already gone.
    pub async fn remove(&self, asset: &StoredAsset) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(&asset.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Number of files currently stored.
    pub async fn count(&self) -> Result<usize, std::io::Error> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    write_or_discard(path, file, bytes).await
}

/// Writes `bytes` through `writer`, deleting `path` again if the write doesn't complete.
async fn write_or_discard<W>(
    path: &Path,
    mut writer: W,
    bytes: &[u8],
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let outcome = match writer.write_all(bytes).await {
        Ok(()) => writer.flush().await,
        Err(err) => Err(err),
    };
    let Err(err) = outcome else {
        return Ok(());
    };
    drop(writer);
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial write {}", path.display()),
        Err(remove_err) if remove_err.kind() == ErrorKind::NotFound => {}
        Err(remove_err) => warn!(
            "Failed to remove partial write {}: {}",
            path.display(),
            remove_err
        ),
    }
    Err(err)
}

fn asset_file_name(kind: AssetKind, ext: &str) -> String {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!(
        "{}-{}-{}.{}",
        kind.as_str(),
        Utc::now().timestamp_millis(),
        token,
        ext
    )
}

/// Picks the file extension from the original name, falling back to the MIME type.
fn extension_for(asset: &UploadedAsset) -> String {
    let from_name = Path::new(&asset.filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);
    if let Some(ext) = from_name {
        return ext;
    }
    let from_mime = match asset.content_type.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => Some("jpg"),
        Some("image/png") => Some("png"),
        Some("image/webp") => Some("webp"),
        Some("image/gif") => Some("gif"),
        _ => None,
    };
    from_mime.unwrap_or("bin").to_string()
}
