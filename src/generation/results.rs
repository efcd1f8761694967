//! Local copies of generated images, so results outlive the backend's CDN.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use url::Url;

use super::ImageRef;
use crate::constants::{RESULT_FETCH_TIMEOUT, RESULTS_ROUTE_PREFIX};
use crate::error::DownloadError;

/// Saves remote result images as `{dir}/{session_id}_{index}.jpg`.
#[derive(Clone, Debug)]
pub struct ResultStore {
    dir: PathBuf,
    client: reqwest::Client,
}

impl ResultStore {
    /// A store rooted at `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// The directory copies land in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replaces each remote image with a reference to a local copy.
    ///
    /// Relative references are already served by us and pass through untouched. An
    /// image that can't be fetched or saved keeps its original reference.
    pub async fn persist(&self, session_id: &str, images: Vec<ImageRef>) -> Vec<ImageRef> {
        let mut persisted = Vec::with_capacity(images.len());
        for (index, image) in images.into_iter().enumerate() {
            let Some(url) = remote_url(&image) else {
                persisted.push(image);
                continue;
            };
            match self.persist_one(session_id, index, url).await {
                Ok(local) => persisted.push(local),
                Err(err) => {
                    warn!("Failed to save image {}: {}, keeping {}", index, err, image);
                    persisted.push(image);
                }
            }
        }
        persisted
    }

    async fn persist_one(
        &self,
        session_id: &str,
        index: usize,
        url: Url,
    ) -> Result<ImageRef, DownloadError> {
        let resp = tokio::time::timeout(RESULT_FETCH_TIMEOUT, self.client.get(url).send())
            .await
            .map_err(|_| DownloadError::Fetch("timed out".to_string()))??;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;

        let name = format!("{session_id}_{index}.jpg");
        let path = self.dir.join(&name);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(DownloadError::Save)?;
        if let Err(err) = tokio::fs::write(&path, &bytes).await {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await
                && remove_err.kind() != ErrorKind::NotFound
            {
                warn!("Failed to remove partial result {}: {}", path.display(), remove_err);
            }
            return Err(DownloadError::Save(err));
        }
        debug!("Saved result image {} ({} bytes)", path.display(), bytes.len());
        Ok(ImageRef(format!("{RESULTS_ROUTE_PREFIX}/{name}")))
    }

    /// Number of saved result images.
    pub async fn count(&self) -> Result<usize, std::io::Error> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_jpg = entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg"));
            if is_jpg && entry.file_type().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Where a saved result called `name` lives, if `name` is a plain file name.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        let plain = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        plain.then(|| self.dir.join(name))
    }
}

fn remote_url(image: &ImageRef) -> Option<Url> {
    Url::parse(image.as_str())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}
