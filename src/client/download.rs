//! Fetch-and-save of result images.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::DownloadError;
use crate::generation::ImageRef;

/// Resolves an image reference to its bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Reads the image behind `image`
    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, DownloadError>;
}

/// Offers downloaded bytes to the user as a named file.
#[async_trait]
pub trait ImageSink: Send + Sync {
    /// Saves `bytes` as `file_name`, returning where it went
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<PathBuf, DownloadError>;
}

/// `story-image-{n}.jpg`, with `n` the 1-based position.
pub fn download_file_name(index: usize) -> String {
    format!("story-image-{}.jpg", index + 1)
}

pub(crate) async fn fetch_and_save<F, S>(
    fetcher: &F,
    sink: &S,
    image: &ImageRef,
    index: usize,
) -> Result<PathBuf, DownloadError>
where
    F: ImageFetcher + ?Sized,
    S: ImageSink + ?Sized,
{
    let bytes = fetcher.fetch(image).await?;
    debug!("Fetched {} bytes for {}", bytes.len(), image);
    sink.save(&download_file_name(index), bytes).await
}

/// Writes downloads into a local directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// A sink writing into `dir`, created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(DownloadError::Save)?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(DownloadError::Save)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_one_based() {
        assert_eq!(download_file_name(0), "story-image-1.jpg");
        assert_eq!(download_file_name(3), "story-image-4.jpg");
    }

    #[tokio::test]
    async fn directory_sink_writes_named_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::new(tmp.path().join("out"));
        let path = sink
            .save("story-image-1.jpg", b"img".to_vec())
            .await
            .expect("save");
        assert_eq!(path, tmp.path().join("out").join("story-image-1.jpg"));
        assert_eq!(std::fs::read(path).expect("read"), b"img");
    }
}
