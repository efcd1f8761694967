//! One request/response cycle around whatever backend is plugged in.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::backend::{BackendRequest, GenerationBackend};
use super::journal::{GenerationJournal, JournalStatus};
use super::results::ResultStore;
use super::store::AssetStore;
use super::validator::validate;
use super::{AssetKind, GenerationRequest, GenerationResult, ImageRef, StoredAsset};
use crate::constants::{DEFAULT_GENERATION_TIMEOUT_SECONDS, GENERIC_FAILURE_MESSAGE, TOKEN_LENGTH};
use crate::error::{BackendError, StorageError};

/// Faults after validation; all of them collapse into one user-facing message.
#[derive(Debug)]
enum RunError {
    Storage(StorageError),
    Backend(BackendError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "storage: {err}"),
            Self::Backend(err) => write!(f, "backend: {err}"),
        }
    }
}

impl From<StorageError> for RunError {
    fn from(err: StorageError) -> Self {
        RunError::Storage(err)
    }
}

impl From<BackendError> for RunError {
    fn from(err: BackendError) -> Self {
        RunError::Backend(err)
    }
}

/// Validates, persists, generates and normalizes. Never fails to its caller.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    store: AssetStore,
    backend: Arc<dyn GenerationBackend>,
    journal: Option<GenerationJournal>,
    results: Option<ResultStore>,
    timeout: Duration,
    cleanup_failed_assets: bool,
}

impl fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("store", &self.store)
            .field("backend", &self.backend.name())
            .field("journal", &self.journal)
            .field("results", &self.results)
            .field("timeout", &self.timeout)
            .field("cleanup_failed_assets", &self.cleanup_failed_assets)
            .finish()
    }
}

impl GenerationOrchestrator {
    /// An orchestrator with the default timeout, no journal, retaining failed assets.
    pub fn new(store: AssetStore, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            store,
            backend,
            journal: None,
            results: None,
            timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECONDS),
            cleanup_failed_assets: false,
        }
    }

    /// Journal every run
    pub fn with_journal(mut self, journal: GenerationJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Keep local copies of remote result images
    pub fn with_results(mut self, results: ResultStore) -> Self {
        self.results = Some(results);
        self
    }

    /// Give up on the backend after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delete stored assets when a later step fails
    pub fn with_cleanup_failed_assets(mut self, cleanup: bool) -> Self {
        self.cleanup_failed_assets = cleanup;
        self
    }

    /// The asset store in use
    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// The journal in use, if any
    pub fn journal(&self) -> Option<&GenerationJournal> {
        self.journal.as_ref()
    }

    /// The result store in use, if any
    pub fn results(&self) -> Option<&ResultStore> {
        self.results.as_ref()
    }

    /// Name of the plugged-in backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Runs one generation.
    ///
    /// Validation failures come back with their specific reason and nothing is written.
    /// Every later fault is logged and reported as [`GENERIC_FAILURE_MESSAGE`].
    #[instrument(
        level = "info",
        skip_all,
        fields(has_face = request.face.is_some(), has_mask = request.mask.is_some())
    )]
    pub async fn run(&self, request: &GenerationRequest) -> GenerationResult {
        if let Err(err) = validate(request) {
            info!("Rejected generation request: {}", err);
            return GenerationResult::failure(err.to_string());
        }

        let session_id = new_session_id();
        let mut stored = Vec::with_capacity(2);
        match self.generate(&session_id, request, &mut stored).await {
            Ok(images) => {
                let images = match &self.results {
                    Some(results) => results.persist(&session_id, images).await,
                    None => images,
                };
                info!(
                    "Generation {} completed with {} images",
                    session_id,
                    images.len()
                );
                self.record(
                    &session_id,
                    JournalStatus::Completed,
                    json!({"num_generated": images.len()}),
                )
                .await;
                GenerationResult::success(images)
            }
            Err(err) => {
                error!("Generation error for {}: {}", session_id, err);
                self.record(
                    &session_id,
                    JournalStatus::Failed,
                    json!({"error": err.to_string()}),
                )
                .await;
                self.handle_orphans(&session_id, &stored).await;
                GenerationResult::failure(GENERIC_FAILURE_MESSAGE)
            }
        }
    }

    async fn generate(
        &self,
        session_id: &str,
        request: &GenerationRequest,
        stored: &mut Vec<StoredAsset>,
    ) -> Result<Vec<ImageRef>, RunError> {
        let Some(face_asset) = request.face.as_ref() else {
            return Err(RunError::Backend(BackendError::Request(
                "face asset disappeared after validation".to_string(),
            )));
        };
        let face = self.store.save(face_asset, AssetKind::Face).await?;
        stored.push(face.clone());
        let mask = match request.mask.as_ref() {
            Some(mask_asset) => {
                let mask = self.store.save(mask_asset, AssetKind::Mask).await?;
                stored.push(mask.clone());
                Some(mask)
            }
            None => None,
        };

        self.record(
            session_id,
            JournalStatus::Started,
            json!({
                "prompt": request.prompt,
                "negative_prompt": request.negative_prompt,
                "options": request.options,
                "has_mask": mask.is_some(),
            }),
        )
        .await;

        // own task, so a backend panic surfaces as a JoinError
        let backend = self.backend.clone();
        let prompt = request.prompt.clone();
        let negative_prompt = request.negative_prompt.clone();
        let options = request.options.clone();
        let mut handle = tokio::spawn(async move {
            backend
                .generate(BackendRequest {
                    prompt: &prompt,
                    negative_prompt: &negative_prompt,
                    options: &options,
                    face: &face,
                    mask: mask.as_ref(),
                })
                .await
        });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join_err)) => Err(RunError::Backend(BackendError::Request(format!(
                "backend task failed: {join_err}"
            )))),
            Err(_) => {
                handle.abort();
                Err(RunError::Backend(BackendError::Timeout(self.timeout)))
            }
        }
    }

    async fn handle_orphans(&self, session_id: &str, stored: &[StoredAsset]) {
        if stored.is_empty() {
            return;
        }
        if !self.cleanup_failed_assets {
            for asset in stored {
                info!(
                    "Retaining {} asset {} from failed generation {}",
                    asset.kind,
                    asset.path.display(),
                    session_id
                );
            }
            return;
        }
        for asset in stored {
            if let Err(err) = self.store.remove(asset).await {
                warn!("Cleanup of {} failed: {}", asset.path.display(), err);
            }
        }
    }

    async fn record(&self, session_id: &str, status: JournalStatus, details: serde_json::Value) {
        if let Some(journal) = &self.journal {
            journal.record(session_id, status, details).await;
        }
    }
}

fn new_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{StubBackend, UploadedAsset};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Fail,
        Hang,
        Panic,
    }

    struct ScriptedBackend {
        calls: AtomicUsize,
        behaviour: Behaviour,
    }

    impl ScriptedBackend {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                behaviour,
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(
            &self,
            _request: BackendRequest<'_>,
        ) -> Result<Vec<ImageRef>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Fail => Err(BackendError::Response("model exploded".to_string())),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(Vec::new())
                }
                Behaviour::Panic => panic!("backend bug"),
            }
        }
    }

    /// Always answers with the same references.
    struct FixedBackend(Vec<ImageRef>);

    #[async_trait]
    impl GenerationBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn generate(
            &self,
            _request: BackendRequest<'_>,
        ) -> Result<Vec<ImageRef>, BackendError> {
            Ok(self.0.clone())
        }
    }

    fn face() -> UploadedAsset {
        UploadedAsset::new(b"face-bytes".to_vec(), "me.jpg").with_content_type("image/jpeg")
    }

    fn stub() -> Arc<dyn GenerationBackend> {
        Arc::new(StubBackend::new(Duration::ZERO))
    }

    fn files_in(dir: &Path) -> usize {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn missing_face_writes_nothing_and_skips_backend() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("generated");
        let backend = ScriptedBackend::new(Behaviour::Fail);
        let orchestrator = GenerationOrchestrator::new(AssetStore::new(&dir), backend.clone());

        let result = orchestrator.run(&GenerationRequest::new("x")).await;

        assert_eq!(result, GenerationResult::failure("missing face image"));
        assert!(!dir.exists());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_prompt_writes_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("generated");
        let orchestrator = GenerationOrchestrator::new(AssetStore::new(&dir), stub());

        let result = orchestrator
            .run(&GenerationRequest::new("  ").with_face(face()))
            .await;

        assert_eq!(result.error(), Some("missing prompt"));
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn valid_request_stores_assets_and_returns_images() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("generated");
        let orchestrator = GenerationOrchestrator::new(AssetStore::new(&dir), stub());

        let request = GenerationRequest::new("a person in a forest")
            .with_face(face())
            .with_mask(UploadedAsset::new(b"mask".to_vec(), "mask.png"));
        let result = orchestrator.run(&request).await;

        assert_eq!(result.images().map(<[ImageRef]>::len), Some(4));
        assert_eq!(result.error(), None);
        assert_eq!(files_in(&dir), 2);
    }

    #[tokio::test]
    async fn storage_failure_is_generic_and_skips_backend() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"file").expect("write blocker");
        let backend = ScriptedBackend::new(Behaviour::Fail);
        let orchestrator = GenerationOrchestrator::new(
            AssetStore::new(blocker.join("generated")),
            backend.clone(),
        );

        let result = orchestrator
            .run(&GenerationRequest::new("a person").with_face(face()))
            .await;

        assert_eq!(result, GenerationResult::failure(GENERIC_FAILURE_MESSAGE));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_failure_retains_assets_by_default() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("generated");
        let orchestrator = GenerationOrchestrator::new(
            AssetStore::new(&dir),
            ScriptedBackend::new(Behaviour::Fail),
        );

        let result = orchestrator
            .run(&GenerationRequest::new("a person").with_face(face()))
            .await;

        assert_eq!(result.error(), Some(GENERIC_FAILURE_MESSAGE));
        assert_eq!(files_in(&dir), 1);
    }

    #[tokio::test]
    async fn backend_failure_cleans_up_when_asked() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("generated");
        let orchestrator = GenerationOrchestrator::new(
            AssetStore::new(&dir),
            ScriptedBackend::new(Behaviour::Fail),
        )
        .with_cleanup_failed_assets(true);

        let request = GenerationRequest::new("a person")
            .with_face(face())
            .with_mask(UploadedAsset::new(b"mask".to_vec(), "mask.png"));
        let result = orchestrator.run(&request).await;

        assert_eq!(result.error(), Some(GENERIC_FAILURE_MESSAGE));
        assert_eq!(files_in(&dir), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let orchestrator = GenerationOrchestrator::new(
            AssetStore::new(tmp.path()),
            ScriptedBackend::new(Behaviour::Hang),
        )
        .with_timeout(Duration::from_secs(5));

        let result = orchestrator
            .run(&GenerationRequest::new("a person").with_face(face()))
            .await;

        assert_eq!(result.error(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn panicking_backend_is_contained() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let orchestrator = GenerationOrchestrator::new(
            AssetStore::new(tmp.path()),
            ScriptedBackend::new(Behaviour::Panic),
        );

        let result = orchestrator
            .run(&GenerationRequest::new("a person").with_face(face()))
            .await;

        assert_eq!(result.error(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn journal_tracks_started_and_completed() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let journal = GenerationJournal::new(tmp.path().join("logs"));
        let orchestrator =
            GenerationOrchestrator::new(AssetStore::new(tmp.path().join("generated")), stub())
                .with_journal(journal.clone());

        orchestrator
            .run(&GenerationRequest::new("a person").with_face(face()))
            .await;
        orchestrator.run(&GenerationRequest::new("no face")).await;

        assert_eq!(journal.count_today(JournalStatus::Started).await.expect("count"), 1);
        assert_eq!(journal.count_today(JournalStatus::Completed).await.expect("count"), 1);
        assert_eq!(journal.count_today(JournalStatus::Failed).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn remote_results_are_copied_locally() {
        let app = axum::Router::new().route(
            "/cdn/1.jpg",
            axum::routing::get(|| async { b"result".to_vec() }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let tmp = tempfile::tempdir().expect("tempdir");
        let results = ResultStore::new(tmp.path().join("results"));
        let backend = Arc::new(FixedBackend(vec![ImageRef(format!("http://{addr}/cdn/1.jpg"))]));
        let orchestrator =
            GenerationOrchestrator::new(AssetStore::new(tmp.path().join("generated")), backend)
                .with_results(results.clone());

        let result = orchestrator
            .run(&GenerationRequest::new("a person").with_face(face()))
            .await;

        let images = result.images().expect("success");
        assert_eq!(images.len(), 1);
        assert!(images[0].as_str().starts_with("/results/"), "{}", images[0]);
        assert!(images[0].as_str().ends_with("_0.jpg"), "{}", images[0]);
        assert_eq!(results.count().await.expect("count"), 1);
    }
}
