//! The client-side state machine for one user's generation attempts.
//!
//! `idle → submitting → done(success)`, and `done → submitting` again on resubmit.
//! Selections can change in any state except mid-submit, which the `&mut self` borrow of
//! [`ClientSession::submit`] rules out.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::GenerationService;
use super::download::{ImageFetcher, ImageSink, fetch_and_save};
use crate::constants::{CLIENT_FAILURE_MESSAGE, DEFAULT_NEGATIVE_PROMPT, DOWNLOAD_DELAY};
use crate::error::{DownloadError, SubmitRejected};
use crate::generation::{GenerationOptions, GenerationRequest, GenerationResult, UploadedAsset};

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    /// Nothing submitted yet
    Idle,
    /// Waiting on the service
    Submitting,
    /// The service answered; `success` mirrors the result
    Done {
        /// Whether the result carried images
        success: bool,
    },
}

/// Upload selections, prompts, status and the most recent result.
pub struct ClientSession<S> {
    service: S,
    face: Option<UploadedAsset>,
    mask: Option<UploadedAsset>,
    prompt: String,
    negative_prompt: String,
    options: GenerationOptions,
    status: SessionStatus,
    last_result: Option<GenerationResult>,
    status_tx: watch::Sender<SessionStatus>,
    download_delay: Duration,
}

impl<S: GenerationService> ClientSession<S> {
    /// A fresh, idle session talking to `service`
    pub fn new(service: S) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Self {
            service,
            face: None,
            mask: None,
            prompt: String::new(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            options: GenerationOptions::default(),
            status: SessionStatus::Idle,
            last_result: None,
            status_tx,
            download_delay: DOWNLOAD_DELAY,
        }
    }

    /// Overrides the pause between items of [`Self::download_all`]
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    /// Status updates, for whatever re-renders the session
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Most recent result, cleared on each new submit
    pub fn last_result(&self) -> Option<&GenerationResult> {
        self.last_result.as_ref()
    }

    /// Currently selected face image
    pub fn face(&self) -> Option<&UploadedAsset> {
        self.face.as_ref()
    }

    /// Currently selected mask image
    pub fn mask(&self) -> Option<&UploadedAsset> {
        self.mask.as_ref()
    }

    /// Current prompt
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Current negative prompt
    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    /// Replaces the face selection, discarding the previous one.
    pub fn select_face(&mut self, face: Option<UploadedAsset>) {
        if let Some(previous) = std::mem::replace(&mut self.face, face) {
            debug!("Discarded face preview {}", previous.filename);
        }
    }

    /// Replaces the mask selection, discarding the previous one.
    pub fn select_mask(&mut self, mask: Option<UploadedAsset>) {
        if let Some(previous) = std::mem::replace(&mut self.mask, mask) {
            debug!("Discarded mask preview {}", previous.filename);
        }
    }

    /// Sets the prompt
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Sets the negative prompt
    pub fn set_negative_prompt(&mut self, negative_prompt: impl Into<String>) {
        self.negative_prompt = negative_prompt.into();
    }

    /// Sets the generation options sent with each submit
    pub fn set_options(&mut self, options: GenerationOptions) {
        self.options = options;
    }

    fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.status_tx.send_replace(status);
    }

    /// Submits the current selections.
    ///
    /// Without a face or a prompt nothing happens and the precondition notice comes back
    /// instead. Otherwise the session goes to `Submitting`, waits for the service and ends
    /// in `Done` whatever the result says. A transport failure becomes a failed result.
    pub async fn submit(&mut self) -> Result<&GenerationResult, SubmitRejected> {
        let Some(face) = self.face.clone() else {
            info!("{}", SubmitRejected::MissingFace);
            return Err(SubmitRejected::MissingFace);
        };
        if self.prompt.trim().is_empty() {
            info!("{}", SubmitRejected::MissingPrompt);
            return Err(SubmitRejected::MissingPrompt);
        }

        self.set_status(SessionStatus::Submitting);
        self.last_result = None;

        let mut request = GenerationRequest::new(self.prompt.clone())
            .with_face(face)
            .with_negative_prompt(self.negative_prompt.clone())
            .with_options(self.options.clone());
        if let Some(mask) = self.mask.clone() {
            request = request.with_mask(mask);
        }

        let result = match self.service.submit(request).await {
            Ok(result) => result,
            Err(err) => {
                error!("Generation request failed: {}", err);
                GenerationResult::failure(CLIENT_FAILURE_MESSAGE)
            }
        };

        self.set_status(SessionStatus::Done {
            success: result.is_success(),
        });
        let result: &GenerationResult = self.last_result.insert(result);
        Ok(result)
    }

    /// Downloads a single image, with no pacing.
    ///
    /// Failures are logged and come back as `None`; session state is untouched.
    pub async fn download_one<F, K>(&self, fetcher: &F, sink: &K, index: usize) -> Option<PathBuf>
    where
        F: ImageFetcher + ?Sized,
        K: ImageSink + ?Sized,
    {
        let outcome = match self.images() {
            Ok(images) => match images.get(index) {
                Some(image) => fetch_and_save(fetcher, sink, image, index).await,
                None => Err(DownloadError::OutOfRange(index)),
            },
            Err(err) => Err(err),
        };
        match outcome {
            Ok(path) => Some(path),
            Err(err) => {
                error!("Download failed: {}", err);
                None
            }
        }
    }

    /// Downloads every image in order, pausing between consecutive items.
    ///
    /// A failed item is logged and skipped. Returns the paths that were saved.
    pub async fn download_all<F, K>(&self, fetcher: &F, sink: &K) -> Vec<PathBuf>
    where
        F: ImageFetcher + ?Sized,
        K: ImageSink + ?Sized,
    {
        let images = match self.images() {
            Ok(images) => images,
            Err(err) => {
                warn!("Download all skipped: {}", err);
                return Vec::new();
            }
        };

        let mut saved = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.download_delay).await;
            }
            match fetch_and_save(fetcher, sink, image, index).await {
                Ok(path) => saved.push(path),
                Err(err) => error!("Download failed: {}", err),
            }
        }
        saved
    }

    fn images(&self) -> Result<&[crate::generation::ImageRef], DownloadError> {
        self.last_result
            .as_ref()
            .and_then(GenerationResult::images)
            .ok_or(DownloadError::NoResult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::generation::ImageRef;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct FakeService {
        requests: Arc<Mutex<Vec<GenerationRequest>>>,
        status_seen: Arc<Mutex<Option<watch::Receiver<SessionStatus>>>>,
        statuses: Arc<Mutex<Vec<SessionStatus>>>,
        fail_transport: bool,
        result: Option<GenerationResult>,
    }

    #[async_trait]
    impl GenerationService for FakeService {
        async fn submit(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResult, ClientError> {
            if let Some(rx) = self.status_seen.lock().expect("lock").as_ref() {
                self.statuses.lock().expect("lock").push(*rx.borrow());
            }
            self.requests.lock().expect("lock").push(request);
            if self.fail_transport {
                return Err(ClientError::Transport("connection refused".to_string()));
            }
            Ok(self.result.clone().unwrap_or_else(|| {
                GenerationResult::success(vec![
                    "/1.svg".into(),
                    "/2.svg".into(),
                    "/3.svg".into(),
                    "/4.svg".into(),
                ])
            }))
        }
    }

    fn face() -> UploadedAsset {
        UploadedAsset::new(b"face".to_vec(), "face.png")
    }

    #[derive(Default)]
    struct RecordingSink {
        saves: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait]
    impl ImageSink for RecordingSink {
        async fn save(&self, file_name: &str, _bytes: Vec<u8>) -> Result<PathBuf, DownloadError> {
            self.saves
                .lock()
                .expect("lock")
                .push((file_name.to_string(), Instant::now()));
            Ok(PathBuf::from(file_name))
        }
    }

    struct FlakyFetcher {
        fail_on: Option<String>,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageFetcher for FlakyFetcher {
        async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, DownloadError> {
            self.fetched.lock().expect("lock").push(image.to_string());
            if self.fail_on.as_deref() == Some(image.as_str()) {
                return Err(DownloadError::Status(404));
            }
            Ok(image.as_str().as_bytes().to_vec())
        }
    }

    fn fetcher(fail_on: Option<&str>) -> FlakyFetcher {
        FlakyFetcher {
            fail_on: fail_on.map(str::to_string),
            fetched: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn submit_without_face_is_rejected_and_stays_idle() {
        let service = FakeService::default();
        let mut session = ClientSession::new(service.clone());
        session.set_prompt("a person in a forest");

        let rejected = session.submit().await.expect_err("rejected");
        assert_eq!(rejected, SubmitRejected::MissingFace);
        assert_eq!(
            rejected.to_string(),
            "Please upload a face image and enter a prompt"
        );
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(service.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn submit_without_prompt_is_rejected() {
        let mut session = ClientSession::new(FakeService::default());
        session.select_face(Some(face()));
        assert_eq!(session.submit().await.err(), Some(SubmitRejected::MissingPrompt));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn submit_goes_through_submitting_to_done() {
        let service = FakeService::default();
        let mut session = ClientSession::new(service.clone());
        *service.status_seen.lock().expect("lock") = Some(session.subscribe());
        let rx = session.subscribe();

        session.select_face(Some(face()));
        session.select_mask(Some(UploadedAsset::new(b"m".to_vec(), "mask.png")));
        session.set_prompt("a person in a forest");

        let result = session.submit().await.expect("accepted");
        assert!(result.is_success());
        assert_eq!(
            service.statuses.lock().expect("lock").as_slice(),
            &[SessionStatus::Submitting]
        );
        assert_eq!(session.status(), SessionStatus::Done { success: true });
        assert_eq!(*rx.borrow(), SessionStatus::Done { success: true });

        let requests = service.requests.lock().expect("lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].negative_prompt, DEFAULT_NEGATIVE_PROMPT);
        assert!(requests[0].mask.is_some());
    }

    #[tokio::test]
    async fn failed_results_still_end_in_done() {
        let service = FakeService {
            result: Some(GenerationResult::failure("missing prompt")),
            ..Default::default()
        };
        let mut session = ClientSession::new(service);
        session.select_face(Some(face()));
        session.set_prompt("x");

        session.submit().await.expect("accepted");
        assert_eq!(session.status(), SessionStatus::Done { success: false });
        assert_eq!(
            session.last_result().and_then(GenerationResult::error),
            Some("missing prompt")
        );
    }

    #[tokio::test]
    async fn transport_failure_becomes_a_failed_result() {
        let service = FakeService {
            fail_transport: true,
            ..Default::default()
        };
        let mut session = ClientSession::new(service);
        session.select_face(Some(face()));
        session.set_prompt("x");

        let result = session.submit().await.expect("accepted");
        assert_eq!(result.error(), Some(CLIENT_FAILURE_MESSAGE));
        assert_eq!(session.status(), SessionStatus::Done { success: false });
    }

    #[tokio::test]
    async fn resubmit_from_done_clears_then_replaces_result() {
        let service = FakeService::default();
        let mut session = ClientSession::new(service.clone());
        session.select_face(Some(face()));
        session.set_prompt("first");
        session.submit().await.expect("first");

        session.select_face(Some(UploadedAsset::new(b"other".to_vec(), "other.png")));
        session.set_prompt("second");
        session.submit().await.expect("second");

        assert_eq!(session.face().map(|f| f.filename.as_str()), Some("other.png"));
        let requests = service.requests.lock().expect("lock");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].prompt, "second");
        assert!(session.last_result().is_some_and(GenerationResult::is_success));
    }

    #[tokio::test(start_paused = true)]
    async fn download_all_paces_between_items_only() {
        let mut session = ClientSession::new(FakeService::default());
        session.select_face(Some(face()));
        session.set_prompt("x");
        session.submit().await.expect("accepted");

        let fetcher = fetcher(None);
        let sink = RecordingSink::default();
        let started = Instant::now();
        let saved = session.download_all(&fetcher, &sink).await;

        assert_eq!(saved.len(), 4);
        let saves = sink.saves.lock().expect("lock");
        let names: Vec<&str> = saves.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "story-image-1.jpg",
                "story-image-2.jpg",
                "story-image-3.jpg",
                "story-image-4.jpg"
            ]
        );
        assert_eq!(saves[0].1 - started, Duration::ZERO);
        for pair in saves.windows(2) {
            assert_eq!(pair[1].1 - pair[0].1, DOWNLOAD_DELAY);
        }
        assert_eq!(started.elapsed(), DOWNLOAD_DELAY * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn download_all_survives_a_failed_item() {
        let mut session = ClientSession::new(FakeService::default());
        session.select_face(Some(face()));
        session.set_prompt("x");
        session.submit().await.expect("accepted");

        let fetcher = fetcher(Some("/2.svg"));
        let sink = RecordingSink::default();
        let saved = session.download_all(&fetcher, &sink).await;

        assert_eq!(
            saved,
            vec![
                PathBuf::from("story-image-1.jpg"),
                PathBuf::from("story-image-3.jpg"),
                PathBuf::from("story-image-4.jpg")
            ]
        );
        assert_eq!(fetcher.fetched.lock().expect("lock").len(), 4);
        assert_eq!(session.status(), SessionStatus::Done { success: true });
    }

    #[tokio::test]
    async fn download_one_needs_a_successful_result() {
        let service = FakeService {
            result: Some(GenerationResult::failure("nope")),
            ..Default::default()
        };
        let mut session = ClientSession::new(service);
        let fetcher = fetcher(None);
        let sink = RecordingSink::default();

        assert_eq!(session.download_one(&fetcher, &sink, 0).await, None);

        session.select_face(Some(face()));
        session.set_prompt("x");
        session.submit().await.expect("accepted");
        assert_eq!(session.download_one(&fetcher, &sink, 0).await, None);
        assert!(session.download_all(&fetcher, &sink).await.is_empty());
        assert!(fetcher.fetched.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn download_one_fetches_a_single_index() {
        let mut session = ClientSession::new(FakeService::default());
        session.select_face(Some(face()));
        session.set_prompt("x");
        session.submit().await.expect("accepted");

        let fetcher = fetcher(None);
        let sink = RecordingSink::default();
        assert_eq!(
            session.download_one(&fetcher, &sink, 2).await,
            Some(PathBuf::from("story-image-3.jpg"))
        );
        assert_eq!(session.download_one(&fetcher, &sink, 9).await, None);
        assert_eq!(
            fetcher.fetched.lock().expect("lock").as_slice(),
            &["/3.svg".to_string()]
        );
    }
}
