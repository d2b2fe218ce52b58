//! High-level client for the course generation backend

use crate::config::Config;
use crate::download::{ArtifactSink, DownloadReport, StreamingDownloadManager};
use crate::error::{Error, Result};
use crate::executor::{HttpTransport, ResilientRequestExecutor, Transport};
use crate::jobs::{FALLBACK_SLIDES_FILENAME, GenerationJob, HasSlides};
use crate::orchestrator::{TaskOrchestrator, TransportJobBackend};
use crate::types::{Event, TaskOutcome};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events buffered per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Entry point tying the three components to one backend
///
/// All components share one configuration, one transport and one event
/// channel. Each call to [`orchestrator`](Self::orchestrator) returns an
/// independent orchestrator, so jobs for different entities never share state.
pub struct GenerationClient {
    config: Config,
    transport: Arc<dyn Transport>,
    executor: ResilientRequestExecutor,
    downloader: StreamingDownloadManager,
    event_tx: broadcast::Sender<Event>,
}

impl GenerationClient {
    /// Create a client for the backend described by `config`
    ///
    /// Finished downloads are handed to `sink`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use coursegen_client::{Config, GenerationClient, GenerationJob, DirectorySink, TaskOutcome};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = Config::with_base_url("http://localhost:8000");
    ///     let client = GenerationClient::new(config, Arc::new(DirectorySink::new("slides")))?;
    ///
    ///     let job = GenerationJob::course(42);
    ///     if client.generate(&job).await? == TaskOutcome::Completed {
    ///         let report = client.download_slides(&job).await?;
    ///         println!("saved {} ({} bytes)", report.filename, report.bytes);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn new(config: Config, sink: Arc<dyn ArtifactSink>) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.api)?);
        // Downloads are bounded by their own deadline, not the per-request timeout
        let download_client = reqwest::Client::builder()
            .connect_timeout(config.api.request_timeout)
            .build()?;

        Ok(Self::with_parts(config, transport, download_client, sink))
    }

    /// Assemble a client from explicit parts (custom transports, test doubles)
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        download_client: reqwest::Client,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let executor = ResilientRequestExecutor::new(
            Arc::clone(&transport),
            config.requests.clone(),
            config.api.api_prefix.clone(),
            event_tx.clone(),
        );
        let downloader = StreamingDownloadManager::new(
            download_client,
            config.api.base_url.clone(),
            config.download.clone(),
            sink,
            event_tx.clone(),
        );

        Self {
            config,
            transport,
            executor,
            downloader,
            event_tx,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to events from every component of this client
    ///
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Request executor for plain API calls
    pub fn executor(&self) -> &ResilientRequestExecutor {
        &self.executor
    }

    /// Download manager for generated artifacts
    pub fn downloader(&self) -> &StreamingDownloadManager {
        &self.downloader
    }

    /// A new orchestrator for one entity's jobs
    pub fn orchestrator(&self) -> TaskOrchestrator {
        let backend = Arc::new(TransportJobBackend::new(Arc::clone(&self.transport)));
        TaskOrchestrator::new(backend, self.config.polling.clone(), self.event_tx.clone())
    }

    /// Whether any section of the course has slides
    ///
    /// `Ok(None)` means the call was throttled or deduplicated and should be
    /// repeated later.
    pub async fn course_has_slides(&self, course_id: i64) -> Result<Option<bool>> {
        let response: Option<HasSlides> = self
            .executor
            .get_json(&format!("courses/{course_id}/has-slides"))
            .await?;
        Ok(response.map(|r| r.has_slides))
    }

    /// Start a generation job and wait until it concludes
    ///
    /// [`TaskOutcome::TimedOut`] means the safety timeout ended the wait; the
    /// job may still finish server-side.
    pub async fn generate(&self, job: &GenerationJob) -> Result<TaskOutcome> {
        let orchestrator = self.orchestrator();
        let completion = orchestrator.start_task(job.spec()).await?;

        completion.wait().await.ok_or_else(|| {
            Error::Cancelled(format!(
                "generation for entity {} stopped before it concluded",
                job.entity_id()
            ))
        })
    }

    /// Download the presentation generated by `job`
    pub async fn download_slides(&self, job: &GenerationJob) -> Result<DownloadReport> {
        self.downloader
            .download(&job.artifact_path(), FALLBACK_SLIDES_FILENAME)
            .await
    }

    /// Generate, then download the result once the job reported completion
    ///
    /// Returns `Ok(None)` when the wait timed out, since the presentation may
    /// not exist yet.
    pub async fn generate_and_download(
        &self,
        job: &GenerationJob,
    ) -> Result<Option<DownloadReport>> {
        match self.generate(job).await? {
            TaskOutcome::Completed => Ok(Some(self.download_slides(job).await?)),
            TaskOutcome::TimedOut => {
                tracing::warn!(
                    entity_id = %job.entity_id(),
                    "generation wait timed out, skipping download"
                );
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("base_url", &self.config.api.base_url)
            .field("executor", &self.executor)
            .field("downloader", &self.downloader)
            .finish()
    }
}
