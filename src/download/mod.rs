//! Streaming download of generated binary artifacts.
//!
//! - [`disposition`] - Filename extraction from `Content-Disposition`
//! - [`session`] - Per-transfer byte accounting and assembly
//! - [`sink`] - Where finished artifacts go
//!
//! A download resolves its URL, streams the body chunk by chunk while
//! reporting progress, assembles the payload and hands it to the configured
//! [`ArtifactSink`]. Nothing reaches the sink unless the whole transfer
//! succeeded. Fetching and reading the body is bounded by the configured
//! timeout and can be cancelled through a [`CancellationToken`]; once the
//! payload is assembled, the sink runs to completion and its result decides
//! the outcome.

pub mod disposition;
pub mod session;
pub mod sink;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use disposition::parse_content_disposition;
pub use session::TransferSession;
pub use sink::{Artifact, ArtifactSink, DirectorySink, MemorySink};

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::{DownloadState, Event, normalize_path};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Content type used when the response declares none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Turn an artifact reference into the URL to fetch.
///
/// Absolute URLs are used verbatim. Relative URLs are routed through
/// `proxy_prefix` on `base_url`, with an existing leading prefix segment
/// stripped first so it never appears twice.
pub fn resolve_url(base_url: &str, proxy_prefix: &str, url: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(url)
        && matches!(absolute.scheme(), "http" | "https")
    {
        return Ok(absolute);
    }

    let relative = normalize_path(url, proxy_prefix);
    let prefix = proxy_prefix.trim_matches('/');
    let base = base_url.trim_end_matches('/');

    let joined = if prefix.is_empty() {
        format!("{base}/{relative}")
    } else {
        format!("{base}/{prefix}/{relative}")
    };
    Ok(Url::parse(&joined)?)
}

/// Result of a successful download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadReport {
    /// Filename the artifact was delivered under
    pub filename: String,
    /// Declared content type, or [`DEFAULT_CONTENT_TYPE`]
    pub content_type: String,
    /// Bytes received
    pub bytes: u64,
    /// Where the sink stored the artifact, if it has a location
    pub location: Option<PathBuf>,
}

#[derive(Default)]
struct ActiveTransfers {
    running: usize,
    latest: u64,
}

/// Observable progress shared by every transfer of one manager
///
/// `in_progress` stays set while any transfer runs. `percent` follows the
/// most recently started transfer only.
struct ProgressTracker {
    state_tx: watch::Sender<DownloadState>,
    transfers: Mutex<ActiveTransfers>,
}

impl ProgressTracker {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(DownloadState::default());
        Self {
            state_tx,
            transfers: Mutex::new(ActiveTransfers::default()),
        }
    }

    fn begin(self: &Arc<Self>) -> ProgressReset {
        let mut transfers = self.transfers.lock();
        transfers.running += 1;
        transfers.latest += 1;
        self.state_tx.send_replace(DownloadState {
            in_progress: true,
            percent: 0,
        });
        ProgressReset {
            tracker: Arc::clone(self),
            id: transfers.latest,
        }
    }

    fn report(&self, id: u64, percent: u8) {
        let transfers = self.transfers.lock();
        if transfers.latest == id {
            self.state_tx.send_modify(|s| s.percent = percent);
        }
    }

    fn finish(&self) {
        let mut transfers = self.transfers.lock();
        transfers.running = transfers.running.saturating_sub(1);
        if transfers.running == 0 {
            self.state_tx.send_replace(DownloadState::default());
        }
    }
}

/// Ends one transfer's share of the observable progress, however it ends
struct ProgressReset {
    tracker: Arc<ProgressTracker>,
    id: u64,
}

impl Drop for ProgressReset {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}

/// Fetches one binary resource per call with progress, filename resolution
/// and guaranteed cleanup
///
/// Cloning is cheap; clones share the sink, the progress state and the event
/// channel. The progress state reports `in_progress` while any transfer of
/// this manager or its clones runs, with the percentage of the most recently
/// started one.
#[derive(Clone)]
pub struct StreamingDownloadManager {
    client: reqwest::Client,
    base_url: String,
    config: DownloadConfig,
    sink: Arc<dyn ArtifactSink>,
    progress: Arc<ProgressTracker>,
    event_tx: broadcast::Sender<Event>,
}

impl StreamingDownloadManager {
    /// Create a manager fetching relative URLs from `base_url`
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        config: DownloadConfig,
        sink: Arc<dyn ArtifactSink>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            config,
            sink,
            progress: Arc::new(ProgressTracker::new()),
            event_tx,
        }
    }

    /// Snapshot of the observable progress
    pub fn state(&self) -> DownloadState {
        *self.progress.state_tx.borrow()
    }

    /// Watch the observable progress
    pub fn subscribe_state(&self) -> watch::Receiver<DownloadState> {
        self.progress.state_tx.subscribe()
    }

    /// Subscribe to the events this manager publishes
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// URL a reference would be fetched from
    pub fn resolve(&self, url: &str) -> Result<Url> {
        resolve_url(&self.base_url, &self.config.proxy_prefix, url)
    }

    /// Download `url`, naming the artifact `fallback_filename` unless the
    /// server supplies a name
    pub async fn download(&self, url: &str, fallback_filename: &str) -> Result<DownloadReport> {
        self.download_with_cancel(url, fallback_filename, CancellationToken::new())
            .await
    }

    /// [`download`](Self::download), aborted as soon as `cancel` fires
    ///
    /// Cancellation and the timeout apply until the payload is assembled. The
    /// hand-off to the sink that follows always runs to completion.
    pub async fn download_with_cancel(
        &self,
        url: &str,
        fallback_filename: &str,
        cancel: CancellationToken,
    ) -> Result<DownloadReport> {
        let resolved = match self.resolve(url) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.report_failure(url, &e);
                return Err(e);
            }
        };
        let url_str = resolved.to_string();

        let reset = self.progress.begin();
        self.event_tx
            .send(Event::DownloadStarted {
                url: url_str.clone(),
            })
            .ok();
        tracing::info!(url = %url_str, "download started");

        let timeout = self.config.timeout;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(Error::Cancelled(format!("download of {url_str} was cancelled")))
            }
            outcome = tokio::time::timeout(timeout, self.fetch(&resolved, fallback_filename, reset.id)) => {
                outcome.unwrap_or_else(|_| Err(Error::TransferTimeout {
                    url: url_str.clone(),
                    timeout,
                }))
            }
        };

        // Saving is neither cancelled nor timed out
        let result = match fetched {
            Ok((artifact, bytes)) => self.deliver(artifact, bytes).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    url = %url_str,
                    filename = %report.filename,
                    bytes = report.bytes,
                    "download complete"
                );
                self.event_tx
                    .send(Event::DownloadComplete {
                        url: url_str,
                        filename: report.filename.clone(),
                        bytes: report.bytes,
                    })
                    .ok();
                Ok(report)
            }
            Err(e) => {
                self.report_failure(&url_str, &e);
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        fallback_filename: &str,
        transfer_id: u64,
    ) -> Result<(Artifact, u64)> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let headers = response.headers();
        let declared_total = declared_length(headers);
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let filename = self.resolve_filename(headers, fallback_filename);

        tracing::debug!(
            url = %url,
            declared_total,
            filename = %filename,
            "receiving body"
        );

        let mut session = TransferSession::new(url.as_str(), declared_total, filename);
        let body = response.bytes_stream().map(|chunk| chunk.map_err(Error::from));
        session
            .read_from(body, |percent| self.report_progress(url, transfer_id, percent))
            .await?;

        let bytes = session.received();
        let artifact = Artifact {
            filename: session.filename().to_string(),
            content_type,
            data: session.assemble(),
        };
        Ok((artifact, bytes))
    }

    async fn deliver(&self, artifact: Artifact, bytes: u64) -> Result<DownloadReport> {
        let location = self.sink.save(&artifact).await?;

        Ok(DownloadReport {
            filename: artifact.filename,
            content_type: artifact.content_type,
            bytes,
            location,
        })
    }

    /// Extended filename, then plain filename, then the caller's fallback,
    /// then the configured default
    fn resolve_filename(&self, headers: &HeaderMap, fallback: &str) -> String {
        let from_header = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
            .and_then(parse_content_disposition);

        match from_header {
            Some(name) => name,
            None if !fallback.trim().is_empty() => fallback.to_string(),
            None => self.config.default_filename.clone(),
        }
    }

    fn report_progress(&self, url: &Url, transfer_id: u64, percent: u8) {
        tracing::trace!(url = %url, percent, "download progress");
        self.progress.report(transfer_id, percent);
        self.event_tx
            .send(Event::DownloadProgress {
                url: url.to_string(),
                percent,
            })
            .ok();
    }

    fn report_failure(&self, url: &str, error: &Error) {
        tracing::error!(url = %url, error = %error, "download failed");
        self.event_tx
            .send(Event::DownloadFailed {
                url: url.to_string(),
                error: error.to_string(),
            })
            .ok();
    }
}

fn declared_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

impl std::fmt::Debug for StreamingDownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDownloadManager")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
