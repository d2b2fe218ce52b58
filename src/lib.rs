//! # coursegen-client
//!
//! Client-side task lifecycle and transfer layer for a course generation backend.
//!
//! The backend runs long generation jobs (course plans, lesson content,
//! presentation slides) in the background. This crate starts them, learns
//! reliably when they finish and fetches the generated artifacts.
//!
//! ## Components
//!
//! - [`ResilientRequestExecutor`] - Plain API calls with throttling, in-flight
//!   deduplication and fixed-delay retries
//! - [`TaskOrchestrator`] - One job from start call to a known outcome, with a
//!   bounded polling loop and single-fire completion
//! - [`StreamingDownloadManager`] - Streams a binary artifact with progress,
//!   resolves its filename and hands it to an [`ArtifactSink`]
//! - [`GenerationClient`] - Ties the three to one backend configuration
//!
//! ## Design Philosophy
//!
//! - **Configurable** - Every timing constant lives in [`Config`] with a sensible default
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to [`Event`]s for user-visible notifications
//! - **Testable** - Network and job backends sit behind traits; all timing runs on
//!   the tokio clock
//!
//! ## Quick Start
//!
//! ```no_run
//! use coursegen_client::{Config, GenerationClient, GenerationJob, MemorySink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GenerationClient::new(
//!         Config::with_base_url("http://localhost:8000"),
//!         Arc::new(MemorySink::new()),
//!     )?;
//!
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     if let Some(report) = client.generate_and_download(&GenerationJob::section(42, 7)).await? {
//!         println!("downloaded {}", report.filename);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// High-level client facade
pub mod client;
/// Configuration types
pub mod config;
/// Streaming artifact downloads
pub mod download;
/// Error types
pub mod error;
/// Throttled, deduplicated, retried API requests
pub mod executor;
/// Slide generation jobs
pub mod jobs;
/// Remote job orchestration and completion polling
pub mod orchestrator;
/// Retry logic with a fixed delay
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::GenerationClient;
pub use config::{ApiConfig, Config, DownloadConfig, PollingConfig, RequestConfig};
pub use download::{
    Artifact, ArtifactSink, DirectorySink, DownloadReport, MemorySink, StreamingDownloadManager,
};
pub use error::{Error, Result};
pub use executor::{
    ApiRequest, ApiResponse, Dispatch, HttpTransport, RequestOptions, ResilientRequestExecutor,
    Transport,
};
pub use jobs::{GenerationJob, SlideTarget};
pub use orchestrator::{JobBackend, TaskCompletion, TaskOrchestrator, TransportJobBackend};
pub use types::{
    DownloadState, EntityId, Event, HttpMethod, JobHandle, JobSpec, JobState, RequestKey,
    TaskOutcome, TaskStatus,
};
