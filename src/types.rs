//! Core types for coursegen-client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP verb of a logical request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case verb as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Strip slashes and a leading API prefix segment from a request path.
///
/// `"/api/courses/1"`, `"api/courses/1"` and `"courses/1"` all normalize to
/// `"courses/1"` when `api_prefix` is `"/api"`. Only a whole leading segment is
/// stripped, so `"apiary/1"` is left alone.
pub fn normalize_path(raw: &str, api_prefix: &str) -> String {
    let path = raw.trim().trim_start_matches('/');
    let prefix = api_prefix.trim_matches('/');

    if prefix.is_empty() {
        return path.to_string();
    }

    match path.strip_prefix(prefix) {
        Some("") => String::new(),
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
        _ => path.to_string(),
    }
}

/// Identifies a class of equivalent requests for throttling and deduplication
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// HTTP method
    pub method: HttpMethod,
    /// Normalized path (no API prefix, no leading slash)
    pub path: String,
}

impl RequestKey {
    /// Build a key from a raw path, applying [`normalize_path`]
    pub fn new(method: HttpMethod, raw_path: &str, api_prefix: &str) -> Self {
        Self {
            method,
            path: normalize_path(raw_path, api_prefix),
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Opaque key of the entity a job belongs to (course, lesson, section)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Create a new EntityId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Everything needed to start one remote job and learn when it finishes
#[derive(Clone, Debug)]
pub struct JobSpec {
    /// Entity the job works on
    pub entity_id: EntityId,
    /// Path of the start call (POST)
    pub start_path: String,
    /// Path of the status document (GET, returns `is_working`)
    pub poll_path: String,
    /// Message surfaced when the job was accepted
    pub message: String,
    /// Optional JSON body of the start call
    pub body: Option<serde_json::Value>,
}

/// One logical unit of remote work that is being tracked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle {
    /// Entity the job works on
    pub entity_id: EntityId,
    /// Path of the start call
    pub start_path: String,
    /// Path polled for completion
    pub poll_path: String,
    /// When tracking began
    pub created_at: DateTime<Utc>,
}

impl JobHandle {
    /// Create a handle stamped with the current time
    pub fn new(
        entity_id: EntityId,
        start_path: impl Into<String>,
        poll_path: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            start_path: start_path.into(),
            poll_path: poll_path.into(),
            created_at: Utc::now(),
        }
    }
}

impl From<&JobSpec> for JobHandle {
    fn from(spec: &JobSpec) -> Self {
        JobHandle::new(spec.entity_id, spec.start_path.clone(), spec.poll_path.clone())
    }
}

/// Lifecycle of the job tracked by one orchestrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Nothing tracked
    Idle,
    /// Start call in flight
    Starting,
    /// Polling loop active since the given time
    Polling(DateTime<Utc>),
    /// Status endpoint reported the job finished
    Completed,
    /// Safety timeout ended the loop before the job reported completion
    TimedOut,
    /// Start call failed
    Failed(String),
}

impl JobState {
    /// Completed, TimedOut or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::TimedOut | JobState::Failed(_)
        )
    }

    /// Starting or Polling
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Starting | JobState::Polling(_))
    }
}

/// Externally observable status of an orchestrator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskStatus {
    /// The remote job is believed to be running
    pub is_working: bool,
    /// The start call is in flight
    pub is_loading: bool,
    /// Last terminal error or timeout warning, if any
    pub last_error: Option<String>,
}

/// How a polling loop concluded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The status endpoint reported `is_working = false`
    Completed,
    /// The safety timeout elapsed first; the job may still be running
    TimedOut,
}

/// Observable progress of the download manager
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadState {
    /// A transfer is running
    pub in_progress: bool,
    /// Last reported percentage (0 while unknown)
    pub percent: u8,
}

/// Notification emitted by the client components
///
/// These are the user-visible signals (the toast-equivalents). Transient poll
/// errors and throttled/deduplicated requests never produce one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job start call succeeded
    TaskStarted {
        /// Entity the job works on
        entity_id: EntityId,
        /// Message supplied with the job
        message: String,
    },

    /// A job start call failed
    TaskStartFailed {
        /// Entity the job works on
        entity_id: EntityId,
        /// Error message
        error: String,
    },

    /// The status endpoint reported the job finished
    TaskCompleted {
        /// Entity the job works on
        entity_id: EntityId,
    },

    /// The safety timeout ended polling before the job reported completion
    TaskTimedOut {
        /// Entity the job works on
        entity_id: EntityId,
        /// How long the loop waited
        waited_ms: u64,
    },

    /// A request failed after all retries
    RequestFailed {
        /// HTTP method
        method: HttpMethod,
        /// Normalized path
        path: String,
        /// Error message
        error: String,
    },

    /// A download started
    DownloadStarted {
        /// Resolved URL
        url: String,
    },

    /// Download progress update (only emitted when the total size is known)
    DownloadProgress {
        /// Resolved URL
        url: String,
        /// Percentage 0..=100
        percent: u8,
    },

    /// A download was assembled and handed to the sink
    DownloadComplete {
        /// Resolved URL
        url: String,
        /// Final filename
        filename: String,
        /// Bytes received
        bytes: u64,
    },

    /// A download failed or was aborted
    DownloadFailed {
        /// Resolved URL
        url: String,
        /// Error message
        error: String,
    },
}
