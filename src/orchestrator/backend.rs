//! Remote job executor seam: start a job, ask whether it is still working.

use crate::error::{Error, Result};
use crate::executor::{ApiRequest, Transport};
use crate::types::HttpMethod;
use serde::Deserialize;
use std::sync::Arc;

/// Abstraction over the remote job executor, enabling testability.
#[async_trait::async_trait]
pub trait JobBackend: Send + Sync {
    /// Begin a job. Any failure means the job did not start.
    async fn start_job(&self, path: &str, body: Option<&serde_json::Value>) -> Result<()>;

    /// Whether the job behind `path` is still running
    async fn is_working(&self, path: &str) -> Result<bool>;
}

/// Status document returned by the poll endpoint.
///
/// Unknown fields are ignored, so a full entity record carrying an
/// `is_working` flag works as well.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct WorkingStatus {
    /// The job is still running
    pub is_working: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Production [`JobBackend`] that talks to the API through a [`Transport`].
///
/// Calls go straight to the transport, without the request executor's
/// throttling, deduplication or retries.
#[derive(Clone)]
pub struct TransportJobBackend {
    transport: Arc<dyn Transport>,
}

impl TransportJobBackend {
    /// Wrap a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl JobBackend for TransportJobBackend {
    async fn start_job(&self, path: &str, body: Option<&serde_json::Value>) -> Result<()> {
        let request = ApiRequest {
            method: HttpMethod::Post,
            path: path.to_string(),
            body: body.cloned(),
        };

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| Error::StartFailed {
                path: path.to_string(),
                status: e.status(),
                message: e.to_string(),
            })?;

        if response.is_success() {
            return Ok(());
        }

        let message = response
            .json::<ErrorBody>()
            .map(|b| b.detail)
            .unwrap_or_else(|_| format!("server answered with HTTP {}", response.status));

        Err(Error::StartFailed {
            path: path.to_string(),
            status: Some(response.status),
            message,
        })
    }

    async fn is_working(&self, path: &str) -> Result<bool> {
        let request = ApiRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            body: None,
        };

        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(Error::HttpStatus {
                status: response.status,
                url: path.to_string(),
            });
        }

        let status: WorkingStatus = response.json()?;
        Ok(status.is_working)
    }
}
