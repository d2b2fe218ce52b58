//! Resilient request executor: throttling, in-flight deduplication and
//! fixed-delay retries for simple (non job-shaped) API calls.
//!
//! - [`transport`] - Wire abstraction and the reqwest-backed implementation
//! - [`pending`] - Per-executor in-flight / last-issued bookkeeping
//! - `debounce` - Last-call-wins coalescing for the debounced variant
//!
//! A fresh call is admitted only if no identical `(method, normalized path)`
//! call was issued within the throttle window and none is still in flight.
//! Skipped calls are not failures: they resolve to [`Dispatch::Throttled`] or
//! [`Dispatch::InFlight`], meaning "not executed, try again later". Retries of
//! an admitted call happen inside that call and never pass through admission
//! again.

mod debounce;
pub mod pending;
pub mod transport;


pub use pending::{Admission, PendingRequestSet};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

use crate::config::RequestConfig;
use crate::error::{Error, Result};
use crate::retry::retry_fixed;
use crate::types::{Event, HttpMethod, RequestKey};
use debounce::Debouncer;
use parking_lot::Mutex;
use pending::PendingGuard;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

/// Per-call options
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// JSON body sent with the request
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    /// Options carrying a JSON body
    pub fn json(body: serde_json::Value) -> Self {
        Self { body: Some(body) }
    }
}

/// What happened to a logical request
#[derive(Clone, Debug)]
pub enum Dispatch {
    /// The request was executed and the server answered with 2xx
    Sent(ApiResponse),
    /// Skipped: an identical fresh call was issued within the throttle window
    Throttled,
    /// Skipped: an identical call is still in flight
    InFlight,
}

impl Dispatch {
    /// The response, or `None` if the call was skipped
    pub fn into_response(self) -> Option<ApiResponse> {
        match self {
            Dispatch::Sent(response) => Some(response),
            Dispatch::Throttled | Dispatch::InFlight => None,
        }
    }

    /// Borrow the response, if any
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Dispatch::Sent(response) => Some(response),
            Dispatch::Throttled | Dispatch::InFlight => None,
        }
    }

    /// The request was executed
    pub fn is_sent(&self) -> bool {
        matches!(self, Dispatch::Sent(_))
    }
}

/// Executes single logical requests with throttle, dedup and retry
///
/// Cloning is cheap and clones share the same pending-request bookkeeping.
#[derive(Clone)]
pub struct ResilientRequestExecutor {
    transport: Arc<dyn Transport>,
    config: RequestConfig,
    api_prefix: String,
    pending: Arc<Mutex<PendingRequestSet>>,
    debouncer: Arc<Debouncer>,
    event_tx: broadcast::Sender<Event>,
}

impl ResilientRequestExecutor {
    /// Create an executor with its own pending-request set
    pub fn new(
        transport: Arc<dyn Transport>,
        config: RequestConfig,
        api_prefix: impl Into<String>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transport,
            config,
            api_prefix: api_prefix.into(),
            pending: Arc::new(Mutex::new(PendingRequestSet::new())),
            debouncer: Arc::new(Debouncer::default()),
            event_tx,
        }
    }

    /// Subscribe to the events this executor publishes
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Dedup/throttle key of a call
    pub fn key_for(&self, method: HttpMethod, path: &str) -> RequestKey {
        RequestKey::new(method, path, &self.api_prefix)
    }

    /// Whether an identical call is currently in flight
    pub fn is_pending(&self, method: HttpMethod, path: &str) -> bool {
        self.pending.lock().is_in_flight(&self.key_for(method, path))
    }

    /// Execute one logical request.
    ///
    /// Returns `Ok(Dispatch::Sent)` on a 2xx response, `Ok(Throttled | InFlight)`
    /// when the call was skipped, and `Err(Error::RetryExhausted)` once every
    /// attempt failed. Exhaustion is also published as [`Event::RequestFailed`].
    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<Dispatch> {
        let key = self.key_for(method, path);

        let admission =
            self.pending
                .lock()
                .admit(&key, Instant::now(), self.config.throttle_window);
        match admission {
            Admission::Throttled => {
                tracing::debug!(request = %key, "skipping request issued within throttle window");
                return Ok(Dispatch::Throttled);
            }
            Admission::InFlight => {
                tracing::debug!(request = %key, "skipping request already in flight");
                return Ok(Dispatch::InFlight);
            }
            Admission::Admitted => {}
        }

        let _guard = PendingGuard::new(self.pending.clone(), key.clone());

        let request = ApiRequest {
            method,
            path: key.path.clone(),
            body: options.body,
        };
        let transport = self.transport.as_ref();
        let request_ref = &request;

        let result = retry_fixed(
            self.config.max_retries,
            self.config.retry_delay,
            move |attempt| async move {
                if attempt > 0 {
                    tracing::debug!(
                        method = %request_ref.method,
                        path = %request_ref.path,
                        attempt,
                        "retrying request"
                    );
                }
                let response = transport.send(request_ref).await?;
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(Error::HttpStatus {
                        status: response.status,
                        url: request_ref.path.clone(),
                    })
                }
            },
        )
        .await;

        match result {
            Ok(response) => Ok(Dispatch::Sent(response)),
            Err(failure) => {
                let err = Error::RetryExhausted {
                    method: method.to_string(),
                    path: key.path.clone(),
                    attempts: failure.attempts,
                    last_error: Box::new(failure.error),
                };
                tracing::error!(request = %key, error = %err, "request failed");
                self.event_tx
                    .send(Event::RequestFailed {
                        method,
                        path: key.path.clone(),
                        error: err.to_string(),
                    })
                    .ok();
                Err(err)
            }
        }
    }

    /// Execute after a quiet period, coalescing rapid repeated calls.
    ///
    /// Every call to the same key within `debounce_delay` of the previous one
    /// resets the timer; the options of the last call are used. When the timer
    /// finally fires, one [`execute`](Self::execute) runs and all coalesced
    /// callers receive its outcome (failures wrapped in [`Error::Shared`]).
    pub async fn execute_debounced(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<Dispatch> {
        let key = self.key_for(method, path);
        let (tx, rx) = oneshot::channel();
        let generation = self.debouncer.register(&key, options, tx);

        let this = self.clone();
        let delay = self.config.debounce_delay;
        let timer_key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some((options, waiters)) = this.debouncer.take_if_current(&timer_key, generation)
            else {
                return;
            };
            tracing::debug!(
                request = %timer_key,
                callers = waiters.len(),
                "executing debounced request"
            );
            let outcome = this
                .execute(timer_key.method, &timer_key.path, options)
                .await
                .map_err(Arc::new);
            for waiter in waiters {
                waiter.send(outcome.clone()).ok();
            }
        });

        match rx.await {
            Ok(Ok(dispatch)) => Ok(dispatch),
            Ok(Err(e)) => Err(Error::Shared(e)),
            Err(_) => Err(Error::Cancelled(format!(
                "debounced request {key} was dropped"
            ))),
        }
    }

    /// GET
    pub async fn get(&self, path: &str) -> Result<Dispatch> {
        self.execute(HttpMethod::Get, path, RequestOptions::default())
            .await
    }

    /// POST with an optional JSON body
    pub async fn post(&self, path: &str, body: Option<serde_json::Value>) -> Result<Dispatch> {
        self.execute(HttpMethod::Post, path, RequestOptions { body })
            .await
    }

    /// PUT with a JSON body
    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<Dispatch> {
        self.execute(HttpMethod::Put, path, RequestOptions::json(body))
            .await
    }

    /// DELETE
    pub async fn delete(&self, path: &str) -> Result<Dispatch> {
        self.execute(HttpMethod::Delete, path, RequestOptions::default())
            .await
    }

    /// GET and deserialize the JSON body; `Ok(None)` when the call was skipped
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await? {
            Dispatch::Sent(response) => Ok(Some(response.json()?)),
            Dispatch::Throttled | Dispatch::InFlight => Ok(None),
        }
    }
}

impl std::fmt::Debug for ResilientRequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientRequestExecutor")
            .field("config", &self.config)
            .field("api_prefix", &self.api_prefix)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
