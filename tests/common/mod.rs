//! Shared helpers for the integration tests

use coursegen_client::{ArtifactSink, Config, Event, GenerationClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Course used by the scenarios
pub const COURSE_ID: i64 = 42;

/// PowerPoint content type the backend answers with
pub const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Config for a mock server with polling compressed to milliseconds
pub fn fast_config(base_url: &str) -> Config {
    let mut config = Config::with_base_url(base_url);
    config.polling.initial_delay = Duration::from_millis(50);
    config.polling.poll_interval = Duration::from_millis(50);
    config.polling.safety_timeout = Duration::from_secs(5);
    config.requests.retry_delay = Duration::from_millis(10);
    config.download.timeout = Duration::from_secs(5);
    config
}

/// Client against `base_url` delivering artifacts to `sink`
pub fn client_for(config: Config, sink: Arc<dyn ArtifactSink>) -> GenerationClient {
    match GenerationClient::new(config, sink) {
        Ok(client) => client,
        Err(e) => panic!("failed to build client: {e}"),
    }
}

/// Every event received so far, progress updates left out
pub fn milestones(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| !matches!(e, Event::DownloadProgress { .. }))
        .collect()
}
