use super::*;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

fn manager_with(
    base_url: &str,
    config: DownloadConfig,
    sink: Arc<dyn ArtifactSink>,
) -> (StreamingDownloadManager, broadcast::Receiver<Event>) {
    let (event_tx, events) = broadcast::channel(64);
    (
        StreamingDownloadManager::new(reqwest::Client::new(), base_url, config, sink, event_tx),
        events,
    )
}

fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[test]
fn absolute_urls_are_used_verbatim() {
    let url = resolve_url(
        "http://localhost:8000",
        "/api",
        "https://cdn.example.com/files/deck.pptx?sig=abc",
    )
    .unwrap();
    assert_eq!(url.as_str(), "https://cdn.example.com/files/deck.pptx?sig=abc");
}

#[test]
fn relative_urls_go_through_the_proxy_prefix_once() {
    for raw in [
        "/api/sections/5/slides/pptx",
        "api/sections/5/slides/pptx",
        "sections/5/slides/pptx",
        "/sections/5/slides/pptx",
    ] {
        let url = resolve_url("http://localhost:8000/", "/api", raw).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/sections/5/slides/pptx",
            "for {raw}"
        );
    }
}

#[test]
fn relative_url_keeps_query_and_handles_empty_prefix() {
    let url = resolve_url("http://h:1", "/api", "files/x.pptx?download=1").unwrap();
    assert_eq!(url.as_str(), "http://h:1/api/files/x.pptx?download=1");

    let url = resolve_url("http://h:1", "", "/files/x.pptx").unwrap();
    assert_eq!(url.as_str(), "http://h:1/files/x.pptx");
}

#[test]
fn unusable_base_url_is_an_error() {
    assert!(matches!(
        resolve_url("not a base", "/api", "files/x"),
        Err(Error::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn extended_filename_and_content_type_are_delivered() {
    let server = MockServer::start().await;
    let body = vec![7u8; 4096];
    Mock::given(method("GET"))
        .and(path("/api/courses/42/slides/pptx"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Content-Disposition",
                    "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pptx",
                )
                .set_body_raw(body.clone(), PPTX),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, mut events) = manager_with(&server.uri(), DownloadConfig::default(), sink.clone());

    let report = manager
        .download("courses/42/slides/pptx", "slides.pptx")
        .await
        .unwrap();

    assert_eq!(report.filename, "résumé.pptx");
    assert_eq!(report.content_type, PPTX);
    assert_eq!(report.bytes, 4096);
    assert!(report.location.is_none());

    let saved = sink.artifacts();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].filename, "résumé.pptx");
    assert_eq!(saved[0].data.as_ref(), body.as_slice());

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(Event::DownloadStarted { .. })));
    match events.last() {
        Some(Event::DownloadComplete {
            filename, bytes, ..
        }) => {
            assert_eq!(filename, "résumé.pptx");
            assert_eq!(*bytes, 4096);
        }
        other => panic!("expected DownloadComplete, got {other:?}"),
    }
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::DownloadProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn fallback_filename_is_used_verbatim_without_disposition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lessons/3/slides/pptx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"deck".to_vec()))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, _events) = manager_with(&server.uri(), DownloadConfig::default(), sink.clone());

    let report = manager
        .download("/api/lessons/3/slides/pptx", "Leçon 3 slides.pptx")
        .await
        .unwrap();

    assert_eq!(report.filename, "Leçon 3 slides.pptx");
    assert_eq!(report.content_type, DEFAULT_CONTENT_TYPE);
}

#[tokio::test]
async fn quoted_filename_beats_fallback_and_default_covers_empty_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/a"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", r#"attachment; filename="Course Plan.pdf""#)
                .set_body_bytes(b"pdf".to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/b"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename*=broken")
                .set_body_bytes(b"bin".to_vec()),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, _events) = manager_with(&server.uri(), DownloadConfig::default(), sink);

    let a = manager.download("a", "ignored.pdf").await.unwrap();
    assert_eq!(a.filename, "Course Plan.pdf");

    let b = manager.download("b", "").await.unwrap();
    assert_eq!(b.filename, "download");
}

#[tokio::test]
async fn error_status_delivers_nothing_and_resets_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/courses/9/slides/pptx"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, mut events) = manager_with(&server.uri(), DownloadConfig::default(), sink.clone());

    let err = manager
        .download("courses/9/slides/pptx", "slides.pptx")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(sink.artifacts().is_empty());
    assert_eq!(manager.state(), DownloadState::default());
    assert!(matches!(
        drain(&mut events).last(),
        Some(Event::DownloadFailed { .. })
    ));
}

#[tokio::test]
async fn slow_server_hits_the_abort_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let config = DownloadConfig {
        timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let (manager, _events) = manager_with(&server.uri(), config, sink.clone());

    match manager.download("slow", "x.bin").await {
        Err(Error::TransferTimeout { url, timeout }) => {
            assert!(url.ends_with("/api/slow"));
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected TransferTimeout, got {other:?}"),
    }
    assert!(sink.artifacts().is_empty());
    assert!(!manager.state().in_progress);
}

#[tokio::test]
async fn cancellation_aborts_the_transfer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/big"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 1024])
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, _events) = manager_with(&server.uri(), DownloadConfig::default(), sink.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = manager
        .download_with_cancel("big", "big.bin", cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    assert!(sink.artifacts().is_empty());
    assert_eq!(manager.state(), DownloadState::default());
}

#[tokio::test]
async fn progress_is_visible_while_the_transfer_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/deck"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 2048]))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, _events) = manager_with(&server.uri(), DownloadConfig::default(), sink);
    let mut state = manager.subscribe_state();

    manager.download("deck", "deck.pptx").await.unwrap();

    // The transfer started and the cleanup path reset the state afterwards
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), DownloadState::default());
    assert_eq!(manager.state(), DownloadState::default());
}

#[tokio::test]
async fn directory_sink_receives_the_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sections/5/slides/pptx"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename=\"Section 5.pptx\"")
                .set_body_raw(b"PK\x03\x04slides".to_vec(), PPTX),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let sink = Arc::new(DirectorySink::new(temp.path()));
    let (manager, _events) = manager_with(&server.uri(), DownloadConfig::default(), sink);

    let first = manager
        .download("sections/5/slides/pptx", "slides.pptx")
        .await
        .unwrap();
    let second = manager
        .download("sections/5/slides/pptx", "slides.pptx")
        .await
        .unwrap();

    assert_eq!(first.location, Some(temp.path().join("Section 5.pptx")));
    assert_eq!(second.location, Some(temp.path().join("Section 5 (1).pptx")));
    assert_eq!(
        std::fs::read(temp.path().join("Section 5.pptx")).unwrap(),
        b"PK\x03\x04slides"
    );
}

#[tokio::test]
async fn invalid_reference_fails_before_any_request() {
    let sink = Arc::new(MemorySink::new());
    let (manager, mut events) = manager_with("::not a url::", DownloadConfig::default(), sink);

    let err = manager.download("files/x", "x").await.unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));
    assert!(matches!(
        drain(&mut events).as_slice(),
        [Event::DownloadFailed { .. }]
    ));
}

/// Sink that takes a while to store what it receives
struct SlowSink {
    delay: Duration,
    saved: Mutex<Vec<Artifact>>,
}

impl SlowSink {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            saved: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ArtifactSink for SlowSink {
    async fn save(&self, artifact: &Artifact) -> Result<Option<PathBuf>> {
        tokio::time::sleep(self.delay).await;
        self.saved.lock().push(artifact.clone());
        Ok(None)
    }
}

async fn quick_server(route: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"slides".to_vec()))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn cancel_during_save_does_not_disown_the_artifact() {
    let server = quick_server("/api/deck").await;
    let sink = Arc::new(SlowSink::new(Duration::from_millis(300)));
    let (manager, mut events) = manager_with(&server.uri(), DownloadConfig::default(), sink.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let report = manager
        .download_with_cancel("deck", "deck.pptx", cancel.clone())
        .await
        .unwrap();

    assert!(cancel.is_cancelled());
    assert_eq!(report.bytes, 6);
    assert_eq!(sink.saved.lock().len(), 1);
    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(Event::DownloadComplete { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::DownloadFailed { .. })));
}

#[tokio::test]
async fn save_may_outlast_the_fetch_deadline() {
    let server = quick_server("/api/deck").await;
    let sink = Arc::new(SlowSink::new(Duration::from_millis(300)));
    let config = DownloadConfig {
        timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let (manager, _events) = manager_with(&server.uri(), config, sink.clone());

    let report = manager.download("deck", "deck.pptx").await.unwrap();

    assert_eq!(report.filename, "deck.pptx");
    assert_eq!(sink.saved.lock().len(), 1);
}

#[tokio::test]
async fn in_progress_holds_until_the_last_concurrent_transfer_ends() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/fast"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"now".to_vec()))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let (manager, _events) = manager_with(&server.uri(), DownloadConfig::default(), sink.clone());

    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.download("slow", "slow.bin").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.state().in_progress);

    manager.download("fast", "fast.bin").await.unwrap();
    assert!(
        manager.state().in_progress,
        "a finished transfer must not clear another one's progress"
    );

    slow.await.unwrap().unwrap();
    assert_eq!(manager.state(), DownloadState::default());
    assert_eq!(sink.artifacts().len(), 2);
}
