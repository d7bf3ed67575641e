//! Media pipeline against a local HTTP server standing in for the reel page,
//! the video CDN, the anonymous file host and the Send API.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use reel_relay::bot::{GraphApiDispatcher, ReplyDispatcher, ReplyError};
use reel_relay::config::{RetryPolicy, Settings};
use reel_relay::media::{
    AnonymousFileHost, FetchError, HttpMediaFetcher, MediaAsset, MediaFetcher, MediaReference,
    PublishError, Rehoster,
};
use reel_relay::sender::SenderId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempPath;
use tokio::net::TcpListener;

const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake reel payload";

#[derive(Default)]
struct FakeHosts {
    flaky_page_hits: AtomicUsize,
    upload_hits: AtomicUsize,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    replies: Mutex<Vec<(Option<String>, serde_json::Value)>>,
}

type Shared = Arc<FakeHosts>;

fn page_with_video(video_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head>
        <meta property="og:title" content="Reel">
        <meta property="og:video" content="{video_url}">
        </head><body></body></html>"#
    )
}

async fn reel_page(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "missing" => (StatusCode::NOT_FOUND, Html("not found".to_string())),
        "no-video" => (
            StatusCode::OK,
            Html("<html><head><meta property=\"og:title\" content=\"x\"></head></html>".to_string()),
        ),
        "gone-video" => (StatusCode::OK, Html(page_with_video("/cdn/gone.mp4"))),
        "stalled-video" => (StatusCode::OK, Html(page_with_video("/stalled.mp4"))),
        _ => (StatusCode::OK, Html(page_with_video("/cdn/video.mp4"))),
    }
}

async fn flaky_page(State(hosts): State<Shared>) -> impl IntoResponse {
    if hosts.flaky_page_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, Html(String::new()))
    } else {
        (StatusCode::OK, Html(page_with_video("/cdn/video.mp4")))
    }
}

async fn video(Path(name): Path<String>) -> impl IntoResponse {
    if name == "video.mp4" {
        (StatusCode::OK, VIDEO_BYTES.to_vec())
    } else {
        (StatusCode::NOT_FOUND, Vec::new())
    }
}

/// Sends the first chunk of the video, then never finishes
async fn stalled_video() -> Body {
    let head = futures_util::stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(
        &VIDEO_BYTES[..8],
    ))]);
    Body::from_stream(futures_util::StreamExt::chain(
        head,
        futures_util::stream::pending(),
    ))
}

async fn upload(
    State(hosts): State<Shared>,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    hosts.upload_hits.fetch_add(1, Ordering::SeqCst);
    hosts
        .uploads
        .lock()
        .expect("uploads lock")
        .push((name, body.to_vec()));
    "https://filehost.example/abc\n"
}

async fn broken_upload(State(hosts): State<Shared>) -> impl IntoResponse {
    hosts.upload_hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "storage full")
}

async fn send_api(
    State(hosts): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    hosts
        .replies
        .lock()
        .expect("replies lock")
        .push((query.get("access_token").cloned(), body));
    Json(serde_json::json!({"recipient_id": "111", "message_id": "m1"}))
}

async fn spawn_hosts() -> (SocketAddr, Shared) {
    let hosts = Shared::default();
    let app = Router::new()
        .route("/reel/flaky", get(flaky_page))
        .route("/reel/:id", get(reel_page))
        .route("/cdn/:name", get(video))
        .route("/stalled.mp4", get(stalled_video))
        .route("/upload/:name", put(upload))
        .route("/broken/:name", put(broken_upload))
        .route("/v18.0/me/messages", post(send_api))
        .with_state(Arc::clone(&hosts));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, hosts)
}

fn settings(addr: SocketAddr, file_host_path: &str) -> Settings {
    Settings {
        verify_token: "verify".to_string(),
        page_access_token: "page-token".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        graph_api_base: format!("http://{addr}/v18.0"),
        file_host_url: format!("http://{addr}/{file_host_path}"),
        user_agent: "Mozilla/5.0 (test)".to_string(),
        rate_window_secs: 3600,
        rate_max_messages: 5,
        http_timeout_secs: 5,
        transfer_timeout_secs: 5,
        fetch_max_retries: 2,
        publish_max_retries: 2,
        reply_max_retries: 1,
        retry_initial_backoff_ms: 1,
        retry_max_backoff_ms: 5,
    }
}

fn fast_retry(max_retries: usize) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn reel(addr: SocketAddr, id: &str) -> MediaReference {
    MediaReference::new(format!("http://{addr}/reel/{id}"))
}

fn dir_entries(dir: &tempfile::TempDir) -> usize {
    std::fs::read_dir(dir.path()).map_or(0, Iterator::count)
}

#[tokio::test]
async fn test_fetch_streams_video_into_unique_files() {
    let (addr, _hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload")).with_temp_dir(dir.path());

    let first = fetcher.fetch(&reel(addr, "Abc123")).await.expect("first fetch");
    let second = fetcher.fetch(&reel(addr, "Abc123")).await.expect("second fetch");

    assert_ne!(first.path(), second.path());
    assert_eq!(first.size(), VIDEO_BYTES.len() as u64);
    assert_eq!(std::fs::read(first.path()).expect("read asset"), VIDEO_BYTES);
    assert!(first.path().starts_with(dir.path()));

    first.discard();
    second.discard();
    assert_eq!(dir_entries(&dir), 0);
}

#[tokio::test]
async fn test_fetch_page_not_found() {
    let (addr, _hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload")).with_temp_dir(dir.path());

    let err = fetcher
        .fetch(&reel(addr, "missing"))
        .await
        .expect_err("page is missing");
    assert!(matches!(
        err,
        FetchError::PageUnavailable {
            status: StatusCode::NOT_FOUND
        }
    ));
    assert_eq!(dir_entries(&dir), 0);
}

#[tokio::test]
async fn test_fetch_without_og_video() {
    let (addr, _hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload")).with_temp_dir(dir.path());

    let err = fetcher
        .fetch(&reel(addr, "no-video"))
        .await
        .expect_err("no video tag");
    assert!(matches!(err, FetchError::NoVideoFound));
}

#[tokio::test]
async fn test_fetch_video_download_failure_leaves_no_file() {
    let (addr, _hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload")).with_temp_dir(dir.path());

    let err = fetcher
        .fetch(&reel(addr, "gone-video"))
        .await
        .expect_err("video is gone");
    assert!(matches!(err, FetchError::DownloadFailed { .. }));
    assert_eq!(dir_entries(&dir), 0);
}

#[tokio::test]
async fn test_cancelled_download_leaves_no_file() {
    let (addr, _hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload")).with_temp_dir(dir.path());

    let result = tokio::time::timeout(
        Duration::from_millis(500),
        fetcher.fetch(&reel(addr, "stalled-video")),
    )
    .await;

    assert!(result.is_err(), "download should still be in progress");
    assert_eq!(dir_entries(&dir), 0);
}

#[tokio::test]
async fn test_fetch_retries_transient_page_error() {
    let (addr, hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload"))
        .with_temp_dir(dir.path())
        .with_retry(fast_retry(2));

    let asset = fetcher
        .fetch(&reel(addr, "flaky"))
        .await
        .expect("second attempt succeeds");
    assert_eq!(hosts.flaky_page_hits.load(Ordering::SeqCst), 2);
    asset.discard();
}

#[tokio::test]
async fn test_fetch_unreachable_host_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let fetcher = HttpMediaFetcher::new(&settings(addr, "upload")).with_retry(fast_retry(1));
    let err = fetcher
        .fetch(&reel(addr, "Abc123"))
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, FetchError::NetworkError(_)));
}

#[tokio::test]
async fn test_publish_uploads_bytes_and_returns_trimmed_link() {
    let (addr, hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("reel-42.mp4");
    std::fs::write(&path, VIDEO_BYTES).expect("write asset");
    let asset = MediaAsset::new(
        reel(addr, "Abc123"),
        TempPath::from_path(path),
        VIDEO_BYTES.len() as u64,
    );

    let host = AnonymousFileHost::new(&settings(addr, "upload"));
    let link = host.publish(&asset).await.expect("upload succeeds");

    assert_eq!(link.as_str(), "https://filehost.example/abc");
    let uploads = hosts.uploads.lock().expect("uploads lock");
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "reel-42.mp4");
    assert_eq!(uploads[0].1, VIDEO_BYTES);
}

#[tokio::test]
async fn test_publish_failure_is_bounded() {
    let (addr, hosts) = spawn_hosts().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("reel-43.mp4");
    std::fs::write(&path, VIDEO_BYTES).expect("write asset");
    let asset = MediaAsset::new(
        reel(addr, "Abc123"),
        TempPath::from_path(path),
        VIDEO_BYTES.len() as u64,
    );

    let host = AnonymousFileHost::new(&settings(addr, "broken")).with_retry(fast_retry(2));
    let err = host.publish(&asset).await.expect_err("host is broken");

    assert!(matches!(
        err,
        PublishError::UploadFailed {
            status: Some(StatusCode::INTERNAL_SERVER_ERROR),
            ..
        }
    ));
    assert_eq!(hosts.upload_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_reply_posts_send_api_payload() -> Result<(), ReplyError> {
    let (addr, hosts) = spawn_hosts().await;
    let dispatcher = GraphApiDispatcher::new(&settings(addr, "upload"));

    dispatcher
        .send(&SenderId::new("111"), "🎥 Here's your video: https://filehost.example/abc")
        .await?;

    let replies = hosts.replies.lock().expect("replies lock");
    assert_eq!(replies.len(), 1);
    let (token, body) = &replies[0];
    assert_eq!(token.as_deref(), Some("page-token"));
    assert_eq!(body["recipient"]["id"], "111");
    assert_eq!(
        body["message"]["text"],
        "🎥 Here's your video: https://filehost.example/abc"
    );
    Ok(())
}

#[tokio::test]
async fn test_reply_rejected_by_send_api() {
    let (addr, _hosts) = spawn_hosts().await;
    let mut s = settings(addr, "upload");
    s.graph_api_base = format!("http://{addr}/nowhere");
    let dispatcher = GraphApiDispatcher::new(&s).with_retry(RetryPolicy::none());

    let err = dispatcher
        .send(&SenderId::new("111"), "hello")
        .await
        .expect_err("unknown route");
    assert!(matches!(
        err,
        ReplyError::Rejected {
            status: StatusCode::NOT_FOUND,
            ..
        }
    ));
}
