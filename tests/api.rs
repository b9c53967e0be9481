use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

use video_download_server::cache::VideoCache;
use video_download_server::error::ServerError;
use video_download_server::hash::video_hash;
use video_download_server::models::{DownloadOptions, VideoInfo};
use video_download_server::server::{handle_request, AppState};
use video_download_server::workspace::WorkspaceManager;
use video_download_server::ytdlp::VideoExtractor;

const FAKE_VIDEO: &[u8] = b"fake video bytes";

// 固定返回值的提取器替身
struct StubExtractor;

#[async_trait]
impl VideoExtractor for StubExtractor {
    async fn extract(&self, url: &str) -> Result<VideoInfo, ServerError> {
        Ok(VideoInfo {
            video_hash: video_hash("example", Some("123")),
            url: url.to_string(),
            title: Some("T".into()),
            duration: Some(30.0),
            uploader: Some("U".into()),
            thumbnail: None,
            description: None,
            view_count: None,
            like_count: None,
            upload_date: None,
            platform: Some("example".into()),
            video_id: Some("123".into()),
        })
    }

    async fn download(
        &self,
        options: &DownloadOptions,
        dest_dir: &Path,
    ) -> Result<PathBuf, ServerError> {
        let path = dest_dir.join(format!("video.{}", options.file_format));
        std::fs::write(&path, FAKE_VIDEO).map_err(ServerError::Resource)?;
        Ok(path)
    }
}

fn test_state(workspace_root: PathBuf, ttl: Duration) -> AppState {
    AppState {
        cache: Arc::new(RwLock::new(VideoCache::new(100, ttl, Duration::ZERO))),
        workspaces: Arc::new(WorkspaceManager::new(workspace_root, ttl)),
        extractor: Arc::new(StubExtractor),
        semaphore: Arc::new(Semaphore::new(4)),
    }
}

fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_json(response: hyper::Response<impl hyper::body::Body>) -> serde_json::Value {
    let bytes = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => panic!("failed to collect body"),
    };
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn extract_then_info_roundtrip() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_secs(60));
    let expected_hash = video_hash("example", Some("123"));

    let response = handle_request(get("/api/extract?url=https://example.com/v/123"), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let extracted = body_json(response).await;
    assert_eq!(extracted["video_hash"], expected_hash.as_str());
    assert_eq!(extracted["title"], "T");
    assert_eq!(extracted["duration"], 30.0);
    assert_eq!(extracted["uploader"], "U");
    assert_eq!(extracted["platform"], "example");

    let response = handle_request(get(&format!("/api/info/{expected_hash}")), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, extracted);
}

#[tokio::test]
async fn info_misses_after_ttl_expiry() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_millis(100));
    let hash = video_hash("example", Some("123"));

    let response = handle_request(get("/api/extract?url=https://example.com/v/123"), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let response = handle_request(get(&format!("/api/info/{hash}")), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_urls_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_secs(60));

    let response = handle_request(get("/api/extract?url=nonsense"), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    let response = handle_request(get("/api/extract"), state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_streams_file_and_cleans_workspace() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_millis(200));
    let expected_hash = video_hash("example", Some("123"));

    let response = handle_request(
        get("/api/download?url=https://example.com/v/123"),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Video-Hash").unwrap(),
        expected_hash.as_str()
    );
    let disposition = response
        .headers()
        .get("Content-Disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(&format!("{expected_hash}.mp4")));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), FAKE_VIDEO);

    // 响应返回时工作目录已创建；等待 TTL 过后应被删除
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn advanced_download_honors_options() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_secs(60));

    let request = Request::builder()
        .method("POST")
        .uri("/api/download/advanced")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(
            r#"{"url":"https://example.com/v/123","quality":"high","file_format":"mkv"}"#,
        )))
        .unwrap();
    let response = handle_request(request, state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("X-Quality").unwrap(), "high");
    assert_eq!(response.headers().get("X-Format").unwrap(), "mkv");

    // 非法选项返回 400
    let request = Request::builder()
        .method("POST")
        .uri("/api/download/advanced")
        .body(Full::new(Bytes::from(
            r#"{"url":"https://example.com/v/123","quality":"ultra"}"#,
        )))
        .unwrap();
    let response = handle_request(request, state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // 非法 JSON 也返回 400
    let request = Request::builder()
        .method("POST")
        .uri("/api/download/advanced")
        .body(Full::new(Bytes::from("not json")))
        .unwrap();
    let response = handle_request(request, state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_by_hash_requires_prior_extract() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_secs(60));
    let hash = video_hash("example", Some("123"));

    let response = handle_request(get(&format!("/api/download/{hash}")), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle_request(get("/api/extract?url=https://example.com/v/123"), state.clone())
        .await
        .unwrap();
    let response = handle_request(get(&format!("/api/download/{hash}")), state.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), FAKE_VIDEO);
}

#[tokio::test]
async fn cache_listing_and_deletion() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_secs(60));
    let hash = video_hash("example", Some("123"));

    let response = handle_request(get("/api/cache"), state.clone()).await.unwrap();
    assert_eq!(body_json(response).await["count"], 0);

    handle_request(get("/api/extract?url=https://example.com/v/123"), state.clone())
        .await
        .unwrap();
    let response = handle_request(get("/api/cache"), state.clone()).await.unwrap();
    let listing = body_json(response).await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["cached_videos"][0]["video_hash"], hash.as_str());
    assert!(listing["cached_videos"][0]["expires_in_seconds"].as_f64().unwrap() >= 0.0);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/cache/{hash}"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle_request(request, state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 再删一次返回 404
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/cache/{hash}"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle_request(request, state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_routes_return_404() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path().to_path_buf(), Duration::from_secs(60));

    let response = handle_request(get("/api/nope"), state.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
