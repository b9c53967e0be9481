use crate::cache::SharedCache;
use crate::error::ServerError;
use crate::models::{DownloadOptions, VideoInfo};
use crate::workspace::WorkspaceManager;
use crate::ytdlp::{validate_url, VideoExtractor};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

pub type ResponseBody = BoxBody<Bytes, io::Error>;

// 所有处理函数共享的状态，字段全部可廉价克隆
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache,
    pub workspaces: Arc<WorkspaceManager>,
    pub extractor: Arc<dyn VideoExtractor>,
    pub semaphore: Arc<Semaphore>,
}

pub async fn handle_request<B>(
    req: Request<B>,
    state: AppState,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/api/extract") => extract(req.uri(), &state).await,
        (&Method::GET, "/api/download") => download_simple(req.uri(), &state).await,
        (&Method::POST, "/api/download/advanced") => download_advanced(req, &state).await,
        (&Method::GET, "/api/cache") => cache_status(&state).await,
        (&Method::GET, p) if p.starts_with("/api/info/") => {
            info_by_hash(&p["/api/info/".len()..], &state).await
        }
        (&Method::GET, p) if p.starts_with("/api/download/") => {
            download_by_hash(&p["/api/download/".len()..], &state).await
        }
        (&Method::DELETE, p) if p.starts_with("/api/cache/") => {
            delete_cache(&p["/api/cache/".len()..], &state).await
        }
        _ => Err(ServerError::NotFound(format!(
            "no such route: {method} {path}"
        ))),
    };

    Ok(result.unwrap_or_else(|err| {
        warn!("请求失败 {} {}: {}", method, path, err);
        error_response(&err)
    }))
}

async fn extract(uri: &Uri, state: &AppState) -> Result<Response<ResponseBody>, ServerError> {
    let url = require_url_param(uri)?;
    // 顺带清理过期缓存
    state.cache.write().await.sweep_expired();

    let video_info = state.extractor.extract(&url).await?;
    state
        .cache
        .write()
        .await
        .set(video_info.video_hash.clone(), video_info.clone());
    info!("提取成功: {} -> {}", url, video_info.video_hash);

    Ok(json_response(StatusCode::OK, &video_info))
}

async fn info_by_hash(
    hash: &str,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServerError> {
    let video_info = state
        .cache
        .write()
        .await
        .get(hash)
        .ok_or_else(|| ServerError::NotFound("video hash not found in cache".to_string()))?;
    Ok(json_response(StatusCode::OK, &video_info))
}

async fn download_simple(
    uri: &Uri,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServerError> {
    let url = require_url_param(uri)?;
    state.cache.write().await.sweep_expired();

    let video_info = state.extractor.extract(&url).await?;
    state
        .cache
        .write()
        .await
        .set(video_info.video_hash.clone(), video_info.clone());

    let options = DownloadOptions::for_url(url);
    run_download(state, &options, &video_info, false).await
}

async fn download_advanced<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServerError>
where
    B: Body + Send,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ServerError::Validation(format!("failed to read request body: {e}")))?
        .to_bytes();
    let options: DownloadOptions = serde_json::from_slice(&body)
        .map_err(|e| ServerError::Validation(format!("invalid request body: {e}")))?;
    options.validate()?;
    validate_url(&options.url)?;
    state.cache.write().await.sweep_expired();

    let video_info = state.extractor.extract(&options.url).await?;
    state
        .cache
        .write()
        .await
        .set(video_info.video_hash.clone(), video_info.clone());

    run_download(state, &options, &video_info, true).await
}

async fn download_by_hash(
    hash: &str,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServerError> {
    // 必须先提取过信息才能按哈希下载
    let video_info = state.cache.write().await.get(hash).ok_or_else(|| {
        ServerError::NotFound("video hash not found in cache, extract info first".to_string())
    })?;
    let options = DownloadOptions::for_url(video_info.url.clone());
    run_download(state, &options, &video_info, false).await
}

async fn cache_status(state: &AppState) -> Result<Response<ResponseBody>, ServerError> {
    let entries = state.cache.read().await.entries();
    let count = entries.len();
    Ok(json_response(
        StatusCode::OK,
        &json!({ "cached_videos": entries, "count": count }),
    ))
}

async fn delete_cache(
    hash: &str,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServerError> {
    if state.cache.write().await.remove(hash) {
        Ok(json_response(
            StatusCode::OK,
            &json!({ "message": format!("Cache cleared for hash: {hash}") }),
        ))
    } else {
        Err(ServerError::NotFound(
            "video hash not found in cache".to_string(),
        ))
    }
}

// 下载共用路径：限流、独占工作目录、响应后调度延迟清理
async fn run_download(
    state: &AppState,
    options: &DownloadOptions,
    video_info: &VideoInfo,
    advanced: bool,
) -> Result<Response<ResponseBody>, ServerError> {
    let _permit = state
        .semaphore
        .acquire()
        .await
        .map_err(|_| ServerError::Download("server is shutting down".to_string()))?;

    let workspace = state.workspaces.acquire()?;
    let result = match state.extractor.download(options, &workspace.path).await {
        Ok(file_path) => file_response(&file_path, video_info, options, advanced).await,
        Err(e) => Err(e),
    };
    // 无论成败都只调度一次清理
    state.workspaces.schedule_cleanup(workspace);
    result
}

async fn file_response(
    file_path: &Path,
    video_info: &VideoInfo,
    options: &DownloadOptions,
    advanced: bool,
) -> Result<Response<ResponseBody>, ServerError> {
    let file = tokio::fs::File::open(file_path)
        .await
        .map_err(ServerError::Resource)?;
    let size = file.metadata().await.map_err(ServerError::Resource)?.len();
    let body = StreamBody::new(ReaderStream::new(file).map_ok(Frame::data)).boxed();

    // 附件名用哈希而不是标题，保证 header 安全
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(&options.file_format);
    let file_name = format!("{}.{ext}", video_info.video_hash);
    let content_type = if ext == "mp4" {
        "video/mp4"
    } else {
        "application/octet-stream"
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, size)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename={file_name}"),
        )
        .header("X-Video-Hash", &video_info.video_hash);
    if advanced {
        builder = builder
            .header("X-Quality", &options.quality)
            .header("X-Format", &options.file_format);
    }
    builder
        .body(body)
        .map_err(|e| ServerError::Download(e.to_string()))
}

fn require_url_param(uri: &Uri) -> Result<String, ServerError> {
    query_param(uri, "url")
        .ok_or_else(|| ServerError::Validation("missing url query parameter".to_string()))
        .and_then(|url| {
            validate_url(&url)?;
            Ok(url)
        })
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    })
}

fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(full_body(body))
        .unwrap()
}

fn error_response(err: &ServerError) -> Response<ResponseBody> {
    json_response(err.status(), &json!({ "error": err.to_string() }))
}
