use crate::error::ServerError;
use crate::hash::video_hash;
use crate::models::{DownloadOptions, VideoInfo};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::SystemTime;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

// yt-dlp --dump-single-json 输出中我们关心的字段
#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    view_count: Option<i64>,
    like_count: Option<i64>,
    upload_date: Option<String>,
    extractor: Option<String>,
}

// 外部提取器的边界接口，测试时可替换
#[async_trait]
pub trait VideoExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<VideoInfo, ServerError>;

    async fn download(
        &self,
        options: &DownloadOptions,
        dest_dir: &Path,
    ) -> Result<PathBuf, ServerError>;
}

// 通过子进程调用 yt-dlp 可执行文件
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

// URL 预校验：只接受 http/https
pub fn validate_url(raw: &str) -> Result<Url, ServerError> {
    let url = Url::parse(raw)
        .map_err(|_| ServerError::Validation(format!("URL is not valid: {raw}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ServerError::Validation(format!(
            "unsupported URL scheme: {other}"
        ))),
    }
}

// 根据下载选项构造 yt-dlp 的 -f 格式选择器
pub fn format_selector(options: &DownloadOptions) -> String {
    if let Some(code) = &options.format_code {
        return code.clone();
    }
    if options.audio_only {
        "bestaudio".to_string()
    } else if options.video_only {
        "bestvideo".to_string()
    } else {
        "bv+ba".to_string()
    }
}

// quality/resolution/fps 映射为 -S 排序键。
// yt-dlp 拒绝重复的排序字段，res 键最多生成一个：显式分辨率优先于 quality 档位。
fn sort_keys(options: &DownloadOptions) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(resolution) = &options.resolution {
        if let Some((_, height)) = resolution.split_once('x') {
            keys.push(format!("res:{height}"));
        }
    } else {
        match options.quality.as_str() {
            "worst" | "low" => keys.push("+res".to_string()),
            "medium" => keys.push("res:720".to_string()),
            "high" => keys.push("res:1080".to_string()),
            _ => {}
        }
    }
    if let Some(fps) = options.fps {
        keys.push(format!("fps:{fps}"));
    }
    keys
}

fn last_stderr_line(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .trim()
        .lines()
        .last()
        .unwrap_or("yt-dlp exited with an error")
        .to_string()
}

#[async_trait]
impl VideoExtractor for YtDlp {
    async fn extract(&self, url: &str) -> Result<VideoInfo, ServerError> {
        debug!("提取视频信息: {}", url);
        let output = Command::new(&self.binary)
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--skip-download")
            .arg(url)
            .output()
            .await
            .map_err(|e| ServerError::Extraction(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ServerError::Extraction(last_stderr_line(&output)));
        }

        let raw: RawInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ServerError::Extraction(format!("invalid yt-dlp output: {e}")))?;

        let platform = raw.extractor.unwrap_or_else(|| "unknown".to_string());
        Ok(VideoInfo {
            video_hash: video_hash(&platform, raw.id.as_deref()),
            url: url.to_string(),
            title: raw.title,
            duration: raw.duration,
            uploader: raw.uploader,
            thumbnail: raw.thumbnail,
            description: raw.description,
            view_count: raw.view_count,
            like_count: raw.like_count,
            upload_date: raw.upload_date,
            platform: Some(platform),
            video_id: raw.id,
        })
    }

    async fn download(
        &self,
        options: &DownloadOptions,
        dest_dir: &Path,
    ) -> Result<PathBuf, ServerError> {
        options.validate()?;

        let selector = format_selector(options);
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--no-warnings")
            .arg("-f")
            .arg(&selector)
            .arg("-o")
            .arg("%(title)s.%(ext)s")
            .arg("-P")
            .arg(dest_dir);

        if options.audio_only {
            // 纯音频时直接转成目标格式
            cmd.arg("-x")
                .arg("--audio-format")
                .arg(&options.file_format)
                .arg("--audio-quality")
                .arg(format!("{}K", options.audio_quality));
        } else if !options.video_only {
            cmd.arg("--merge-output-format").arg(&options.file_format);
        }

        let keys = sort_keys(options);
        if !keys.is_empty() {
            cmd.arg("-S").arg(keys.join(","));
        }

        info!("开始下载: {} (format: {})", options.url, selector);
        let output = cmd
            .arg(&options.url)
            .output()
            .await
            .map_err(|e| ServerError::Download(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ServerError::Download(last_stderr_line(&output)));
        }

        // 目录为本次请求独占，最终产物就是其中最新的文件
        newest_file(dest_dir)
            .await?
            .ok_or_else(|| ServerError::Download("no output file produced".to_string()))
    }
}

// 目录中最近修改的常规文件，跳过 yt-dlp 的中间产物
async fn newest_file(dir: &Path) -> Result<Option<PathBuf>, ServerError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(ServerError::Resource)?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await.map_err(ServerError::Resource)? {
        let meta = entry.metadata().await.map_err(ServerError::Resource)?;
        if !meta.is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .map_or(false, |ext| ext == "part" || ext == "ytdl")
        {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(at, _)| modified >= *at) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}
