use crate::error::ServerError;
use serde::{Deserialize, Serialize};

// 下载选项接受的固定取值
pub const QUALITIES: &[&str] = &["best", "worst", "high", "medium", "low"];
pub const FILE_FORMATS: &[&str] = &["mp4", "mkv", "webm", "m4a", "wav", "mp3"];

// 一次提取得到的视频元数据，按 video_hash 缓存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_hash: String,
    pub url: String,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub upload_date: Option<String>,
    pub platform: Option<String>,
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadOptions {
    pub url: String,
    #[serde(default)]
    pub format_code: Option<String>,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_file_format")]
    pub file_format: String,
    #[serde(default)]
    pub audio_only: bool,
    #[serde(default)]
    pub video_only: bool,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_file_format() -> String {
    "mp4".to_string()
}

fn default_audio_quality() -> String {
    "192".to_string()
}

impl DownloadOptions {
    // 简单下载接口使用的默认选项
    pub fn for_url(url: String) -> Self {
        Self {
            url,
            format_code: None,
            quality: default_quality(),
            file_format: default_file_format(),
            audio_only: false,
            video_only: false,
            fps: None,
            resolution: None,
            audio_quality: default_audio_quality(),
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if !QUALITIES.contains(&self.quality.as_str()) {
            return Err(ServerError::Validation(format!(
                "unsupported quality: {}",
                self.quality
            )));
        }
        if !FILE_FORMATS.contains(&self.file_format.as_str()) {
            return Err(ServerError::Validation(format!(
                "unsupported file format: {}",
                self.file_format
            )));
        }
        if self.audio_only && self.video_only {
            return Err(ServerError::Validation(
                "audio_only and video_only are mutually exclusive".to_string(),
            ));
        }
        if let Some(resolution) = &self.resolution {
            let well_formed = resolution
                .split_once('x')
                .map(|(w, h)| w.parse::<u32>().is_ok() && h.parse::<u32>().is_ok())
                .unwrap_or(false);
            if !well_formed {
                return Err(ServerError::Validation(format!(
                    "invalid resolution: {resolution}, expected WIDTHxHEIGHT"
                )));
            }
        }
        Ok(())
    }
}
