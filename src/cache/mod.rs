mod memory_cache;

pub use memory_cache::*;

use crate::models::VideoInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

pub type SharedCache = Arc<RwLock<VideoCache>>;

#[derive(Clone)]
pub struct CacheEntry {
    pub info: VideoInfo,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

// /api/cache 返回的单条缓存概览
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub video_hash: String,
    pub title: Option<String>,
    pub platform: Option<String>,
    pub video_id: Option<String>,
    pub url: String,
    pub cached_at: DateTime<Utc>,
    pub age_seconds: f64,
    pub expires_in_seconds: f64,
}
