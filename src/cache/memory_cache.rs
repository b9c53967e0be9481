use super::{CacheEntry, CacheStatus};
use crate::models::VideoInfo;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

// 进程内的元数据缓存：LRU 限容量，TTL 限时效
pub struct VideoCache {
    store: LruCache<String, CacheEntry>,
    max_age: Duration,
    cleanup_interval: Duration,
    last_cleanup: Instant,
}

impl VideoCache {
    pub fn new(capacity: usize, max_age: Duration, cleanup_interval: Duration) -> Self {
        // 容量来自环境配置，0 按 1 处理而不是 panic
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: LruCache::new(capacity),
            max_age,
            cleanup_interval,
            last_cleanup: Instant::now(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<VideoInfo> {
        if let Some(entry) = self.store.get(key).cloned() {
            if SystemTime::now() < entry.expires_at {
                return Some(entry.info);
            }
            // 过期条目在访问时移除
            self.store.pop(key);
        }
        None
    }

    pub fn set(&mut self, key: String, info: VideoInfo) {
        let now = SystemTime::now();
        self.store.put(
            key,
            CacheEntry {
                info,
                created_at: now,
                expires_at: now + self.max_age,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.store.pop(key).is_some()
    }

    pub fn entries(&self) -> Vec<CacheStatus> {
        let now = SystemTime::now();
        self.store
            .iter()
            .map(|(hash, entry)| {
                let age = now
                    .duration_since(entry.created_at)
                    .unwrap_or_default()
                    .as_secs_f64();
                let expires_in = entry
                    .expires_at
                    .duration_since(now)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                CacheStatus {
                    video_hash: hash.clone(),
                    title: entry.info.title.clone(),
                    platform: entry.info.platform.clone(),
                    video_id: entry.info.video_id.clone(),
                    url: entry.info.url.clone(),
                    cached_at: entry.created_at.into(),
                    age_seconds: (age * 100.0).round() / 100.0,
                    expires_in_seconds: (expires_in * 100.0).round() / 100.0,
                }
            })
            .collect()
    }

    // 主动清理过期条目，距上次清理不足 cleanup_interval 时跳过
    pub fn sweep_expired(&mut self) {
        if self.last_cleanup.elapsed() < self.cleanup_interval {
            return;
        }
        self.last_cleanup = Instant::now();

        let now = SystemTime::now();
        let expired: Vec<String> = self
            .store
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in expired {
            self.store.pop(&hash);
            debug!("缓存过期已移除: {}", hash);
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }
}
