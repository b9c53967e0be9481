use sha2::{Digest, Sha256};

// 由平台名和视频 ID 生成稳定的缓存键
pub fn video_hash(platform: &str, video_id: Option<&str>) -> String {
    let combined = format!("{}_{}", platform, video_id.unwrap_or("unknown"));
    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
