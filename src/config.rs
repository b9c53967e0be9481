use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

// 启动时一次性读取的环境配置
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub temp_dir: PathBuf,
    pub cache_ttl: Duration,
    pub cache_cleanup_interval: Duration,
    pub cache_capacity: usize,
    pub max_downloads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".parse().unwrap(),
            temp_dir: env::temp_dir(),
            cache_ttl: Duration::from_secs(3600),
            cache_cleanup_interval: Duration::from_secs(300),
            cache_capacity: 100,
            max_downloads: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            bind_addr: parse_env("BIND_ADDR", defaults.bind_addr),
            temp_dir: env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            cache_ttl: Duration::from_secs(parse_env(
                "CACHE_TTL_SECONDS",
                defaults.cache_ttl.as_secs(),
            )),
            cache_cleanup_interval: Duration::from_secs(parse_env(
                "CACHE_CLEANUP_INTERVAL",
                defaults.cache_cleanup_interval.as_secs(),
            )),
            cache_capacity: parse_env("CACHE_CAPACITY", defaults.cache_capacity),
            max_downloads: parse_env("MAX_DOWNLOADS", defaults.max_downloads),
        }
    }
}

// 解析失败时退回默认值，只记录警告
fn parse_env<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("环境变量 {} 的值 {:?} 无效，使用默认值", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
