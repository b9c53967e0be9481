use crate::cache::VideoCache;
use crate::config::Config;
use crate::server::handler::{handle_request, AppState};
use crate::workspace::WorkspaceManager;
use crate::ytdlp::YtDlp;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info};

pub struct DownloadServer {
    config: Config,
    state: AppState,
}

impl DownloadServer {
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(RwLock::new(VideoCache::new(
            config.cache_capacity,
            config.cache_ttl,
            config.cache_cleanup_interval,
        )));
        let workspaces = Arc::new(WorkspaceManager::new(
            config.temp_dir.clone(),
            config.cache_ttl,
        ));
        let state = AppState {
            cache,
            workspaces,
            extractor: Arc::new(YtDlp::new()),
            semaphore: Arc::new(Semaphore::new(config.max_downloads)),
        };

        Self { config, state }
    }

    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("视频下载服务运行在 http://{}", self.config.bind_addr);
        info!("- 临时目录: {:?}", self.config.temp_dir);
        info!("- 缓存过期时间: {}s", self.config.cache_ttl.as_secs());
        info!("- 最大并发下载: {}", self.config.max_downloads);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let io = TokioIo::new(stream);
                    let state = self.state.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |req| handle_request(req, state.clone()));
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!("连接处理失败: {}", e);
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    // 显式停机：停止接收连接并清空缓存
                    info!("收到退出信号，清空缓存后停止服务");
                    self.state.cache.write().await.clear();
                    return Ok(());
                }
            }
        }
    }
}
