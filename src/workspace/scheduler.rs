use super::{log_removal, remove_workspace};
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Handle;

// 延迟清理的执行策略：事件循环内用 tokio 定时任务，循环外用独立定时线程。
// 两种策略对外行为一致：目录在延迟到期前存在，到期后被删除。
pub trait CleanupScheduler: Send + Sync {
    fn schedule(&self, path: PathBuf, delay: Duration);
}

pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl CleanupScheduler for TokioScheduler {
    fn schedule(&self, path: PathBuf, delay: Duration) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            log_removal(&path, tokio::fs::remove_dir_all(&path).await);
        });
    }
}

pub struct TimerScheduler;

impl CleanupScheduler for TimerScheduler {
    fn schedule(&self, path: PathBuf, delay: Duration) {
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            remove_workspace(&path);
        });
    }
}

// 启动时探测运行环境，选定其一
pub fn detect_scheduler() -> Box<dyn CleanupScheduler> {
    match Handle::try_current() {
        Ok(handle) => Box::new(TokioScheduler::new(handle)),
        Err(_) => Box::new(TimerScheduler),
    }
}
