mod scheduler;

pub use scheduler::*;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

// 临时目录的统一前缀，便于在系统临时目录中辨认
pub const WORKSPACE_PREFIX: &str = "vdl-";

// 一次下载请求独占的临时目录
pub struct Workspace {
    pub path: PathBuf,
    pub created_at: SystemTime,
    pub ttl: Duration,
}

pub struct WorkspaceManager {
    root: PathBuf,
    ttl: Duration,
    scheduler: Box<dyn CleanupScheduler>,
}

impl WorkspaceManager {
    // 在运行时上下文中构造：根据当前环境选择清理策略
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self::with_scheduler(root, ttl, detect_scheduler())
    }

    pub fn with_scheduler(root: PathBuf, ttl: Duration, scheduler: Box<dyn CleanupScheduler>) -> Self {
        Self { root, ttl, scheduler }
    }

    // 创建唯一命名的空目录，目录由调用方独占直到清理触发
    pub fn acquire(&self) -> io::Result<Workspace> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.root)?;
        let path = dir.keep();
        debug!("创建工作目录: {:?}", path);
        Ok(Workspace {
            path,
            created_at: SystemTime::now(),
            ttl: self.ttl,
        })
    }

    // 注册延迟删除，不阻塞调用方；每个工作目录只调度一次，不可取消
    pub fn schedule_cleanup(&self, workspace: Workspace) {
        debug!(
            "调度清理: {:?} (存活 {:?}，{}s 后删除)",
            workspace.path,
            workspace.created_at.elapsed().unwrap_or_default(),
            workspace.ttl.as_secs()
        );
        self.scheduler.schedule(workspace.path, workspace.ttl);
    }
}

// 递归删除工作目录，幂等且尽力而为：失败只记日志，绝不上抛
pub fn remove_workspace(path: &Path) {
    log_removal(path, std::fs::remove_dir_all(path));
}

pub(crate) fn log_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!("已清理工作目录: {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("清理工作目录失败 {:?}: {}", path, e),
    }
}
