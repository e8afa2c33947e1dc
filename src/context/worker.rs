//! 同步工作卸载池
//!
//! 调度本身是单任务协作式并发；无法异步化的同步函数放到 blocking 线程池执行，
//! 用 Semaphore 限制同时占用的线程数。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::core::{ActionError, ActionResult};

/// 受限工作线程池（可克隆，分离上下文与父上下文共享同一个池）
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let size = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 当前空闲的线程许可数
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// 在线程池中执行同步函数并等待结果
    pub async fn run<F, T>(&self, func: F) -> ActionResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(Arc::clone(&self.permits), func).await
    }

    /// 发射后不管：立即返回句柄，丢弃句柄不会取消任务
    pub fn spawn<F, T>(&self, func: F) -> JoinHandle<ActionResult<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(run_blocking(permits, func))
    }

    /// 在独立的运行时 worker 上执行异步任务并等待结果
    pub async fn run_task<Fut, T>(&self, task: Fut) -> ActionResult<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ActionError::Offload(e.to_string()))?;
        tokio::spawn(async move {
            let _permit = permit;
            task.await
        })
        .await
        .map_err(|e| ActionError::Offload(e.to_string()))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}

async fn run_blocking<F, T>(permits: Arc<Semaphore>, func: F) -> ActionResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let permit = permits
        .acquire_owned()
        .await
        .map_err(|e| ActionError::Offload(e.to_string()))?;
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        func()
    })
    .await
    .map_err(|e| ActionError::Offload(e.to_string()))
}
