//! 任务调度：并发派发 + 汇合屏障
//!
//! 每个任务跑在独立的 tokio task 中，Semaphore 限制同时运行的数量；
//! 调用方等待全部完成后按派发顺序拿到结果，取消时中止仍在运行的任务。

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

/// 任务调度器
pub struct TaskScheduler {
    /// 并发限制（默认 3，正好覆盖全部任务类型）
    semaphore: Arc<Semaphore>,
}

impl TaskScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// 并发运行所有 job，返回值与输入顺序一致；task panic 时对应位置为 JoinError
    pub async fn run_all<K, F, T>(
        &self,
        jobs: Vec<(K, F)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(K, Result<T, JoinError>)>, AgentError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut keys = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());
        for (key, job) in jobs {
            let semaphore = Arc::clone(&self.semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                job.await
            }));
            keys.push(key);
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        tokio::select! {
            results = join_all(handles) => Ok(keys.into_iter().zip(results).collect()),
            _ = cancel.cancelled() => {
                for abort in aborts {
                    abort.abort();
                }
                Err(AgentError::Cancelled)
            }
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}
