//! 超时控制实现
//!
//! 为单个后端任务提供硬截止时间，并响应请求级取消。
//! 超时只取消当前任务的传输操作，不影响同一请求中的其他后端。

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 超时错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    /// 请求超时
    #[error("请求超时: 配置 {timeout_ms}ms, 已耗时 {elapsed_ms}ms")]
    RequestTimeout { timeout_ms: u64, elapsed_ms: u64 },
    /// 操作被取消
    #[error("操作已取消")]
    Cancelled,
}

/// 超时控制器
#[derive(Debug, Clone, Copy)]
pub struct TimeoutController {
    timeout: Duration,
}

impl TimeoutController {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// 带截止时间和取消执行异步操作
    ///
    /// 超时或取消时 `operation` 被丢弃，其持有的连接随之释放。
    pub async fn execute<F, T>(
        &self,
        operation: F,
        cancel_token: &CancellationToken,
    ) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        if cancel_token.is_cancelled() {
            return Err(TimeoutError::Cancelled);
        }

        let start = Instant::now();
        tokio::select! {
            // 取消优先，避免同时就绪时误报为超时
            biased;
            _ = cancel_token.cancelled() => Err(TimeoutError::Cancelled),
            result = tokio::time::timeout(self.timeout, operation) => {
                result.map_err(|_| TimeoutError::RequestTimeout {
                    timeout_ms: self.timeout_ms(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}
