//! 异步重试
//!
//! 指数退避的重试辅助，集群总线的应答路径使用它。

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// 退避策略
#[derive(Clone, Debug)]
pub enum Backoff {
    Exponential { base: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base } => {
                let exp = std::cmp::min(attempt.saturating_sub(1), 20);
                let factor = 1u32 << exp;
                base.saturating_mul(factor)
            }
        }
    }
}

/// 重试配置
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// 错误文本包含任一子串时才重试
    pub retryable_errors: Vec<String>,
}

fn is_retryable<E: std::fmt::Display>(err: &E, retryable: &[String]) -> bool {
    let s = err.to_string();
    retryable.iter().any(|code| s.contains(code))
}

/// 执行操作，失败且可重试时按退避策略重来
pub async fn retry_async<F, Fut, T, E>(config: RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e, &config.retryable_errors) {
                    return Err(e);
                }
                let delay = config.backoff.delay_at(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "操作失败，准备重试");
                sleep(delay).await;
            }
        }
    }
}
