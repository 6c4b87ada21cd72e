//! 瞬时故障重试（指数退避 + 抖动）
//!
//! 仅 `DomainError::is_transient()` 为真的错误会被重试；并发冲突、校验错误、
//! 取消与超时立即返回。预算耗尽时返回 `RetryExhausted`，携带最后一次错误。
//!
use crate::error::{DomainError, DomainResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试前的等待
    pub initial_delay: Duration,
    /// 单次等待上限
    pub max_delay: Duration,
    /// 退避倍率
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次失败后的基础等待（不含抖动）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * exp).min(u64::MAX as f64) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// 在基础等待上叠加至多一半的随机抖动，并保持在上限之内
    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let half = (base.as_millis() / 2) as u64;
        let jitter = if half == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half)
        };
        (base + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

/// 在瞬时故障上重试 `operation`
pub async fn retry_on_transient<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> DomainResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(DomainError::RetryExhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                let delay = config.jittered(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying after delay"
                );
                sleep(delay).await;
            }
        }
    }
}
