//! 模拟传输：可取消的延迟与投递结果判定

use std::time::Duration;

use notify_shared::error::{NotificationError, Result};
use rand::Rng;
use tokio_util::sync::CancellationToken;

/// 投递结果来源
///
/// 返回 `Some(延迟)` 表示消息在该延迟后投递成功，`None` 表示仅发送未确认投递。
pub trait DeliveryOracle: Send + Sync {
    fn delivery_delay(&self, success_percent: u32, delay_range_ms: (u64, u64)) -> Option<Duration>;
}

/// 按成功率随机判定
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomDelivery;

impl DeliveryOracle for RandomDelivery {
    fn delivery_delay(&self, success_percent: u32, delay_range_ms: (u64, u64)) -> Option<Duration> {
        let mut rng = rand::rng();
        if rng.random_range(0..100) >= success_percent {
            return None;
        }
        let (min, max) = delay_range_ms;
        let millis = if max > min {
            rng.random_range(min..max)
        } else {
            min
        };
        Some(Duration::from_millis(millis))
    }
}

/// 固定结果，测试中使用
#[derive(Debug, Clone, Copy)]
pub struct FixedDelivery {
    delay: Option<Duration>,
}

impl FixedDelivery {
    pub fn delivered_after(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    pub fn undelivered() -> Self {
        Self { delay: None }
    }
}

impl DeliveryOracle for FixedDelivery {
    fn delivery_delay(&self, _success_percent: u32, _delay_range_ms: (u64, u64)) -> Option<Duration> {
        self.delay
    }
}

/// 等待 `delay`，期间取消则返回 Timeout
///
/// 已取消的令牌优先于计时器，保证取消后不会继续执行后续的状态写入。
pub async fn simulate_latency(
    cancel: &CancellationToken,
    delay: Duration,
    timeout_message: &str,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NotificationError::timeout(timeout_message)),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_shared::error::ErrorCode;

    #[test]
    fn test_random_delivery_bounds() {
        let oracle = RandomDelivery;
        for _ in 0..200 {
            if let Some(delay) = oracle.delivery_delay(100, (100, 600)) {
                assert!(delay >= Duration::from_millis(100));
                assert!(delay < Duration::from_millis(600));
            } else {
                panic!("100% success rate must always deliver");
            }
        }
        assert!(oracle.delivery_delay(0, (100, 600)).is_none());
    }

    #[test]
    fn test_fixed_delivery() {
        let delivered = FixedDelivery::delivered_after(Duration::from_millis(42));
        assert_eq!(
            delivered.delivery_delay(0, (1, 2)),
            Some(Duration::from_millis(42))
        );
        assert!(FixedDelivery::undelivered().delivery_delay(100, (1, 2)).is_none());
    }

    #[tokio::test]
    async fn test_latency_completes() {
        let cancel = CancellationToken::new();
        assert!(
            simulate_latency(&cancel, Duration::from_millis(5), "timed out")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_cancelled_latency_times_out() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = simulate_latency(&cancel, Duration::from_secs(10), "email sending timed out")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.to_string().contains("email sending timed out"));
    }
}
