/// 失败任务的重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// 基础重试间隔（毫秒）
    pub base_delay_ms: u64,
}

/// 一次失败之后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 以新的重试次数延迟重新入队
    Retry { retry_count: u32, delay_ms: u64 },
    /// 重试次数已用尽
    GiveUp,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// 第 `retry_count` 次失败后的延迟：base * 2^retry_count
    pub fn delay_for(&self, retry_count: u32) -> u64 {
        let multiplier = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(multiplier)
    }

    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::Retry {
                retry_count: retry_count + 1,
                delay_ms: self.delay_for(retry_count),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_sequence() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|n| policy.delay_for(n)).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn test_decide_stops_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0),
            RetryDecision::Retry {
                retry_count: 1,
                delay_ms: 2000
            }
        );
        assert_eq!(
            policy.decide(4),
            RetryDecision::Retry {
                retry_count: 5,
                delay_ms: 32000
            }
        );
        assert_eq!(policy.decide(5), RetryDecision::GiveUp);
        assert_eq!(RetryPolicy::new(0, 2000).decide(0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(100, 2000);
        assert_eq!(policy.delay_for(80), u64::MAX);
    }
}
