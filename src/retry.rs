//! 재시도 정책
//!
//! 외부 API 호출(임베딩, 채팅 완성)을 감싸는 지수 백오프 재시도입니다.
//! 기본값은 fail-fast (1회 시도)이며, 대기는 `Sleeper`를 통해 이루어지므로
//! 테스트에서 가짜 시계로 대체할 수 있습니다.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// 기본 초기 백오프 (ms)
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 2000;
/// 기본 최대 백오프 (ms)
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

// ============================================================================
// Sleeper
// ============================================================================

/// 대기 추상화
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// tokio 타이머 기반 Sleeper
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// 재시도 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (최초 시도 포함, 최소 1)
    pub max_attempts: u32,
    /// 첫 재시도 전 대기 시간
    pub initial_backoff: Duration,
    /// 백오프 상한
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}

impl RetryPolicy {
    /// 재시도 없음
    pub fn fail_fast() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }

    /// 지수 백오프 (initial, initial*2, initial*4, ...)
    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }

    /// 백오프 상한 지정
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// `retry`번째 재시도(0-based) 전 대기 시간
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// 정책에 따라 `op`을 실행
    ///
    /// 재시도 가능한 에러(`RagError::is_retryable`)만 재시도하고,
    /// 그 외 에러나 마지막 시도의 에러는 그대로 반환합니다.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.backoff_for(attempt - 1);
                    tracing::warn!(
                        "{} failed: {}, retrying in {:?} (attempt {}/{})",
                        label,
                        e,
                        backoff,
                        attempt,
                        max_attempts
                    );
                    sleeper.sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::RagError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// 대기 시간을 기록만 하는 가짜 시계
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn transient() -> RagError {
        RagError::EmbeddingService {
            message: "HTTP 503".to_string(),
            retryable: true,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(350));

        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_default_is_fail_fast() {
        assert_eq!(RetryPolicy::default().max_attempts, 1);
        assert_eq!(RetryPolicy::exponential(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_does_not_retry() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::fail_fast()
            .run(&sleeper, "embed", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(4, Duration::from_millis(10));

        let result = policy
            .run(&sleeper, "embed", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(3, Duration::from_millis(1));

        let result: Result<()> = policy
            .run(&sleeper, "complete", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(RagError::EmbeddingService { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(5, Duration::from_millis(1));

        let result: Result<()> = policy
            .run(&sleeper, "embed", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RagError::MalformedResponse {
                        service: "embedding",
                        detail: "missing data".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(RagError::MalformedResponse { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
