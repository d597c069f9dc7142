use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("time limit of {limit:?} elapsed")]
pub struct TimeoutSignal {
    pub limit: Duration,
}

/// Wall-clock deadline checked at sleep boundaries. A loop that sleeps through
/// `TimeLimit::sleep` stops at the first boundary past the deadline and never
/// mid-step.
#[derive(Clone, Copy, Debug)]
pub struct TimeLimit {
    limit: Duration,
    deadline: Instant,
}

impl TimeLimit {
    pub fn new(limit: Duration) -> Self {
        Self { limit, deadline: Instant::now() + limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Sleeps for `tick`, cut short by the deadline.
    pub async fn sleep(&self, tick: Duration) -> Result<(), TimeoutSignal> {
        if self.is_expired() {
            return Err(self.signal());
        }
        tokio::time::sleep(tick.min(self.remaining())).await;
        if self.is_expired() {
            return Err(self.signal());
        }
        Ok(())
    }

    fn signal(&self) -> TimeoutSignal {
        TimeoutSignal { limit: self.limit }
    }
}

/// Runs `body` to completion or fails with a single `TimeoutSignal` once `limit`
/// elapses. The body is dropped at its current await point on timeout.
pub async fn with_time_limit<F>(limit: Duration, body: F) -> Result<F::Output, TimeoutSignal>
where
    F: Future,
{
    tokio::time::timeout(limit, body).await.map_err(|_| TimeoutSignal { limit })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{with_time_limit, TimeLimit, TimeoutSignal};

    #[tokio::test(start_paused = true)]
    async fn sleep_succeeds_until_deadline_then_signals() {
        let limit = TimeLimit::new(Duration::from_secs(3));
        let started = Instant::now();

        assert!(limit.sleep(Duration::from_secs(1)).await.is_ok());
        assert!(limit.sleep(Duration::from_secs(1)).await.is_ok());
        assert_eq!(
            limit.sleep(Duration::from_secs(5)).await,
            Err(TimeoutSignal { limit: Duration::from_secs(3) })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(limit.is_expired());
        assert_eq!(limit.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_limit_signals_without_sleeping() {
        let limit = TimeLimit::new(Duration::ZERO);
        let started = Instant::now();

        assert!(limit.sleep(Duration::from_secs(10)).await.is_err());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn with_time_limit_returns_output_on_completion() {
        let value = with_time_limit(Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            7
        })
        .await;

        assert_eq!(value, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn with_time_limit_fires_once_on_overrun() {
        let outcome = with_time_limit(Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;

        assert_eq!(outcome, Err(TimeoutSignal { limit: Duration::from_secs(2) }));
    }
}
