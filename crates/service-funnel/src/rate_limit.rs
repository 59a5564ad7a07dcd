use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::AppError;

/// Process-wide token bucket guarding the chat endpoint, the only route that
/// spends text-generation quota.
#[derive(Clone)]
pub struct RateLimiter {
    rps: u32,
    bucket: Arc<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// `None` when `rps` is zero, which disables limiting.
    pub fn new(rps: u32) -> Option<Self> {
        (rps > 0).then(|| Self {
            rps,
            bucket: Arc::new(Mutex::new(TokenBucket::full(rps, Instant::now()))),
        })
    }

    pub async fn check(&self) -> Result<(), AppError> {
        let mut bucket = self.bucket.lock().await;
        bucket.take(Instant::now()).map_err(|wait| {
            AppError::RateLimited(format!(
                "rate limit exceeded ({} requests/s), retry in ~{}ms",
                self.rps,
                wait.as_millis()
            ))
        })
    }
}

/// Holds at most `capacity` tokens and gains `capacity` per second.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            refilled_at: now,
        }
    }

    /// Spend one token, or report how long until one is available.
    fn take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.capacity).min(self.capacity);
        self.refilled_at = now;

        if self.tokens < 1.0 {
            return Err(Duration::from_secs_f64((1.0 - self.tokens) / self.capacity));
        }
        self.tokens -= 1.0;
        Ok(())
    }
}
