use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::context::RequestContext;
use crate::error::Error;
use crate::throttle::Throttle;
use crate::util::lock_unpoisoned;

#[derive(Debug)]
struct TokenBucket {
    interval: Duration,
    burst: usize,
    tokens: f64,
    last_refill_at: Instant,
}

impl TokenBucket {
    fn new(interval: Duration, burst: usize, now: Instant) -> Self {
        let burst = burst.max(1);
        Self {
            interval,
            burst,
            tokens: burst as f64,
            last_refill_at: now,
        }
    }

    fn unlimited(&self) -> bool {
        self.interval.is_zero()
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill_at {
            return;
        }
        let elapsed = now.duration_since(self.last_refill_at);
        self.last_refill_at = now;
        let replenished = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        self.tokens = (self.tokens + replenished).min(self.burst as f64);
    }

    fn wait_duration(&self) -> Duration {
        let needed_tokens = (1.0 - self.tokens).max(0.0);
        let delay_secs = needed_tokens * self.interval.as_secs_f64();
        if delay_secs <= f64::EPSILON {
            // float drift can leave the bucket a hair under one token
            Duration::from_millis(1)
        } else {
            // never more than one full interval, even when that is huge
            Duration::try_from_secs_f64(delay_secs).unwrap_or(self.interval)
        }
    }

    /// Takes one token, or reports how long until one is available.
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if self.unlimited() {
            return Ok(());
        }
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            return Ok(());
        }
        Err(self.wait_duration())
    }
}

/// Token-bucket [`Throttle`]: one permit every `interval`, up to `burst`
/// permits available without waiting.
///
/// ```
/// use std::time::Duration;
/// use reqlet::RateThrottle;
///
/// // one call every 200ms, no burst beyond a single call
/// let throttle = RateThrottle::new(Duration::from_millis(200), 1);
/// assert_eq!(throttle.burst(), 1);
/// ```
#[derive(Debug)]
pub struct RateThrottle {
    bucket: Mutex<TokenBucket>,
}

impl RateThrottle {
    /// A zero `interval` disables limiting; `burst` is clamped to at least 1.
    pub fn new(interval: Duration, burst: usize) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(interval, burst, Instant::now())),
        }
    }

    /// Non-finite or non-positive rates fall back to one call per second; a
    /// rate too small to express saturates to the longest interval.
    pub fn per_second(requests_per_second: f64, burst: usize) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second).unwrap_or(Duration::MAX)
        } else {
            Duration::from_secs(1)
        };
        Self::new(interval, burst)
    }

    pub fn interval(&self) -> Duration {
        lock_unpoisoned(&self.bucket).interval
    }

    pub fn burst(&self) -> usize {
        lock_unpoisoned(&self.bucket).burst
    }

    pub fn available_tokens(&self) -> f64 {
        let mut bucket = lock_unpoisoned(&self.bucket);
        if bucket.unlimited() {
            return bucket.burst as f64;
        }
        bucket.refill(Instant::now());
        bucket.tokens
    }

    fn try_acquire(&self) -> Result<(), Duration> {
        lock_unpoisoned(&self.bucket).try_acquire(Instant::now())
    }
}

#[async_trait]
impl Throttle for RateThrottle {
    async fn wait(&self, ctx: &RequestContext) -> crate::Result<()> {
        loop {
            if let Some(error) = ctx.err() {
                return Err(error.into());
            }
            let wait = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            if let Some(remaining) = ctx.remaining()
                && remaining < wait
            {
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    remaining_ms = remaining.as_millis() as u64,
                    "throttle wait would exceed context deadline"
                );
                return Err(Error::DeadlineExceeded);
            }
            debug!(wait_ms = wait.as_millis() as u64, "throttle waiting for token");
            ctx.run(sleep(wait)).await?;
        }
    }
}
