//! Rate Limiter
//!
//! Keeps backend calls under the provider's per-minute quota.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Token bucket refilled one token per `refill_every`.
struct TokenBucket {
    tokens: u32,
    max_tokens: u32,
    last_refill: Instant,
    refill_every: Duration,
}

impl TokenBucket {
    fn new(max_tokens: u32, refill_every: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            last_refill: Instant::now(),
            refill_every,
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        let refills = (elapsed.as_secs_f64() / self.refill_every.as_secs_f64()) as u32;

        if refills > 0 {
            self.tokens = self.tokens.saturating_add(refills).min(self.max_tokens);
            self.last_refill = Instant::now();
        }
    }

    fn reset(&mut self) {
        self.tokens = self.max_tokens;
        self.last_refill = Instant::now();
    }
}

/// Shared limiter for calls to the generative backend.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Allow `calls` per minute, with a burst of the same size.
    pub fn per_minute(calls: u32) -> Self {
        let calls = calls.max(1);
        Self {
            bucket: Mutex::new(TokenBucket::new(calls, Duration::from_secs_f64(60.0 / f64::from(calls)))),
        }
    }

    /// Take one call slot if available.
    pub fn try_acquire(&self) -> bool {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner()).try_consume()
    }

    pub fn reset(&self) {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner()).reset();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket() {
        let mut bucket = TokenBucket::new(3, Duration::from_secs(60));

        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume()); // Exhausted
    }

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::per_minute(10);

        for _ in 0..10 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        limiter.reset();
        assert!(limiter.try_acquire());
    }
}
