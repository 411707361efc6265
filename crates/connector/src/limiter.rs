//! Outbound request pacing
//!
//! A token-bucket limiter sits in front of every platform API call so
//! request spacing is enforced centrally instead of with ad-hoc sleeps in
//! the fetch loops.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Paces outbound requests to a configured rate.
///
/// A rate of 0 disables pacing entirely (useful in tests).
pub struct Pacer {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl Pacer {
    pub fn new(requests_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Self { limiter }
    }

    /// Wait until the next request is allowed to go out.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn zero_rate_never_blocks() {
        let pacer = Pacer::new(0);
        for _ in 0..1000 {
            pacer.acquire().await;
        }
    }

    #[tokio::test]
    async fn burst_within_quota_is_immediate() {
        let pacer = Pacer::new(1000);
        let started = Instant::now();

        for _ in 0..100 {
            pacer.acquire().await;
        }

        assert!(started.elapsed().as_secs() < 1);
    }

    #[test]
    fn burst_capacity_equals_the_quota() {
        let pacer = Pacer::new(5);
        let limiter = pacer.limiter.as_ref().unwrap();

        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }
}
