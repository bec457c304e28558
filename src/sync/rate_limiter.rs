// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Token bucket shared by every write path.

use crate::error::{PushError, Result};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket refilled continuously at `rate` tokens per second up to `capacity`.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Limiter allowing `ops_per_second` sustained, with a burst of the same size
    pub fn new(ops_per_second: u32) -> Self {
        Self::with_capacity(ops_per_second, ops_per_second)
    }

    pub fn with_capacity(ops_per_second: u32, capacity: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            rate: f64::from(ops_per_second.max(1)),
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available, otherwise report how long until one is.
    fn take(&self) -> std::result::Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Wait for a token. Fails with [`PushError::Cancelled`] once `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(PushError::Cancelled);
            }
            let wait = match self.take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(PushError::Cancelled),
                _ = sleep(wait) => {}
            }
        }
    }
}
