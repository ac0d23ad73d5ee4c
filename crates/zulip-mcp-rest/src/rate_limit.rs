// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Per-identity outbound token bucket (spec §4.3 step 3, default 100 req /
//! 60 s, configurable).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(requests: u32, window_secs: u64) -> Self {
        let capacity = requests.max(1) as f64;
        let window = window_secs.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / window,
            bucket: Mutex::new(Bucket { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
                let elapsed = bucket.last_refill.elapsed().as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = Instant::now();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64((deficit / self.refill_per_sec).max(0.001)))
                }
            };
            match wait {
                None => return,
                Some(d) => sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_immediately_while_tokens_available() {
        let bucket = TokenBucket::new(2, 60);
        let start = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn blocks_once_bucket_is_exhausted() {
        let bucket = TokenBucket::new(1, 1);
        bucket.acquire().await;
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
