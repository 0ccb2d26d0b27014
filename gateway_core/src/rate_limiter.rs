use std::time::{Duration, Instant};

use parking_lot::Mutex;

use gateway_utils::cancellation_token::CancellationToken;

use crate::error::GatewayError;

/// Token bucket gating every outbound REST request (C2). Refilled on every
/// access by `elapsed * rate`, capped at `burst`. Mutual exclusion is scoped
/// tightly around the bucket mutation only -- never held across I/O.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(state: &mut BucketState, rate: f64, burst: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(burst);
        state.last_refill = now;
    }

    /// Non-blocking: refills then atomically decrements if >= 1 token is
    /// available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        Self::refill(&mut state, self.rate, self.burst);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks (honoring cancellation) until a token is available. When
    /// `rate == 0` and no tokens remain, returns a deadline-exceeded error
    /// rather than blocking forever.
    pub async fn wait(&self, cancellation_token: &CancellationToken) -> Result<(), GatewayError> {
        loop {
            if self.try_acquire() {
                return Ok(());
            }

            if self.rate <= 0.0 {
                return Err(GatewayError::DeadlineExceeded);
            }

            let sleep_for = Duration::from_secs_f64(1.0 / self.rate);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancellation_token.when_cancelled() => return Err(GatewayError::Cancelled),
            }
        }
    }

    /// Restores tokens to `burst`.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.burst;
        state.last_refill = Instant::now();
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        Self::refill(&mut state, self.rate, self.burst);
        state.tokens
    }
}
