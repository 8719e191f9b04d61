use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Randomized inter-action delay that keeps the like cadence irregular.
#[derive(Debug, Clone)]
pub struct ActionPacer {
    range_ms: (u64, u64),
}

impl ActionPacer {
    pub fn new(range_ms: (u64, u64)) -> Self {
        let lower = range_ms.0.min(range_ms.1);
        let upper = range_ms.0.max(range_ms.1);
        Self {
            range_ms: (lower, upper),
        }
    }

    pub fn disabled() -> Self {
        Self { range_ms: (0, 0) }
    }

    pub fn range_ms(&self) -> (u64, u64) {
        self.range_ms
    }

    pub fn next_delay(&self) -> Duration {
        let (lower, upper) = self.range_ms;
        if upper == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lower..=upper))
    }

    /// Sleeps for a random delay and returns the milliseconds waited.
    pub async fn wait(&self) -> u64 {
        let delay = self.next_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        delay.as_millis() as u64
    }
}
