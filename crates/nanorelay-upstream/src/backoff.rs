use std::time::Duration;

/// Jitter fraction applied to each delay (up to +10 %).
const JITTER_FRACTION: f64 = 0.10;

/// Reconnect delay schedule: starts at `min`, doubles per failure, capped
/// at `max`, plus jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    min_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let min_ms = min_ms.max(1);
        let max_ms = max_ms.max(min_ms);
        Self {
            min_ms,
            max_ms,
            current_ms: min_ms,
        }
    }

    /// Delay before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_ms;
        self.current_ms = (self.current_ms.saturating_mul(2)).min(self.max_ms);
        Duration::from_millis(base + jitter_ms(base))
    }

    /// Back to the minimum delay after a successful connection.
    pub fn reset(&mut self) {
        self.current_ms = self.min_ms;
    }
}

/// Return a jitter offset (0 … `JITTER_FRACTION * base_ms`).
///
/// Derived from the sub-second clock; unpredictability is all that matters.
fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}
