use std::time::Duration;

pub const INITIAL_DELAY: Duration = Duration::from_millis(250);
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential reconnect delay: 250 ms doubling up to 30 s.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { next: INITIAL_DELAY }
    }
}

impl Backoff {
    /// Delay to wait now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_DELAY);
        delay
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.next = INITIAL_DELAY;
    }
}
