use std::time::Duration;

/// Exponential delay schedule: `base * factor^n`, capped at `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, factor: u32, cap: Duration) -> Self {
        Self { base, factor, cap }
    }

    /// Delay before the `n`-th retry (0-based).
    pub fn delay(&self, n: u32) -> Duration {
        let scale = self.factor.checked_pow(n).unwrap_or(u32::MAX);
        self.base.saturating_mul(scale).min(self.cap)
    }

    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..).map(|n| self.delay(n))
    }
}

/// Stateful reconnect schedule: 1s doubling up to 60s, reset on success.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    schedule: Backoff,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(schedule: Backoff) -> Self {
        Self {
            schedule,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.schedule.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Backoff::new(
            Duration::from_secs(1),
            2,
            Duration::from_secs(60),
        ))
    }
}
