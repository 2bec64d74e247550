use std::time::{Duration, Instant};

use dashmap::DashMap;

const MAX_FAILURES: u32 = 5;
const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Per-email login brute force limiter: 5 failures per 15 minutes.
pub struct LoginRateLimiter {
    /// email -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Does NOT increment the counter; call `record_failure()` on a bad password.
    /// Err carries the seconds until the window resets.
    pub fn check(&self, email: &str) -> Result<(), u64> {
        let now = Instant::now();

        let Some(entry) = self.entries.get(&email.to_lowercase()) else {
            return Ok(());
        };
        let (count, start) = entry.value();

        if now.duration_since(*start) > WINDOW {
            return Ok(());
        }

        if *count >= MAX_FAILURES {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(WINDOW.as_secs().saturating_sub(elapsed));
        }

        Ok(())
    }

    pub fn record_failure(&self, email: &str) {
        let now = Instant::now();

        let mut entry = self.entries.entry(email.to_lowercase()).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > WINDOW {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    pub fn clear(&self, email: &str) {
        self.entries.remove(&email.to_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..4 {
            limiter.record_failure("Tech@Serwis.pl");
        }
        assert!(limiter.check("tech@serwis.pl").is_ok());

        limiter.record_failure("tech@serwis.pl");
        assert!(limiter.check("TECH@serwis.pl").is_err());
    }

    #[test]
    fn clear_resets_counter() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failure("a@b.c");
        }
        limiter.clear("a@b.c");
        assert!(limiter.check("a@b.c").is_ok());
    }
}
