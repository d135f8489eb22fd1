use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn acquire(&self) {
        let wait = {
            let mut next_slot = self
                .next_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = (*next_slot).max(now);
            *next_slot = slot + self.min_interval;
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}
