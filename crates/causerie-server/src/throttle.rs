//! Per-connection event throttle.
//!
//! Token bucket applied to inbound WebSocket events so one connection cannot
//! flood the hub. Each connection owns its bucket; there is no shared map to
//! clean up because the bucket dies with the connection task.

use std::time::Instant;

#[derive(Debug)]
pub struct EventThrottle {
    tokens: f64,
    rate: f64,
    capacity: f64,
    last_refill: Instant,
}

impl EventThrottle {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            rate,
            capacity,
            last_refill: Instant::now(),
        }
    }

    /// Consume one token; `false` means the event should be dropped.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for EventThrottle {
    // 20 events/s sustained, burst of 60: generous for typing indicators,
    // tight enough to stop floods.
    fn default() -> Self {
        Self::new(20.0, 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let mut throttle = EventThrottle::new(10.0, 5.0);
        for _ in 0..5 {
            assert!(throttle.allow());
        }
        assert!(!throttle.allow());
    }

    #[test]
    fn test_refills_over_time() {
        let mut throttle = EventThrottle::new(1000.0, 2.0);
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(throttle.allow());
    }
}
