use dashmap::DashMap;
use std::net::IpAddr;
use tokio::time::{Duration, Instant};

const PRUNE_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// RateLimiter counts requests per client IP in fixed windows. Callers over
/// the limit are rejected immediately with the time left in their window.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        RateLimiter {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// 50 requests per minute.
    pub fn per_minute() -> Self {
        Self::new(50, Duration::from_secs(60))
    }

    /// Record one request from `ip`. Returns the retry-after delay when the
    /// request is over the limit.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        if self.windows.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut entry = self.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started);
            return Err(self.window.saturating_sub(elapsed));
        }

        window.count += 1;
        Ok(())
    }

    fn prune(&self, now: Instant) {
        let span = self.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < span);
        tracing::debug!(remaining = self.windows.len(), "Pruned rate limit windows");
    }
}

/// Whole seconds to advertise in `Retry-After`, never zero.
pub fn retry_after_secs(delay: Duration) -> u64 {
    delay.as_secs_f64().ceil().max(1.0) as u64
}
