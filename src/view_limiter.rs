//! Time-windowed view deduplication for the read-side API.
//!
//! Suppresses repeat view counting from the same client within a TTL.
//! Purely in-memory: entries are lost on restart, which only means a few
//! views get double counted, which a popularity counter can absorb.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type ViewKey = (String, String, i64);

pub struct ViewTracker<C: Clock = SystemClock> {
    ttl: Duration,
    views: Mutex<HashMap<ViewKey, Instant>>,
    clock: C,
}

impl ViewTracker<SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C: Clock> ViewTracker<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            views: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether a view from `ip` on (`content_type`, `content_id`) should be
    /// counted. First sight or an expired entry counts (and refreshes the
    /// timestamp); anything younger than the TTL does not.
    pub fn should_count(&self, ip: &str, content_type: &str, content_id: i64) -> bool {
        let now = self.clock.now();
        let mut views = self.views.lock().unwrap();

        // Lazy sweep keeps the map bounded without a background task.
        views.retain(|_, seen| now.duration_since(*seen) < self.ttl);

        let key = (ip.to_string(), content_type.to_string(), content_id);
        match views.get(&key) {
            Some(seen) if now.duration_since(*seen) < self.ttl => false,
            _ => {
                views.insert(key, now);
                true
            }
        }
    }

    /// Number of live entries, per content type. Debugging aid.
    pub fn stats(&self) -> HashMap<String, usize> {
        let views = self.views.lock().unwrap();
        let mut breakdown: HashMap<String, usize> = HashMap::new();
        for (_, content_type, _) in views.keys() {
            *breakdown.entry(content_type.clone()).or_default() += 1;
        }
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Test clock: a fixed origin plus an adjustable offset.
    struct ManualClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl ManualClock {
        fn new() -> (Self, Arc<Mutex<Duration>>) {
            let offset = Arc::new(Mutex::new(Duration::ZERO));
            (
                Self {
                    origin: Instant::now(),
                    offset: offset.clone(),
                },
                offset,
            )
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + *self.offset.lock().unwrap()
        }
    }

    #[test]
    fn counts_once_then_suppresses_until_ttl() {
        let (clock, offset) = ManualClock::new();
        let tracker = ViewTracker::with_clock(Duration::from_secs(3600), clock);

        assert!(tracker.should_count("10.0.0.1", "chapter", 5));
        assert!(!tracker.should_count("10.0.0.1", "chapter", 5));

        *offset.lock().unwrap() = Duration::from_secs(3599);
        assert!(!tracker.should_count("10.0.0.1", "chapter", 5));

        *offset.lock().unwrap() = Duration::from_secs(3600);
        assert!(tracker.should_count("10.0.0.1", "chapter", 5));
    }

    #[test]
    fn distinct_keys_count_independently() {
        let tracker = ViewTracker::new(Duration::from_secs(3600));
        assert!(tracker.should_count("10.0.0.1", "chapter", 5));
        assert!(tracker.should_count("10.0.0.2", "chapter", 5));
        assert!(tracker.should_count("10.0.0.1", "series", 5));
        assert!(tracker.should_count("10.0.0.1", "chapter", 6));
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let (clock, offset) = ManualClock::new();
        let tracker = ViewTracker::with_clock(Duration::from_secs(60), clock);

        for id in 0..10 {
            assert!(tracker.should_count("10.0.0.1", "chapter", id));
        }
        assert_eq!(tracker.stats().get("chapter"), Some(&10));

        *offset.lock().unwrap() = Duration::from_secs(61);
        // Any call sweeps the stale entries.
        assert!(tracker.should_count("10.0.0.1", "series", 1));
        assert_eq!(tracker.stats().get("chapter"), None);
    }
}
