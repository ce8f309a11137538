use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Suppresses repeat triggers inside a minimum interval
///
/// A single key press can deliver several hotkey events; only the first one
/// inside `min_interval` is accepted.
#[derive(Debug)]
pub struct Debouncer {
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl Debouncer {
    /// Default minimum interval between accepted triggers
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    /// Create a debouncer that has not accepted anything yet
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: Mutex::new(None),
        }
    }

    /// Accept a trigger now
    ///
    /// Returns `true` and records the time if at least `min_interval` has passed
    /// since the last accepted trigger; otherwise returns `false` and changes nothing.
    pub fn accept(&self) -> bool {
        self.accept_at(Instant::now())
    }

    /// Accept a trigger observed at `now`
    pub fn accept_at(&self, now: Instant) -> bool {
        // A poisoned lock only means another caller panicked mid-compare; the
        // timestamp itself is always valid
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < self.min_interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
