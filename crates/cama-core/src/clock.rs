use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Wall clock that never hands out the same instant twice.
///
/// Entity timestamps must be strictly ordered within a process even when the
/// system clock stalls or steps backwards, so a stalled reading is bumped by
/// one microsecond past the last issued instant.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new timestamp, strictly after every previous one.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap();
        let physical = Utc::now();

        let next = match *last {
            Some(prev) if physical <= prev => prev + Duration::microseconds(1),
            _ => physical,
        };

        *last = Some(next);
        next
    }

    /// Generate a timestamp strictly after `floor`.
    ///
    /// Used when a persisted value (possibly written by an earlier process)
    /// must be superseded, e.g. refreshing `updated_at`.
    pub fn now_after(&self, floor: DateTime<Utc>) -> DateTime<Utc> {
        {
            let mut last = self.last.lock().unwrap();
            if last.map_or(true, |prev| prev < floor) {
                *last = Some(floor);
            }
        }
        self.now()
    }
}
