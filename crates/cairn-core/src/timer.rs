use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant,
/// so a test can keep a handle after moving one into a session.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Single-slot deferred callback. The owner polls it with the current
/// time; an armed timer fires exactly once, after which it is disarmed.
#[derive(Debug, Default)]
pub struct OneShotTimer {
    next_id: u64,
    armed: Option<(TimerId, DateTime<Utc>)>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer `delay` after `now`, replacing whatever was armed.
    /// A deadline past the representable range never fires.
    pub fn schedule(&mut self, now: DateTime<Utc>, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        if let Some((previous, _)) = self.armed {
            debug!(?previous, "replacing armed timer");
        }
        let deadline = now.checked_add_signed(delay).unwrap_or_else(|| {
            warn!(?delay, "timer deadline out of range; it will not fire");
            DateTime::<Utc>::MAX_UTC
        });
        self.armed = Some((id, deadline));
        id
    }

    /// Returns whether `id` was still armed. Canceling a fired, replaced,
    /// or already-canceled timer does nothing.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.armed {
            Some((armed, _)) if armed == id => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.armed.map(|(_, deadline)| deadline)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline()
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<TimerId> {
        let (id, deadline) = self.armed?;
        if now < deadline {
            return None;
        }
        self.armed = None;
        debug!(?id, "timer fired");
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Clock, ManualClock, OneShotTimer};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid start")
    }

    #[test]
    fn fires_once_at_deadline() {
        let clock = ManualClock::new(start());
        let mut timer = OneShotTimer::new();
        let id = timer.schedule(clock.now(), Duration::seconds(10));

        clock.advance(Duration::seconds(9));
        assert_eq!(timer.poll(clock.now()), None);
        assert_eq!(timer.remaining(clock.now()), Some(Duration::seconds(1)));

        clock.advance(Duration::seconds(1));
        assert_eq!(timer.poll(clock.now()), Some(id));
        assert_eq!(timer.poll(clock.now()), None);
        assert!(!timer.is_armed());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut timer = OneShotTimer::new();
        let id = timer.schedule(start(), Duration::seconds(10));

        assert!(timer.cancel(id));
        assert!(!timer.cancel(id));
        assert_eq!(timer.poll(start() + Duration::seconds(60)), None);
    }

    #[test]
    fn stale_handle_does_not_cancel_replacement() {
        let mut timer = OneShotTimer::new();
        let first = timer.schedule(start(), Duration::seconds(10));
        let second = timer.schedule(start(), Duration::seconds(10));

        assert!(!timer.cancel(first));
        assert!(timer.is_armed());
        assert_eq!(timer.poll(start() + Duration::seconds(10)), Some(second));
    }

    #[test]
    fn out_of_range_delay_never_fires() {
        let mut timer = OneShotTimer::new();
        let id = timer.schedule(start(), Duration::MAX);

        assert!(timer.is_armed());
        assert_eq!(timer.poll(start() + Duration::days(365 * 1000)), None);
        assert!(timer.cancel(id));
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new(start());
        let handle = clock.clone();
        handle.advance(Duration::days(2));
        assert_eq!(clock.now(), start() + Duration::days(2));
    }
}
