//! Single-slot trailing-debounce timer driven by an external clock.

use std::time::Duration;

/// A timer with at most one pending deadline.
///
/// Scheduling again replaces the pending deadline (cancel-and-replace), so a
/// burst of triggers fires once, `delay` after the last one.
#[derive(Debug, Clone)]
pub struct PendingTimer {
    delay: Duration,
    deadline: Option<Duration>,
}

impl PendingTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer relative to `now`, replacing any pending deadline.
    pub fn schedule(&mut self, now: Duration) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Fires (and disarms) if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_fires_once_after_delay() {
        let mut timer = PendingTimer::new(ms(100));
        timer.schedule(ms(0));

        assert!(!timer.fire_if_due(ms(99)));
        assert!(timer.fire_if_due(ms(100)));
        assert!(!timer.fire_if_due(ms(200)));
        assert!(!timer.is_pending());
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let mut timer = PendingTimer::new(ms(300));
        timer.schedule(ms(0));
        timer.schedule(ms(200));

        assert!(!timer.fire_if_due(ms(300)));
        assert!(timer.fire_if_due(ms(500)));
    }

    #[test]
    fn test_cancel() {
        let mut timer = PendingTimer::new(ms(100));
        timer.schedule(ms(0));
        timer.cancel();
        assert!(!timer.fire_if_due(ms(1_000)));
    }
}
