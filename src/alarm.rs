//! Stand-in for the platform's one-shot interval timer.
//!
//! The protocol loop only ever needs to arm a single pending timeout and
//! poll whether it has fired; it never needs a callback. A deadline compared
//! against the clock gives the same narrow contract without installing a
//! signal handler.

use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy)]
pub struct Alarm {
    deadline: Option<Instant>,
}

impl Alarm {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms the alarm for `duration` from now, returning the deadline it
    /// replaced. Callers that need to nest a shorter alarm inside a longer
    /// one (a `wait_for_ack` retransmit timer inside `listen`'s overall
    /// timeout) save that return value and hand it to [`Self::restore`]
    /// once the inner wait is done, so the outer deadline keeps running
    /// rather than being silently dropped.
    pub fn arm(&mut self, duration: Duration) -> Option<Instant> {
        std::mem::replace(&mut self.deadline, Some(Instant::now() + duration))
    }

    /// Puts back a deadline previously displaced by [`Self::arm`].
    pub fn restore(&mut self, prev: Option<Instant>) {
        self.deadline = prev;
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn fired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the alarm fires, or `Duration::ZERO` if it already
    /// has (or was never armed). Loops that poll a [`Transport`](crate::transport::Transport)
    /// with a timeout use this as that timeout, so the last poll of a loop
    /// wakes up exactly when the alarm does rather than one tick later.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_duration_elapses() {
        let mut alarm = Alarm::new();
        assert!(!alarm.fired());
        alarm.arm(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(alarm.fired());
    }

    #[test]
    fn disarm_clears_deadline() {
        let mut alarm = Alarm::new();
        alarm.arm(Duration::from_secs(10));
        alarm.disarm();
        assert!(!alarm.fired());
        assert!(!alarm.armed());
    }

    #[test]
    fn arm_returns_previous_deadline_for_restore() {
        let mut alarm = Alarm::new();
        assert_eq!(alarm.arm(Duration::from_secs(10)), None);

        let outer = alarm.arm(Duration::from_millis(1));
        assert!(outer.is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert!(alarm.fired());

        alarm.restore(outer);
        assert!(!alarm.fired());
    }
}
