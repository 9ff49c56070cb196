//! Fixed-interval task scheduling driven by an explicit `tick(now)`.

/// Decides when a periodic task is due. The owner calls [`poll`] from its
/// own `tick`, so virtual time can be advanced deterministically in tests.
///
/// [`poll`]: IntervalScheduler::poll
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval_ms: u64,
    last_run: Option<u64>,
}

impl IntervalScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            last_run: None,
        }
    }

    /// Start counting from `now` without running.
    pub fn start(&mut self, now: u64) {
        self.last_run = Some(now);
    }

    /// True (and the run is recorded) if at least one interval has passed
    /// since the last run. Missed intervals collapse into a single run.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.last_run {
            Some(last) if now < last.saturating_add(self.interval_ms) => false,
            _ => {
                self.last_run = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_runs_when_not_started() {
        let mut s = IntervalScheduler::new(60_000);
        assert!(s.poll(0));
        assert!(!s.poll(59_999));
        assert!(s.poll(60_000));
    }

    #[test]
    fn started_scheduler_waits_a_full_interval() {
        let mut s = IntervalScheduler::new(60_000);
        s.start(1_000);
        assert!(!s.poll(30_000));
        assert!(s.poll(61_000));
    }

    #[test]
    fn missed_intervals_collapse() {
        let mut s = IntervalScheduler::new(10);
        s.start(0);
        assert!(s.poll(1_000));
        assert!(!s.poll(1_005));
    }
}
