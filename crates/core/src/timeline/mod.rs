use std::time::{Duration, Instant};

/// Paces the poll loop at a fixed period.
///
/// Deadlines are scheduled from the previous deadline rather than from the
/// moment the tick finished, so a slow engine round-trip does not make the
/// loop drift. When the loop falls more than one period behind, the schedule
/// restarts from now instead of firing a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct TickClock {
    period: Duration,
    next_deadline: Option<Instant>,
    ticks: u64,
}

impl TickClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: None,
            ticks: 0,
        }
    }

    pub fn from_secs(seconds: f64) -> Self {
        Self::new(Duration::from_secs_f64(seconds.max(0.0)))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of completed waits.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Sleeps until the next deadline.
    pub fn wait(&mut self) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now + self.period);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_deadline = Some(self.schedule_after(deadline, Instant::now()));
        self.ticks += 1;
    }

    fn schedule_after(&self, deadline: Instant, now: Instant) -> Instant {
        let next = deadline + self.period;
        if next + self.period < now {
            now + self.period
        } else {
            next
        }
    }
}
