//! Refresh countdown state machine
//!
//! Driven by a one second tick. The countdown runs from the period down to 0; on
//! reaching 0 the tick reports `Expired` and the countdown restarts at the full period,
//! so a slow batch never stalls the next cycle. Outstanding batches put the scheduler
//! in `Refreshing` until they all finish.

/// Countdown at or below which the display turns urgent
pub const URGENT_SECS: u32 = 5;

/// Scheduler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Counting,
    Refreshing,
}

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Countdown decremented, no refresh due
    Counting { remaining: u32 },
    /// Countdown hit 0 and was reset; a refresh cycle is due
    Expired,
}

/// Countdown and batch bookkeeping
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    period: u32,
    countdown: u32,
    batches_in_flight: usize,
}

impl RefreshScheduler {
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        Self {
            period,
            countdown: period,
            batches_in_flight: 0,
        }
    }

    /// Advance one second
    pub fn tick(&mut self) -> Tick {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.countdown = self.period;
            Tick::Expired
        } else {
            Tick::Counting {
                remaining: self.countdown,
            }
        }
    }

    /// Record a refresh batch being issued
    pub fn begin_batch(&mut self) {
        self.batches_in_flight += 1;
    }

    /// Record a refresh batch finishing. True once no batch is outstanding.
    pub fn finish_batch(&mut self) -> bool {
        self.batches_in_flight = self.batches_in_flight.saturating_sub(1);
        self.batches_in_flight == 0
    }

    pub fn phase(&self) -> Phase {
        if self.batches_in_flight > 0 {
            Phase::Refreshing
        } else {
            Phase::Counting
        }
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// `period * (1 - countdown / period)`, the elapsed share scaled to the period
    pub fn progress(&self) -> f64 {
        self.period as f64 * self.fraction()
    }

    /// Elapsed share of the current cycle in [0, 1)
    pub fn fraction(&self) -> f64 {
        1.0 - self.countdown as f64 / self.period as f64
    }

    pub fn is_urgent(&self) -> bool {
        self.countdown <= URGENT_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle_expires_once() {
        let mut scheduler = RefreshScheduler::new(30);
        assert_eq!(scheduler.countdown(), 30);

        let mut expired = 0;
        for i in 1..=30 {
            match scheduler.tick() {
                Tick::Expired => expired += 1,
                Tick::Counting { remaining } => assert_eq!(remaining, 30 - i),
            }
        }

        assert_eq!(expired, 1);
        assert_eq!(scheduler.countdown(), 30);
    }

    #[test]
    fn test_expires_on_thirtieth_tick() {
        let mut scheduler = RefreshScheduler::new(30);
        for _ in 0..29 {
            assert!(matches!(scheduler.tick(), Tick::Counting { .. }));
        }
        assert_eq!(scheduler.countdown(), 1);
        assert_eq!(scheduler.tick(), Tick::Expired);
    }

    #[test]
    fn test_progress_and_urgency() {
        let mut scheduler = RefreshScheduler::new(30);
        assert_eq!(scheduler.progress(), 0.0);
        assert!(!scheduler.is_urgent());

        for _ in 0..15 {
            scheduler.tick();
        }
        assert!((scheduler.progress() - 15.0).abs() < 1e-9);
        assert!((scheduler.fraction() - 0.5).abs() < 1e-9);

        for _ in 0..10 {
            scheduler.tick();
        }
        assert_eq!(scheduler.countdown(), 5);
        assert!(scheduler.is_urgent());
    }

    #[test]
    fn test_batch_phase() {
        let mut scheduler = RefreshScheduler::new(30);
        assert_eq!(scheduler.phase(), Phase::Counting);

        scheduler.begin_batch();
        scheduler.begin_batch();
        assert_eq!(scheduler.phase(), Phase::Refreshing);

        assert!(!scheduler.finish_batch());
        assert!(scheduler.finish_batch());
        assert_eq!(scheduler.phase(), Phase::Counting);

        // Spurious finish never underflows
        assert!(scheduler.finish_batch());
    }

    #[test]
    fn test_period_of_one_expires_every_tick() {
        let mut scheduler = RefreshScheduler::new(1);
        assert_eq!(scheduler.tick(), Tick::Expired);
        assert_eq!(scheduler.tick(), Tick::Expired);
        assert_eq!(scheduler.countdown(), 1);
    }
}
