//! Pacing of the detection loop.

use std::{
    thread,
    time::{Duration, Instant},
};

/// Blocks the loop until the display can show the next frame.
///
/// This is the equivalent of an animation-frame request: the detection loop calls
/// [`FrameScheduler::next_frame`] exactly once between two cycles, on the loop's own thread.
pub trait FrameScheduler {
    fn next_frame(&mut self);
}

impl<S: FrameScheduler + ?Sized> FrameScheduler for Box<S> {
    fn next_frame(&mut self) {
        (**self).next_frame()
    }
}

/// A [`FrameScheduler`] that ticks at a fixed refresh rate.
///
/// Ticks lie on a grid of `1 / hz` intervals since the clock was created. When a cycle takes
/// longer than one interval, the missed ticks are skipped and the loop waits for the next one on
/// the grid.
#[derive(Debug, Clone)]
pub struct RefreshClock {
    epoch: Instant,
    interval: Duration,
    ticks: u64,
}

impl RefreshClock {
    /// Creates a clock ticking `hz` times per second.
    ///
    /// # Panics
    ///
    /// Panics if `hz` is not a positive, finite number.
    pub fn new(hz: f64) -> Self {
        assert!(
            hz.is_finite() && hz > 0.0,
            "refresh rate must be positive, got {hz}"
        );
        Self {
            epoch: Instant::now(),
            interval: Duration::from_secs_f64(1.0 / hz),
            ticks: 0,
        }
    }

    /// Returns the time between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the index of the tick the last [`FrameScheduler::next_frame`] call woke up at.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn tick_time(&self, tick: u64) -> Instant {
        self.epoch + self.interval.mul_f64(tick as f64)
    }
}

impl FrameScheduler for RefreshClock {
    fn next_frame(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.epoch);
        // First tick strictly in the future that is also after the previous one.
        let due = (elapsed.as_secs_f64() / self.interval.as_secs_f64()).floor() as u64 + 1;
        let skipped = due.saturating_sub(self.ticks + 1);
        if skipped > 0 {
            log::trace!("refresh clock skipped {skipped} ticks");
        }
        self.ticks = due.max(self.ticks + 1);

        let deadline = self.tick_time(self.ticks);
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_ticks() {
        let mut clock = RefreshClock::new(200.0);
        let start = Instant::now();
        for _ in 0..4 {
            clock.next_frame();
        }
        assert!(start.elapsed() >= clock.interval() * 3);
        assert!(clock.ticks() >= 4);
    }

    #[test]
    fn skips_missed_ticks() {
        let mut clock = RefreshClock::new(1000.0);
        thread::sleep(Duration::from_millis(20));
        clock.next_frame();
        assert!(clock.ticks() >= 20, "{}", clock.ticks());

        let before = clock.ticks();
        clock.next_frame();
        assert!(clock.ticks() > before);
    }

    #[test]
    #[should_panic]
    fn rejects_zero_rate() {
        RefreshClock::new(0.0);
    }
}
