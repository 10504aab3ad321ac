use std::thread;
use std::time::{Duration, Instant};

/// How the render loop spaces its ticks in wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Sleep for the remainder of each tick.
    #[default]
    RealTime,
    /// Emit frames as fast as the sink accepts them.
    Unpaced,
}

/// Frame-slot scheduler for a fixed frame period.
#[derive(Debug, Clone)]
pub struct FrameClock {
    period: Duration,
    pacing: Pacing,
    deadline: Option<Instant>,
    resyncs: u64,
}

impl FrameClock {
    pub fn new(fps: u32, pacing: Pacing) -> Self {
        Self {
            period: frame_period(fps),
            pacing,
            deadline: None,
            resyncs: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Times the clock fell more than two periods behind and restarted from now.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Blocks until the next frame slot.
    ///
    /// The first call anchors the schedule at the current instant and returns
    /// at once; every later call waits one period past the previous slot, so
    /// consecutive loops share one cadence.
    pub fn wait_for_slot(&mut self) {
        if self.pacing == Pacing::Unpaced {
            return;
        }
        let Some(deadline) = self.deadline.as_mut() else {
            self.deadline = Some(Instant::now());
            return;
        };
        *deadline += self.period;

        let now = Instant::now();
        if now < *deadline {
            thread::sleep(*deadline - now);
        }

        let now = Instant::now();
        if now.duration_since(*deadline) > self.period.saturating_mul(2) {
            tracing::debug!(
                behind_ms = now.duration_since(*deadline).as_millis() as u64,
                "frame clock fell behind, resynchronising"
            );
            *deadline = now;
            self.resyncs += 1;
        }
    }
}

pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

/// Frames in an idle interval, truncated once for the whole interval.
pub fn idle_frame_count(duration: Duration, fps: u32) -> u64 {
    (duration.as_secs_f64() * f64::from(fps)).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_frames_truncate_once() {
        assert_eq!(idle_frame_count(Duration::from_secs(2), 10), 20);
        assert_eq!(idle_frame_count(Duration::from_millis(2050), 10), 20);
        assert_eq!(idle_frame_count(Duration::from_millis(250), 30), 7);
        assert_eq!(idle_frame_count(Duration::ZERO, 30), 0);
    }

    #[test]
    fn unpaced_clock_never_sleeps() {
        let mut clock = FrameClock::new(1, Pacing::Unpaced);
        let start = Instant::now();
        for _ in 0..100 {
            clock.wait_for_slot();
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn first_slot_is_immediate_and_later_slots_are_spaced() {
        let mut clock = FrameClock::new(100, Pacing::RealTime);
        let start = Instant::now();
        clock.wait_for_slot();
        assert!(start.elapsed() < Duration::from_millis(10));
        for _ in 0..5 {
            clock.wait_for_slot();
        }
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn stalled_clock_resyncs_instead_of_bursting() {
        let mut clock = FrameClock::new(200, Pacing::RealTime);
        clock.wait_for_slot();
        thread::sleep(Duration::from_millis(40));
        clock.wait_for_slot();
        assert_eq!(clock.resyncs(), 1);

        let start = Instant::now();
        clock.wait_for_slot();
        assert!(start.elapsed() >= Duration::from_millis(4));
    }
}
