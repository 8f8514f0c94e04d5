//! Paces the machine against wall-clock time.
//!
//! The core itself never waits: it is advanced by whatever drives it. The
//! `FrameClock` is that driver for the binaries, turning a tokio interval
//! into a stream of per-frame deltas in milliseconds.

use crate::config::FrameResolution;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::trace;

/// Yields the elapsed time between rendered frames.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct FrameClock {
    interval: Interval,
    last: Instant,
    frames: u64,
}

impl FrameClock {
    pub fn new(resolution: &FrameResolution) -> Self {
        let mut interval = time::interval(resolution.frame_period());
        // A stalled frame is not made up for with a burst of short ones.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            last: Instant::now(),
            frames: 0,
        }
    }

    /// Waits for the next frame and returns the milliseconds since the
    /// previous one. The first frame fires immediately.
    pub async fn next_frame(&mut self) -> f64 {
        self.interval.tick().await;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        self.frames += 1;
        trace!(frame = self.frames, ?elapsed, "frame");
        elapsed.as_secs_f64() * 1e3
    }

    /// Frames produced so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn frames_follow_the_resolution() {
        let mut clock = FrameClock::new(&FrameResolution::Low);
        let first = clock.next_frame().await;
        assert!(first < 1.0);

        for _ in 0..3 {
            let delta = clock.next_frame().await;
            assert!((delta - 100.0).abs() < 1e-6, "unexpected delta {delta}");
        }
        assert_eq!(clock.frames(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn a_stalled_frame_reports_the_whole_gap() {
        let mut clock = FrameClock::new(&FrameResolution::Low);
        clock.next_frame().await;
        time::sleep(std::time::Duration::from_millis(250)).await;
        let delta = clock.next_frame().await;
        assert!((delta - 250.0).abs() < 1e-6, "unexpected delta {delta}");
    }
}
