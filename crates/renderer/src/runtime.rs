use std::time::{Duration, Instant};

use crate::types::BeatTiming;

/// Lifecycle of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPhase {
    /// Window, GPU, and program are being created.
    #[default]
    Init,
    /// Frames are being produced.
    Running,
    /// Close was requested; no further frames are drawn.
    Terminated,
}

impl LoopPhase {
    pub fn is_running(self) -> bool {
        self == LoopPhase::Running
    }
}

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds since the demo started.
    pub seconds: f32,
    /// Tracker row at `seconds`, fractional part included.
    pub row: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, row: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            row,
            frame_index,
        }
    }
}

/// Where frame times come from.
pub trait TimeSource {
    fn sample(&mut self) -> TimeSample;
}

/// Wall-clock demo timeline: elapsed time, tracker rows, and the optional run
/// length.
#[derive(Debug, Clone)]
pub struct Timeline {
    origin: Instant,
    row_rate: f64,
    duration: Option<Duration>,
    frame: u64,
}

impl Timeline {
    pub fn new(timing: BeatTiming, duration: Option<Duration>) -> Self {
        Self::starting_at(Instant::now(), timing, duration)
    }

    pub fn starting_at(origin: Instant, timing: BeatTiming, duration: Option<Duration>) -> Self {
        Self {
            origin,
            row_rate: timing.row_rate(),
            duration,
            frame: 0,
        }
    }

    /// Tracker row reached after `seconds`.
    pub fn row_at(&self, seconds: f64) -> f64 {
        seconds.max(0.0) * self.row_rate
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.origin)
    }

    /// Whether the configured run length has passed at `now`.
    pub fn finished_at(&self, now: Instant) -> bool {
        self.duration
            .is_some_and(|limit| self.elapsed_at(now) >= limit)
    }

    pub fn finished(&self) -> bool {
        self.finished_at(Instant::now())
    }

    pub fn sample_at(&mut self, now: Instant) -> TimeSample {
        let seconds = self.elapsed_at(now).as_secs_f64();
        let sample = TimeSample::new(seconds as f32, self.row_at(seconds) as f32, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

impl TimeSource for Timeline {
    fn sample(&mut self) -> TimeSample {
        self.sample_at(Instant::now())
    }
}

/// Time source that always reports the same instant of the demo.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    seconds: f32,
    row_rate: f64,
}

impl FixedTimeSource {
    pub fn new(seconds: f32, timing: BeatTiming) -> Self {
        Self {
            seconds,
            row_rate: timing.row_rate(),
        }
    }
}

impl TimeSource for FixedTimeSource {
    fn sample(&mut self) -> TimeSample {
        let row = f64::from(self.seconds.max(0.0)) * self.row_rate;
        TimeSample::new(self.seconds, row as f32, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_advance_at_twenty_per_second_by_default() {
        let start = Instant::now();
        let mut timeline = Timeline::starting_at(start, BeatTiming::default(), None);
        let sample = timeline.sample_at(start + Duration::from_millis(1500));
        assert!((sample.seconds - 1.5).abs() < 1e-4);
        assert!((sample.row - 30.0).abs() < 1e-3);
        assert_eq!(sample.frame_index, 0);
        assert_eq!(timeline.sample_at(start).frame_index, 1);
    }

    #[test]
    fn custom_timing_changes_row_rate() {
        let timing = BeatTiming {
            bpm: 120.0,
            rows_per_beat: 4,
        };
        let timeline = Timeline::new(timing, None);
        assert!((timeline.row_at(2.0) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn duration_marks_timeline_finished() {
        let start = Instant::now();
        let timeline =
            Timeline::starting_at(start, BeatTiming::default(), Some(Duration::from_secs(2)));
        assert!(!timeline.finished_at(start + Duration::from_secs(1)));
        assert!(timeline.finished_at(start + Duration::from_secs(2)));
    }

    #[test]
    fn unbounded_timeline_never_finishes() {
        let start = Instant::now();
        let timeline = Timeline::starting_at(start, BeatTiming::default(), None);
        assert!(!timeline.finished_at(start + Duration::from_secs(3600)));
    }

    #[test]
    fn fixed_source_repeats_sample() {
        let mut source = FixedTimeSource::new(0.5, BeatTiming::default());
        let first = source.sample();
        assert_eq!(first, source.sample());
        assert!((first.row - 10.0).abs() < 1e-4);
    }

    #[test]
    fn loop_phase_starts_in_init() {
        assert_eq!(LoopPhase::default(), LoopPhase::Init);
        assert!(LoopPhase::Running.is_running());
        assert!(!LoopPhase::Terminated.is_running());
    }
}
