//! Frame timing, per-stage profiling and named counters.
//!
//! Everything here is compiled in only with the `metrics` feature. Without
//! it the same types exist as zero-sized stubs, so call sites need no
//! `cfg` of their own.
//!
//! ```ignore
//! use blib_metrics::{FrameTimer, StageProfiler};
//!
//! let mut timer = FrameTimer::new(120);
//! let mut stages = StageProfiler::new(120);
//! timer.begin();
//! stages.time("Update1", || run_update());
//! timer.end();
//! tracing::info!(fps = timer.fps());
//! ```

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod frame_timer;
#[cfg(feature = "metrics")]
mod ring_buffer;
#[cfg(feature = "metrics")]
mod stage_profiler;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use frame_timer::FrameTimer;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;
#[cfg(feature = "metrics")]
pub use stage_profiler::StageProfiler;

/// Compile the enclosed statements only when the calling crate enables
/// its `metrics` feature.
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

/// Time a block under a stage name.
#[macro_export]
macro_rules! time_scope {
    ($profiler:expr, $name:expr, $body:block) => {{
        #[cfg(feature = "metrics")]
        let result = $profiler.time($name, || $body);
        #[cfg(not(feature = "metrics"))]
        let result = $body;
        result
    }};
}

// ----------------------------------------------------------------------------
// Stubs
// ----------------------------------------------------------------------------

#[cfg(not(feature = "metrics"))]
mod stubs {
    use std::time::Duration;

    #[derive(Default)]
    pub struct FrameTimer;

    impl FrameTimer {
        pub fn new(_capacity: usize) -> Self { Self }
        pub fn begin(&mut self) {}
        pub fn end(&mut self) {}
        pub fn frames(&self) -> u64 { 0 }
        pub fn fps(&self) -> f64 { 0.0 }
        pub fn frame_time_ms(&self) -> f64 { 0.0 }
        pub fn frame_time_range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
    }

    pub struct RingBuffer<T>(std::marker::PhantomData<T>);

    impl<T> RingBuffer<T> {
        pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
        pub fn push(&mut self, _sample: T) {}
        pub fn len(&self) -> usize { 0 }
        pub fn is_empty(&self) -> bool { true }
    }

    #[derive(Default, Clone, Debug)]
    pub struct Counter;

    impl Counter {
        pub fn new() -> Self { Self }
        pub fn add(&mut self, _name: &'static str, _value: u64) {}
        pub fn set(&mut self, _name: &'static str, _value: u64) {}
        pub fn get(&self, _name: &str) -> u64 { 0 }
        pub fn reset_all(&mut self) {}
        pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ { std::iter::empty() }
    }

    pub struct StageProfiler;

    impl StageProfiler {
        pub fn new(_window: usize) -> Self { Self }
        pub fn time<F, R>(&mut self, _name: &'static str, f: F) -> R where F: FnOnce() -> R { f() }
        pub fn record(&mut self, _name: &'static str, _elapsed: Duration) {}
        pub fn average(&self, _name: &str) -> Duration { Duration::ZERO }
        pub fn last(&self, _name: &str) -> Duration { Duration::ZERO }
        pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ { std::iter::empty() }
        pub fn reset(&mut self) {}
    }
}

#[cfg(not(feature = "metrics"))]
pub use stubs::{Counter, FrameTimer, RingBuffer, StageProfiler};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_surface_is_available_either_way() {
        let mut timer = FrameTimer::new(60);
        timer.begin();
        timer.end();
        let mut counter = Counter::new();
        counter.add("frames", 1);
        let mut profiler = StageProfiler::new(8);
        assert_eq!(profiler.time("stage", || 3), 3);
        let _ = RingBuffer::<f64>::new(4);
    }
}
