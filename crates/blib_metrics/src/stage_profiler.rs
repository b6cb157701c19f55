//! Rolling timings for named frame stages.

use crate::ring_buffer::RingBuffer;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub struct StageProfiler {
    window: usize,
    stages: BTreeMap<&'static str, RingBuffer<Duration>>,
}

impl StageProfiler {
    /// Average each stage over the last `window` samples.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            stages: BTreeMap::new(),
        }
    }

    pub fn time<F, R>(&mut self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        let window = self.window;
        self.stages
            .entry(name)
            .or_insert_with(|| RingBuffer::new(window))
            .push(elapsed);
    }

    pub fn average(&self, name: &str) -> Duration {
        self.stages
            .get(name)
            .map(RingBuffer::<Duration>::average)
            .unwrap_or_default()
    }

    pub fn last(&self, name: &str) -> Duration {
        self.stages
            .get(name)
            .and_then(RingBuffer::latest)
            .unwrap_or_default()
    }

    /// `(stage, rolling average)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.stages.iter().map(|(name, buf)| (*name, buf.average()))
    }

    pub fn reset(&mut self) {
        self.stages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_stage() {
        let mut profiler = StageProfiler::new(2);
        profiler.record("Update1", Duration::from_millis(2));
        profiler.record("Update1", Duration::from_millis(4));
        profiler.record("Render", Duration::from_millis(8));
        assert_eq!(profiler.average("Update1"), Duration::from_millis(3));
        assert_eq!(profiler.last("Render"), Duration::from_millis(8));
        assert_eq!(profiler.average("FrameEnd"), Duration::ZERO);

        let value = profiler.time("Update2", || 7);
        assert_eq!(value, 7);
        assert_eq!(profiler.iter().count(), 3);
    }
}
