//! Named counters for per-frame statistics.

use std::collections::BTreeMap;

/// Counters keyed by static names; iteration is in name order so logged
/// summaries are stable from frame to frame.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    counters: BTreeMap<&'static str, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, value: u64) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    pub fn set(&mut self, name: &'static str, value: u64) {
        self.counters.insert(name, value);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Zero every counter, keeping the names.
    pub fn reset_all(&mut self) {
        self.counters.values_mut().for_each(|v| *v = 0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().map(|(k, v)| (*k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_and_reset() {
        let mut counter = Counter::new();
        counter.add("slots", 3);
        counter.add("slots", 2);
        counter.set("bytes", 64);
        assert_eq!(counter.get("slots"), 5);
        assert_eq!(counter.get("missing"), 0);

        counter.reset_all();
        let names: Vec<_> = counter.iter().collect();
        assert_eq!(names, vec![("bytes", 0), ("slots", 0)]);
    }
}
