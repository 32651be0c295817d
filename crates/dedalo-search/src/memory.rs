//! Memory accounting for the search.
//!
//! Usage is the approximate byte count of live path indices and in-memory
//! reachability entries, not process RSS.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub path_bytes: usize,
    pub cache_bytes: usize,
    pub cached_paths: usize,
    pub spilled_paths: usize,
    pub frontier_paths: usize,
}

impl MemoryUsage {
    /// Bytes compared against the memory limit.
    pub fn total_bytes(&self) -> usize {
        self.path_bytes + self.cache_bytes
    }
}

/// Hook invoked with a usage sample before and after every round.
pub trait MemoryProfiler {
    fn sample(&mut self, round: usize, usage: &MemoryUsage);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProfiler;

impl MemoryProfiler for NoopProfiler {
    fn sample(&mut self, _round: usize, _usage: &MemoryUsage) {}
}

/// Logs every sample at debug level and remembers the peak.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProfiler {
    peak: usize,
}

impl TracingProfiler {
    pub fn peak_bytes(&self) -> usize {
        self.peak
    }
}

impl MemoryProfiler for TracingProfiler {
    fn sample(&mut self, round: usize, usage: &MemoryUsage) {
        self.peak = self.peak.max(usage.total_bytes());
        debug!(
            round,
            path_bytes = usage.path_bytes,
            cache_bytes = usage.cache_bytes,
            cached_paths = usage.cached_paths,
            spilled_paths = usage.spilled_paths,
            frontier_paths = usage.frontier_paths,
            peak_bytes = self.peak,
            "memory sample"
        );
    }
}

pub fn profiler(enabled: bool) -> Box<dyn MemoryProfiler> {
    if enabled {
        Box::new(TracingProfiler::default())
    } else {
        Box::new(NoopProfiler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracking() {
        let mut p = TracingProfiler::default();
        let mut usage = MemoryUsage {
            path_bytes: 100,
            cache_bytes: 50,
            ..MemoryUsage::default()
        };
        p.sample(1, &usage);
        usage.cache_bytes = 0;
        p.sample(2, &usage);
        assert_eq!(p.peak_bytes(), 150);
        assert_eq!(usage.total_bytes(), 100);
    }
}
