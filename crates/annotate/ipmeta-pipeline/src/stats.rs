//! Pipeline counters, shared across stages via atomics.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the reader and writer.
#[derive(Debug)]
pub struct PipelineStats {
    records_read: AtomicU64,
    records_written: AtomicU64,
    started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            records_read: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Snapshot the counters, stamping the finish time.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_read: self.records_read(),
            records_written: self.records_written(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Final counters returned from a pipeline run.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub records_read: u64,
    pub records_written: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StatsSnapshot {
    /// Wall-clock duration of the run in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_read();
        stats.record_read();
        stats.record_written();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_read, 2);
        assert_eq!(snapshot.records_written, 1);
        assert!(snapshot.finished_at >= snapshot.started_at);
    }
}
