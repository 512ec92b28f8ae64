//! Pipeline-wide counters. These are the only state every worker touches,
//! so all of it is atomic.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of pipeline throughput.
///
/// `queued` counts every arrival, so at quiescence
/// `queued == processed + dropped`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub queued: u64,
    pub processed: u64,
    pub dropped: u64,
    /// Tasks waiting in the queue right now
    pub queue_length: usize,
    pub queue_capacity: usize,
    /// `queue_length / queue_capacity`
    pub queue_utilization: f32,
    pub active_workers: usize,
    pub average_processing_ms: f64,
}

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    queued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    busy_nanos: AtomicU64,
    active_workers: AtomicUsize,
}

impl MetricsRecorder {
    pub fn record_arrival(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the processed count including this task.
    pub fn record_processed(&self, elapsed: Duration) -> u64 {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.busy_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn worker_busy(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_idle(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.queued.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.busy_nanos.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_length: usize, queue_capacity: usize) -> PipelineMetrics {
        let processed = self.processed.load(Ordering::Acquire);
        let busy_ms = self.busy_nanos.load(Ordering::Relaxed) as f64 / 1e6;
        PipelineMetrics {
            queued: self.queued.load(Ordering::Relaxed),
            processed,
            dropped: self.dropped.load(Ordering::Relaxed),
            queue_length,
            queue_capacity,
            queue_utilization: if queue_capacity == 0 {
                0.0
            } else {
                queue_length as f32 / queue_capacity as f32
            },
            active_workers: self.active_workers.load(Ordering::Relaxed),
            average_processing_ms: if processed == 0 {
                0.0
            } else {
                busy_ms / processed as f64
            },
        }
    }
}
