//! Store metrics for observability.
//!
//! Tracks buffer lifecycle and entry traffic for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

/// Store metrics container.
///
/// All counters are atomic so observers may read them concurrently with
/// the writer; values read while the writer is mid-operation are estimates.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Number of buffers allocated fresh.
    pub buffers_allocated: AtomicU64,
    /// Number of buffers reused from the free-id queue.
    pub buffers_reused: AtomicU64,
    /// Number of buffers released back to free.
    pub buffers_freed: AtomicU64,
    /// Number of whole buffers put on hold (compaction or full removal).
    pub buffers_held: AtomicU64,
    /// Number of arrays stored.
    pub entries_added: AtomicU64,
    /// Number of arrays logically removed.
    pub entries_removed: AtomicU64,
    /// Number of arrays rewritten by compaction.
    pub entries_moved: AtomicU64,
    /// Number of hold-list entries reclaimed by trimming.
    pub holds_trimmed: AtomicU64,
}

impl StoreMetrics {
    /// Creates a new metrics container.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_buffers_allocated(&self) {
        self.buffers_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffers_reused(&self) {
        self.buffers_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffers_freed(&self) {
        self.buffers_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffers_held(&self) {
        self.buffers_held.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_entries_added(&self) {
        self.entries_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_entries_removed(&self) {
        self.entries_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_entries_moved(&self) {
        self.entries_moved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_holds_trimmed(&self, count: u64) {
        self.holds_trimmed.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            buffers_reused: self.buffers_reused.load(Ordering::Relaxed),
            buffers_freed: self.buffers_freed.load(Ordering::Relaxed),
            buffers_held: self.buffers_held.load(Ordering::Relaxed),
            entries_added: self.entries_added.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            entries_moved: self.entries_moved.load(Ordering::Relaxed),
            holds_trimmed: self.holds_trimmed.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics to zero.
    pub fn reset(&self) {
        self.buffers_allocated.store(0, Ordering::Relaxed);
        self.buffers_reused.store(0, Ordering::Relaxed);
        self.buffers_freed.store(0, Ordering::Relaxed);
        self.buffers_held.store(0, Ordering::Relaxed);
        self.entries_added.store(0, Ordering::Relaxed);
        self.entries_removed.store(0, Ordering::Relaxed);
        self.entries_moved.store(0, Ordering::Relaxed);
        self.holds_trimmed.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of metrics values.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub buffers_allocated: u64,
    pub buffers_reused: u64,
    pub buffers_freed: u64,
    pub buffers_held: u64,
    pub entries_added: u64,
    pub entries_removed: u64,
    pub entries_moved: u64,
    pub holds_trimmed: u64,
}

impl MetricsSnapshot {
    /// Calculates the difference between two snapshots.
    pub fn diff(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            buffers_allocated: self.buffers_allocated.saturating_sub(other.buffers_allocated),
            buffers_reused: self.buffers_reused.saturating_sub(other.buffers_reused),
            buffers_freed: self.buffers_freed.saturating_sub(other.buffers_freed),
            buffers_held: self.buffers_held.saturating_sub(other.buffers_held),
            entries_added: self.entries_added.saturating_sub(other.entries_added),
            entries_removed: self.entries_removed.saturating_sub(other.entries_removed),
            entries_moved: self.entries_moved.saturating_sub(other.entries_moved),
            holds_trimmed: self.holds_trimmed.saturating_sub(other.holds_trimmed),
        }
    }

    /// Returns the buffer reuse rate (0.0 - 1.0).
    pub fn reuse_rate(&self) -> f64 {
        let total = self.buffers_allocated + self.buffers_reused;
        if total == 0 {
            0.0
        } else {
            self.buffers_reused as f64 / total as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store Metrics:")?;
        writeln!(f, "  Buffers allocated: {}", self.buffers_allocated)?;
        writeln!(
            f,
            "  Buffers reused:    {} ({:.1}%)",
            self.buffers_reused,
            self.reuse_rate() * 100.0
        )?;
        writeln!(f, "  Buffers freed:     {}", self.buffers_freed)?;
        writeln!(f, "  Buffers held:      {}", self.buffers_held)?;
        writeln!(f, "  Entries added:     {}", self.entries_added)?;
        writeln!(f, "  Entries removed:   {}", self.entries_removed)?;
        writeln!(f, "  Entries moved:     {}", self.entries_moved)?;
        writeln!(f, "  Holds trimmed:     {}", self.holds_trimmed)?;
        Ok(())
    }
}
