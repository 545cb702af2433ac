//! Engine counters surfaced by STATS.
//!
//! Plain fields, no atomics: the host serializes whole handler invocations,
//! so the counters are only ever touched under that lock.

/// Point-in-time engine counters.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Engine clock, a wall-clock second refreshed by the host's cron task.
    pub time: u64,
    /// Second the engine was constructed.
    pub started: u64,
    /// Live indexed items.
    pub nitems: u64,
    /// Live items stored in compressed form.
    pub ncompressed: u64,
    /// Currently connected clients.
    pub nclients: u64,
    /// Total accepted connections.
    pub connections: u64,
    /// Total dispatched requests.
    pub requests: u64,
    /// Completed cron ticks.
    pub crondone: u64,
    /// Second of the first insert, 0 before any.
    pub firstin: u64,
    /// Second of the most recent insert.
    pub lastin: u64,
    /// Bytes charged to live items and keys.
    pub memused: u64,
    /// High-water memused.
    pub mempeak: u64,
    /// Pairwise-average item size in bytes.
    pub sizeavg: u64,
    /// Pairwise-average compression saving, percent.
    pub compravg: u64,
}

impl EngineStats {
    /// Charges bytes against the memory budget, tracking the peak.
    pub fn charge(&mut self, bytes: u64) {
        self.memused += bytes;
        if self.memused > self.mempeak {
            self.mempeak = self.memused;
        }
    }

    /// Releases previously charged bytes.
    pub fn discharge(&mut self, bytes: u64) {
        self.memused = self.memused.saturating_sub(bytes);
    }

    /// Pairwise running average: the first sample seeds, later samples are
    /// averaged against the current value.
    pub fn fold_avg(current: u64, sample: u64) -> u64 {
        if current == 0 {
            sample
        } else {
            (current + sample) / 2
        }
    }
}
