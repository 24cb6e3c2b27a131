use std::fmt;

use crate::queue::TriageQueue;
use crate::session::Counters;

/// Snapshot of a session's progress, rebuilt from live state on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total: usize,
    pub remaining: usize,
    pub seen: usize,
    pub discarded: usize,
    pub kept: usize,
}

impl SessionStats {
    pub fn compute(queue: &TriageQueue, counters: &Counters) -> Self {
        Self {
            total: queue.total(),
            remaining: queue.remaining(),
            seen: queue.seen(),
            discarded: counters.discarded,
            kept: counters.kept,
        }
    }

    pub fn percent_seen(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.seen as f64 / self.total as f64 * 100.0
    }

    pub fn percent_discarded_of_seen(&self) -> f64 {
        self.discarded as f64 / self.seen.max(1) as f64 * 100.0
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Left: {} | Discarded: {} | Kept: {} | Seen: {:.1}% | Discarded/Seen: {:.1}%",
            self.total,
            self.remaining,
            self.discarded,
            self.kept,
            self.percent_seen(),
            self.percent_discarded_of_seen()
        )
    }
}
