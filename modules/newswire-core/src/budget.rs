use std::time::{Duration, Instant};

/// Tracks the remaining wall-clock allowance for the LLM phase of one
/// search (§4.6's "per-search total LLM budget"). Read-only after
/// construction: the budget is wall-clock, so "consuming" it just means
/// time passing — no shared mutable counter is needed across the
/// concurrently-dispatched extraction tasks.
#[derive(Clone, Copy)]
pub struct LlmBudget {
    total: Duration,
    started_at: Instant,
}

impl LlmBudget {
    pub fn new(total: Duration) -> Self {
        Self {
            total,
            started_at: Instant::now(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started_at.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Duration::ZERO
    }
}
