use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single cancellation handle threaded through every suspension point of
/// one search (§9: "model as a single context/handle carried through every
/// call; never re-read from a global"). Cloning shares the same underlying
/// flag; setting it from any clone is visible to all.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled; polls rather than blocking,
    /// matching §5's "poll sites (non-blocking)" suspension point.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }
}
