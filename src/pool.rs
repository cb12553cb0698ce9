//! Worker-pool glue for the tiered cache's asynchronous L2 writes (spec.md
//! §4.5: "schedule an L2 put on the pool if present"). Backed by tokio's
//! blocking-task pool -- the same pool the connection loop already
//! unloads dispatch work onto (server.rs) -- so there is one bounded pool
//! for every blocking suspension point in §5, not a second hand-rolled one.

use crate::cache::TaskSpawner;
use tokio::runtime::Handle;

/// Dispatches a cache backend's L2 `put` onto `tokio::task::spawn_blocking`.
/// `TieredCache::put` already copies the key and entry before calling
/// `spawn` (spec.md §9 "never capture caller-owned buffers by reference"),
/// so the closure here owns everything it touches.
pub struct TokioBlockingSpawner {
    handle: Handle,
}

impl TokioBlockingSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl TaskSpawner for TokioBlockingSpawner {
    fn spawn(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), ()> {
        self.handle.spawn_blocking(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawn_runs_job_on_the_blocking_pool() {
        let spawner = TokioBlockingSpawner::new(Handle::current());
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        spawner.spawn(Box::new(move || ran2.store(true, Ordering::SeqCst))).unwrap();
        // give the blocking task a chance to run
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
