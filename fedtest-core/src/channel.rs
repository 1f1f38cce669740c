//! Result mailbox shared by the workers of one case.
//!
//! Many producers (one per role supervisor), one consumer (the orchestrator).
//! Arrival order carries no meaning; every [`RunResult`] names its role.

use fedtest_types::RunResult;
use tokio::sync::mpsc;

/// Producer half. Cheap to clone, one per worker.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::UnboundedSender<RunResult>,
}

impl ResultSender {
    /// Append a result without blocking.
    ///
    /// Returns false if the consumer is gone (the case has already finished).
    pub fn put(&self, result: RunResult) -> bool {
        self.tx.send(result).is_ok()
    }
}

/// Consumer half plus a sender to hand out.
#[derive(Debug)]
pub struct ResultChannel {
    tx: ResultSender,
    rx: mpsc::UnboundedReceiver<RunResult>,
}

impl ResultChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: ResultSender { tx },
            rx,
        }
    }

    /// A producer handle for one worker.
    pub fn sender(&self) -> ResultSender {
        self.tx.clone()
    }

    /// Append a result from the consumer side (e.g. a launch failure).
    pub fn put(&self, result: RunResult) -> bool {
        self.tx.put(result)
    }

    /// Take every result currently queued.
    ///
    /// Call only once all producers have finished or been terminated;
    /// results sent later stay queued for the next drain.
    pub fn drain(&mut self) -> Vec<RunResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            results.push(result);
        }
        results
    }
}

impl Default for ResultChannel {
    fn default() -> Self {
        Self::new()
    }
}
