//! Execution contexts that own display targets.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::ports::{ContextJob, ExecutionContext};

/// Context that queues jobs for a `MainLoop` to run.
pub struct ChannelContext {
    tx: mpsc::UnboundedSender<ContextJob>,
}

impl ChannelContext {
    /// Creates a context and the loop that drains it.
    #[must_use]
    pub fn new() -> (Arc<Self>, MainLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), MainLoop { rx })
    }
}

impl ExecutionContext for ChannelContext {
    fn post(&self, job: ContextJob) {
        if self.tx.send(job).is_err() {
            trace!("Main loop is gone, dropping job");
        }
    }
}

/// Receiving side of a `ChannelContext`. Whoever runs it is the owning thread.
pub struct MainLoop {
    rx: mpsc::UnboundedReceiver<ContextJob>,
}

impl MainLoop {
    /// Runs every job queued so far without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits for the next job and runs it.
    ///
    /// Returns false once every context handle has been dropped.
    pub async fn turn(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

/// Context that runs jobs on the posting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
    fn post(&self, job: ContextJob) {
        job();
    }
}
