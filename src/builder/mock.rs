use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{BuildJob, BuildOutcome, ReportBuilder};

/// A scripted builder for tests. Returns pre-defined outcomes in order and
/// records every job it was asked to build.
pub struct MockBuilder {
    outcomes: Vec<BuildOutcome>,
    index: AtomicUsize,
    jobs: Mutex<Vec<BuildJob>>,
}

impl MockBuilder {
    pub fn new(outcomes: Vec<BuildOutcome>) -> Self {
        Self {
            outcomes,
            index: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Jobs received so far, in call order.
    pub fn jobs(&self) -> Vec<BuildJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportBuilder for MockBuilder {
    async fn build(&self, job: &BuildJob) -> BuildOutcome {
        self.jobs.lock().unwrap().push(job.clone());
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.outcomes.get(i).cloned().unwrap_or_else(|| {
            BuildOutcome::rejected(super::BuildError::Spawn(format!(
                "MockBuilder: no more outcomes (called {} times)",
                i + 1
            )))
        })
    }
}
