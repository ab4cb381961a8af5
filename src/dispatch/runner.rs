use crate::commands::CommandOutput;
use crate::commands::builtins::CancelFn;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a command body run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(anyhow::Result<CommandOutput>),
    TimedOut,
    Cancelled,
}

/// Tracks the cancellation token of every running recorded job and races
/// bodies against their deadline.
#[derive(Debug, Default)]
pub struct JobRunner {
    state: Mutex<RunnerState>,
}

#[derive(Debug, Default)]
struct RunnerState {
    running: HashMap<u64, CancellationToken>,
    /// Cancels that arrived before the job registered; applied on registration.
    pending: HashSet<u64>,
}

struct Registration<'a> {
    runner: &'a JobRunner,
    job_id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.runner.lock().running.remove(&self.job_id);
    }
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` with a fresh cancellation token. When `job_id` is set the
    /// token is reachable through [`JobRunner::cancel`] until the run ends.
    /// The token is always cancelled once the run is over so anything the
    /// body spawned stops too.
    pub async fn run<F, Fut>(&self, job_id: Option<u64>, timeout: Duration, body: F) -> RunOutcome
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<CommandOutput>>,
    {
        let token = CancellationToken::new();
        let _registration = job_id.map(|id| self.register(id, token.clone()));
        if token.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let body = body(token.clone());
        let outcome = tokio::select! {
            biased;
            result = body => match result {
                // The body gave up because it saw the cancellation.
                Err(_) if token.is_cancelled() => RunOutcome::Cancelled,
                result => RunOutcome::Completed(result),
            },
            () = token.cancelled() => RunOutcome::Cancelled,
            () = tokio::time::sleep(timeout) => RunOutcome::TimedOut,
        };
        token.cancel();
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, job_id: u64, token: CancellationToken) -> Registration<'_> {
        let mut state = self.lock();
        if state.pending.remove(&job_id) {
            tracing::info!(job_id, "applying cancellation issued before start");
            token.cancel();
        }
        state.running.insert(job_id, token);
        Registration {
            runner: self,
            job_id,
        }
    }

    /// Cancel job `job_id`. Returns whether a running job was signalled.
    /// A job that has not registered yet is cancelled as soon as its run
    /// starts, so callers must only pass ids of jobs the ledger still shows
    /// as running.
    pub fn cancel(&self, job_id: u64) -> bool {
        let mut state = self.lock();
        if let Some(token) = state.running.get(&job_id) {
            token.cancel();
            tracing::info!(job_id, "job cancelled");
            return true;
        }
        tracing::debug!(job_id, "cancel for a job that has not started");
        state.pending.insert(job_id);
        false
    }

    pub fn is_running(&self, job_id: u64) -> bool {
        self.lock().running.contains_key(&job_id)
    }

    /// Ids of the running recorded jobs, ascending.
    pub fn running(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.lock().running.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// [`JobRunner::cancel`] as a shareable signal function.
    pub fn cancel_fn(self: &Arc<Self>) -> CancelFn {
        let runner = Arc::clone(self);
        Arc::new(move |job_id| {
            runner.cancel(job_id);
        })
    }
}
