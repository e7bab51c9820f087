//! Worker registry and initialization.
//!
//! Each frosty worker is spawned onto its own tokio task and tracked by a
//! [`WorkerHandle`] that owns the worker's cancellation token and join handle.
//!
//! The [`WorkerRegistry`] keeps the handles in spawn order and tags each one
//! with a [`WorkerRole`] so the supervisor can stop producers before the
//! consumer that drains the alert queue.

pub mod eve_pipeline;
pub mod ruleset;

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use frosty_core::worker::{Worker, WorkerExit};

/// Position of a worker in the stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    /// Produces work for others (tailer) or works alone (ruleset). Stopped first.
    Producer,
    /// Drains what producers left behind (notifier). Stopped last.
    Consumer,
}

/// How a worker ended, as observed by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker returned on its own or after a stop request.
    Exited(WorkerExit),
    /// The worker task panicked or was cancelled by the runtime.
    Crashed(String),
    /// The worker ignored the stop request and was aborted.
    TimedOut,
}

impl StopOutcome {
    /// Whether the worker ended through its own `run` returning.
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Exited(_))
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(exit) => write!(f, "{exit}"),
            Self::Crashed(reason) => write!(f, "crashed: {reason}"),
            Self::TimedOut => write!(f, "did not stop in time, aborted"),
        }
    }
}

/// A spawned worker.
pub struct WorkerHandle {
    name: &'static str,
    role: WorkerRole,
    cancel: CancellationToken,
    task: Option<JoinHandle<WorkerExit>>,
    outcome: Option<StopOutcome>,
}

impl WorkerHandle {
    /// Spawn `worker` onto a new task with its own cancellation token.
    pub fn spawn<W: Worker>(worker: W, role: WorkerRole) -> Self {
        let name = worker.name();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));
        tracing::info!(worker = name, ?role, "worker started");
        Self {
            name,
            role,
            cancel,
            task: Some(task),
            outcome: None,
        }
    }

    /// Worker name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Worker role.
    pub fn role(&self) -> WorkerRole {
        self.role
    }

    /// Whether the worker task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Ask the worker to stop. Does not wait.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Wait up to `timeout` for the worker to end; abort it if it does not.
    ///
    /// The outcome is remembered, so repeated calls return the same value.
    pub async fn join(&mut self, timeout: Duration) -> StopOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.task.take() {
            None => StopOutcome::Crashed("worker task missing".to_owned()),
            Some(mut task) => match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(exit)) => StopOutcome::Exited(exit),
                Ok(Err(e)) => StopOutcome::Crashed(e.to_string()),
                Err(_) => {
                    task.abort();
                    StopOutcome::TimedOut
                }
            },
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

/// Registry of running workers, in spawn order.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<WorkerHandle>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and register a worker.
    pub fn spawn<W: Worker>(&mut self, worker: W, role: WorkerRole) {
        self.workers.push(WorkerHandle::spawn(worker, role));
    }

    /// Name of the first registered worker whose task has ended.
    pub fn first_finished(&self) -> Option<&'static str> {
        self.workers.iter().find(|w| w.is_finished()).map(WorkerHandle::name)
    }

    /// Number of workers whose tasks are still running.
    pub fn running_count(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Number of registered workers.
    pub fn count(&self) -> usize {
        self.workers.len()
    }

    /// Mutable access to the handles with the given role, in spawn order.
    pub fn with_role(&mut self, role: WorkerRole) -> impl Iterator<Item = &mut WorkerHandle> {
        self.workers.iter_mut().filter(move |w| w.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    impl Worker for Idle {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn run(self, cancel: CancellationToken) -> WorkerExit {
            cancel.cancelled().await;
            WorkerExit::Requested
        }
    }

    struct Stubborn;

    impl Worker for Stubborn {
        fn name(&self) -> &'static str {
            "stubborn"
        }

        async fn run(self, _cancel: CancellationToken) -> WorkerExit {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            WorkerExit::Requested
        }
    }

    #[tokio::test]
    async fn stop_request_is_honoured() {
        let mut handle = WorkerHandle::spawn(Idle, WorkerRole::Producer);
        assert!(!handle.is_finished());

        handle.request_stop();
        let outcome = handle.join(Duration::from_secs(5)).await;
        assert_eq!(outcome, StopOutcome::Exited(WorkerExit::Requested));
        assert!(handle.is_finished());
        assert_eq!(handle.join(Duration::from_secs(5)).await, outcome);
    }

    #[tokio::test]
    async fn stuck_worker_is_aborted() {
        let mut handle = WorkerHandle::spawn(Stubborn, WorkerRole::Consumer);
        handle.request_stop();
        let outcome = handle.join(Duration::from_millis(50)).await;
        assert_eq!(outcome, StopOutcome::TimedOut);
        assert!(!outcome.is_joined());
    }

    #[tokio::test]
    async fn registry_filters_by_role() {
        let mut registry = WorkerRegistry::new();
        registry.spawn(Idle, WorkerRole::Producer);
        registry.spawn(Stubborn, WorkerRole::Consumer);

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.running_count(), 2);
        assert!(registry.first_finished().is_none());
        let names: Vec<_> = registry.with_role(WorkerRole::Consumer).map(|w| w.name()).collect();
        assert_eq!(names, vec!["stubborn"]);

        for worker in registry.with_role(WorkerRole::Producer) {
            worker.request_stop();
            worker.join(Duration::from_secs(5)).await;
        }
        assert_eq!(registry.first_finished(), Some("idle"));
    }
}
