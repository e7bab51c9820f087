//! Worker supervision -- liveness polling, ordered stop, last-resort notice.
//!
//! The [`Supervisor`] owns every [`WorkerHandle`](crate::modules::WorkerHandle).
//! It waits for whichever comes first:
//!
//! - a termination signal (the `shutdown` future handed to [`Supervisor::run`])
//! - a worker observed to have ended on a liveness poll
//!
//! and then runs one shutdown sequence:
//!
//! 1. request stop on producers (tailer, ruleset) and join each
//! 2. request stop on the consumer (notifier) so it drains the queue, and join it
//! 3. if the shutdown was not graceful, send one notice through the transport
//!
//! Every join is bounded by `stop_timeout`. A worker that overruns it is aborted
//! and the shutdown counts as not graceful.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::gauge;
use tokio::time::MissedTickBehavior;

use frosty_core::config::SupervisorConfig;
use frosty_core::metrics as m;
use frosty_eve_pipeline::{Notification, Transport};

use crate::modules::{StopOutcome, WorkerRegistry, WorkerRole};

/// What started the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A termination signal was received.
    Signal(&'static str),
    /// The named worker was found stopped by a liveness poll.
    WorkerStopped(&'static str),
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "received {signal}"),
            Self::WorkerStopped(worker) => write!(f, "worker '{worker}' stopped"),
        }
    }
}

/// Final state of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker name.
    pub name: &'static str,
    /// How it ended.
    pub outcome: StopOutcome,
}

/// Result of a shutdown sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    /// What started the shutdown.
    pub trigger: ShutdownTrigger,
    /// Every worker, in the order it was joined.
    pub workers: Vec<WorkerReport>,
    /// Whether the shutdown was graceful.
    pub graceful: bool,
    /// `Some(delivered)` when a last-resort notice was attempted.
    pub notice_delivered: Option<bool>,
}

impl SupervisorReport {
    /// Outcome of the named worker.
    pub fn outcome(&self, name: &str) -> Option<&StopOutcome> {
        self.workers.iter().find(|w| w.name == name).map(|w| &w.outcome)
    }
}

/// Worker supervisor.
pub struct Supervisor<T: Transport> {
    workers: WorkerRegistry,
    transport: Arc<T>,
    subject: String,
    poll_interval: Duration,
    stop_timeout: Duration,
    started: Instant,
    report: Option<SupervisorReport>,
}

impl<T: Transport> Supervisor<T> {
    /// Create a supervisor over already-spawned workers.
    ///
    /// `subject` prefixes the subject line of the last-resort notice.
    pub fn new(
        workers: WorkerRegistry,
        transport: Arc<T>,
        subject: impl Into<String>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            workers,
            transport,
            subject: subject.into(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            started: Instant::now(),
            report: None,
        }
    }

    /// Use a different bound for each worker join.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Wait for `shutdown` or the first stopped worker, then shut everything down.
    ///
    /// `shutdown` resolves to the name of the received signal.
    pub async fn run(mut self, shutdown: impl Future<Output = &'static str>) -> SupervisorReport {
        tracing::info!(
            workers = self.workers.count(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "supervisor watching workers"
        );
        let trigger = self.watch(shutdown).await;
        self.shutdown(trigger).await
    }

    async fn watch(&mut self, shutdown: impl Future<Output = &'static str>) -> ShutdownTrigger {
        tokio::pin!(shutdown);
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                signal = &mut shutdown => return ShutdownTrigger::Signal(signal),
                _ = poll.tick() => {
                    gauge!(m::DAEMON_WORKERS_RUNNING).set(self.workers.running_count() as f64);
                    gauge!(m::DAEMON_UPTIME_SECONDS).set(self.started.elapsed().as_secs() as f64);
                    if let Some(name) = self.workers.first_finished() {
                        return ShutdownTrigger::WorkerStopped(name);
                    }
                }
            }
        }
    }

    /// Stop every worker and report how they ended.
    ///
    /// Only the first call does any work; later calls return the same report
    /// without stopping anything or sending another notice.
    pub async fn shutdown(&mut self, trigger: ShutdownTrigger) -> SupervisorReport {
        if let Some(report) = &self.report {
            tracing::debug!(%trigger, "shutdown already done");
            return report.clone();
        }
        tracing::info!(%trigger, "shutting down workers");

        let mut workers = Vec::with_capacity(self.workers.count());
        for role in [WorkerRole::Producer, WorkerRole::Consumer] {
            for worker in self.workers.with_role(role) {
                worker.request_stop();
            }
            for worker in self.workers.with_role(role) {
                let outcome = worker.join(self.stop_timeout).await;
                match &outcome {
                    StopOutcome::Exited(exit) if exit.is_intentional() => {
                        tracing::info!(worker = worker.name(), %outcome, "worker stopped");
                    }
                    _ => tracing::error!(worker = worker.name(), %outcome, "worker stopped abnormally"),
                }
                workers.push(WorkerReport {
                    name: worker.name(),
                    outcome,
                });
            }
        }
        gauge!(m::DAEMON_WORKERS_RUNNING).set(0.0);

        let graceful = is_graceful(&trigger, &workers);
        let mut report = SupervisorReport {
            trigger,
            workers,
            graceful,
            notice_delivered: None,
        };

        if graceful {
            tracing::info!(trigger = %report.trigger, "shutdown was graceful");
        } else {
            tracing::error!(trigger = %report.trigger, "shutdown was not graceful");
            report.notice_delivered = Some(self.send_notice(&report).await);
        }

        self.report = Some(report.clone());
        report
    }

    async fn send_notice(&self, report: &SupervisorReport) -> bool {
        let notice = Notification::new(
            format!("{}: frosty shutdown was not graceful", self.subject),
            notice_body(report),
        );
        for attempt in 1..=2u32 {
            match self.transport.deliver(&notice).await {
                Ok(()) => {
                    tracing::info!(attempt, "shutdown notice delivered");
                    return true;
                }
                Err(e) => tracing::warn!(attempt, error = %e, "shutdown notice delivery failed"),
            }
        }
        tracing::error!("shutdown notice could not be delivered");
        false
    }
}

/// A shutdown is graceful when it was requested (a signal, or the first worker
/// stopping on purpose) and every worker then ended within its bound.
fn is_graceful(trigger: &ShutdownTrigger, workers: &[WorkerReport]) -> bool {
    let requested = match trigger {
        ShutdownTrigger::Signal(_) => true,
        ShutdownTrigger::WorkerStopped(name) => workers
            .iter()
            .find(|w| w.name == *name)
            .is_some_and(|w| matches!(&w.outcome, StopOutcome::Exited(exit) if exit.is_intentional())),
    };
    requested && workers.iter().all(|w| w.outcome.is_joined())
}

fn notice_body(report: &SupervisorReport) -> String {
    let mut body = format!(
        "frosty stopped without a graceful shutdown.\ntrigger: {}\n\n",
        report.trigger
    );
    for worker in &report.workers {
        body.push_str(&format!("{}: {}\n", worker.name, worker.outcome));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use frosty_core::worker::WorkerExit;

    fn report(name: &'static str, outcome: StopOutcome) -> WorkerReport {
        WorkerReport { name, outcome }
    }

    #[test]
    fn signal_with_clean_joins_is_graceful() {
        let workers = vec![
            report("tailer", StopOutcome::Exited(WorkerExit::Requested)),
            report("notifier", StopOutcome::Exited(WorkerExit::Requested)),
        ];
        assert!(is_graceful(&ShutdownTrigger::Signal("SIGTERM"), &workers));
    }

    #[test]
    fn self_stop_is_graceful_but_failure_is_not() {
        let workers = vec![
            report("tailer", StopOutcome::Exited(WorkerExit::SelfStopped("cap".to_owned()))),
            report("notifier", StopOutcome::Exited(WorkerExit::Requested)),
        ];
        assert!(is_graceful(&ShutdownTrigger::WorkerStopped("tailer"), &workers));

        let workers = vec![
            report("tailer", StopOutcome::Exited(WorkerExit::Requested)),
            report("notifier", StopOutcome::Exited(WorkerExit::Failed("smtp".to_owned()))),
        ];
        assert!(!is_graceful(&ShutdownTrigger::WorkerStopped("notifier"), &workers));
    }

    #[test]
    fn timed_out_join_is_never_graceful() {
        let workers = vec![report("ruleset", StopOutcome::TimedOut)];
        assert!(!is_graceful(&ShutdownTrigger::Signal("SIGINT"), &workers));
    }

    #[test]
    fn notice_lists_trigger_and_workers() {
        let report = SupervisorReport {
            trigger: ShutdownTrigger::WorkerStopped("notifier"),
            workers: vec![
                report("tailer", StopOutcome::Exited(WorkerExit::Requested)),
                report("notifier", StopOutcome::Exited(WorkerExit::Failed("smtp down".to_owned()))),
            ],
            graceful: false,
            notice_delivered: None,
        };
        let body = notice_body(&report);
        assert!(body.contains("trigger: worker 'notifier' stopped"));
        assert!(body.contains("tailer: stop requested"));
        assert!(body.contains("notifier: failed: smtp down"));
    }
}
