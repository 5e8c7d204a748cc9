// SPDX-License-Identifier: Apache-2.0

use crate::broker::{BrokerConnector, BrokerError, MessageSource};
use crate::job::{JobOutcome, JobRunner};
use crate::supervisor::ShutdownToken;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Connected,
    Consuming,
    Processing,
    Stopped,
}

impl WorkerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Consuming => "consuming",
            Self::Processing => "processing",
            Self::Stopped => "stopped",
        }
    }

    /// Whether `self -> next` is a legal step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connected)
                | (Self::Connected, Self::Consuming)
                | (Self::Consuming, Self::Processing)
                | (Self::Processing, Self::Consuming)
                | (Self::Connected | Self::Consuming | Self::Processing, Self::Idle)
                | (Self::Idle | Self::Consuming, Self::Stopped)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimings {
    /// Longest wait for a delivery before re-checking the shutdown token.
    pub consume_wait: Duration,
    pub reconnect_delay: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            consume_wait: Duration::from_millis(500),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: u64,
    pub responded: u64,
    pub connection_failures: u64,
    pub transitions: Vec<WorkerState>,
}

/// One consumer: a broker connection and a sequential job loop.
pub struct Worker {
    name: String,
    connector: Arc<dyn BrokerConnector>,
    jobs: Arc<JobRunner>,
    shutdown: ShutdownToken,
    timings: WorkerTimings,
    state: WorkerState,
    report: WorkerReport,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn BrokerConnector>,
        jobs: Arc<JobRunner>,
        shutdown: ShutdownToken,
        timings: WorkerTimings,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            jobs,
            shutdown,
            timings,
            state: WorkerState::Idle,
            report: WorkerReport {
                transitions: vec![WorkerState::Idle],
                ..WorkerReport::default()
            },
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal worker transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!(
            worker = %self.name,
            from = self.state.as_str(),
            to = next.as_str(),
            "worker state"
        );
        self.state = next;
        self.report.transitions.push(next);
    }

    /// Consumes until the shutdown token is observed. Broker failures
    /// drop back to `Idle` and reconnect after a delay.
    pub fn run(mut self) -> WorkerReport {
        info!(worker = %self.name, "starting worker");
        while !self.shutdown.is_triggered() {
            let connector = Arc::clone(&self.connector);
            match connector.consume(&mut |source| self.consume(source)) {
                Ok(()) => break,
                Err(err) => {
                    self.report.connection_failures += 1;
                    self.transition(WorkerState::Idle);
                    warn!(
                        worker = %self.name,
                        error = %err,
                        retry_in_ms = self.timings.reconnect_delay.as_millis() as u64,
                        "broker session ended, reconnecting"
                    );
                    if self.shutdown.sleep(self.timings.reconnect_delay) {
                        break;
                    }
                }
            }
        }
        self.transition(WorkerState::Stopped);
        info!(
            worker = %self.name,
            processed = self.report.processed,
            "worker stopped"
        );
        self.report
    }

    fn consume(&mut self, source: &mut dyn MessageSource) -> Result<(), BrokerError> {
        self.transition(WorkerState::Connected);
        self.transition(WorkerState::Consuming);
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let Some(delivery) = source.next_delivery(self.timings.consume_wait)? else {
                continue;
            };
            self.transition(WorkerState::Processing);
            let outcome = self.jobs.handle_delivery(source, delivery);
            self.report.processed += 1;
            if let Ok(JobOutcome::Responded { .. }) = &outcome {
                self.report.responded += 1;
            }
            self.transition(WorkerState::Consuming);
            outcome?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use WorkerState::*;
        assert!(Idle.can_transition_to(Connected));
        assert!(Consuming.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Consuming));
        assert!(Processing.can_transition_to(Idle));
        assert!(Consuming.can_transition_to(Stopped));
        assert!(!Processing.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Processing));
    }
}
