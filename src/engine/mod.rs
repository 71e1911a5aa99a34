//! Per-event pipeline and the consumption loop.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  RTM stream  │────►│ self-author  │────►│   matcher    │
//! │ (task + mpsc)│     │   filter     │     │ (all rules)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │ per match
//!                                                  ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │   notifier   │◄────│  scheduler   │
//!                      │ (ephemeral)  │     │ (permalink + │
//!                      └──────────────┘     │  reminder)   │
//!                                           └──────────────┘
//! ```
//!
//! Events are handled strictly one at a time, in arrival order.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RuleSet;
use crate::error::StreamError;
use crate::feed::{Event, EventStream};
use crate::logging::{log_match, log_stream, tick_aggregator, Level};
use crate::slack::{ActionApi, MonitoredIdentity};

pub mod filter;
pub mod matcher;
pub mod notifier;
pub mod scheduler;

pub use matcher::{match_rules, Match};
pub use notifier::Notifier;
pub use scheduler::{DeferredActionRequest, Scheduler};

/// Result of handling a single event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub matched: usize,
    pub scheduled: Vec<DeferredActionRequest>,
    pub failed: usize,
}

pub struct Monitor {
    identity: MonitoredIdentity,
    rules: Arc<RuleSet>,
    scheduler: Scheduler,
    notifier: Notifier,
}

impl Monitor {
    pub fn new(identity: MonitoredIdentity, rules: Arc<RuleSet>, api: Arc<dyn ActionApi>) -> Self {
        Self {
            identity,
            rules,
            scheduler: Scheduler::new(api.clone()),
            notifier: Notifier::new(api),
        }
    }

    /// Filter, match, schedule and acknowledge one event. Remote failures
    /// only cost the match they happened on.
    pub async fn handle_event(&self, event: &Event) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        if !filter::authored_by(event, &self.identity) {
            return outcome;
        }

        for m in match_rules(event, &self.rules) {
            outcome.matched += 1;
            log_match(&event.channel, &event.ts, m.index, m.rule.delay);

            match self.scheduler.schedule(&m).await {
                Some(req) => {
                    self.notifier.acknowledge(event, m.rule.delay).await;
                    outcome.scheduled.push(req);
                }
                None => outcome.failed += 1,
            }
        }
        outcome
    }

    /// Consume the stream until it ends or `cancel` fires.
    ///
    /// Cancellation returns `Ok`. Any other end of the stream, clean or
    /// not, is an error: the process has nothing left to watch.
    pub async fn run(&self, stream: EventStream, cancel: CancellationToken) -> Result<(), StreamError> {
        let EventStream { mut events, task } = stream;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                ev = events.recv() => ev,
            };
            let event = match next {
                Some(ev) => ev,
                None => {
                    drop(events);
                    return join_stream(task, cancel.is_cancelled()).await;
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log_stream(Level::Warn, "aborted", "cancelled while handling an event");
                    drop(events);
                    return join_stream(task, true).await;
                }
                _ = self.handle_event(&event) => {}
            }
            tick_aggregator();
        }
    }
}

async fn join_stream(
    task: JoinHandle<Result<(), StreamError>>,
    cancelled: bool,
) -> Result<(), StreamError> {
    let err = match task.await {
        Ok(Ok(())) => StreamError::Closed,
        Ok(Err(e)) => e,
        Err(e) => StreamError::Task(e.to_string()),
    };
    if cancelled {
        log_stream(Level::Info, "stopped", &format!("shutdown: {}", err));
        return Ok(());
    }
    log_stream(Level::Error, "lost", &err.to_string());
    Err(err)
}
