//! Single-flight committer loop.

use crate::buffered::Shared;
use crate::commit::Commit;
use crate::error::CommitError;
use crate::tracker::{AuthoritativeTracker, Responder, StageOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keeps the committer state consistent when the loop stops early.
///
/// If the loop future is dropped before it finishes (runtime shutdown,
/// task abort), the in-flight commit goes back to the front of the queue,
/// its staged mutation is resolved as failed, and the running flag is
/// cleared so a later `perform_commits` can start a new loop.
struct RunGuard<'a, T: AuthoritativeTracker> {
    shared: &'a Shared<T>,
    in_flight: Option<(Commit, Responder)>,
    finished: bool,
}

impl<'a, T: AuthoritativeTracker> RunGuard<'a, T> {
    fn new(shared: &'a Shared<T>) -> Self {
        Self {
            shared,
            in_flight: None,
            finished: false,
        }
    }
}

impl<T: AuthoritativeTracker> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let mut notifications = Vec::new();
        {
            let mut state = self.shared.state.lock();
            if let Some((commit, responder)) = self.in_flight.take() {
                if !state.tracker.snapshot().is_deleted() {
                    state.commits.push_front(commit);
                }
                let events = state.tracker.resolve(responder, StageOutcome::Failure);
                state.apply_tracker_events(events, &mut notifications);
            }
            state.committer_running = false;
        }

        warn!(
            document = %self.shared.config.label,
            "committer stopped before the queue drained"
        );
        self.shared.notify_idle();
        if !std::thread::panicking() {
            self.shared.dispatch(notifications);
        }
    }
}

/// Drains the commit queue one commit at a time.
///
/// Started by `perform_commits` with the running flag already set; clears
/// the flag in the same critical section that finds the queue empty. The
/// state lock is never held across an await.
pub(crate) async fn run<T: AuthoritativeTracker>(shared: Arc<Shared<T>>) {
    let label = shared.config.label.as_str();
    let mut guard = RunGuard::new(&shared);

    loop {
        let Some(handler) = shared.handler.read().clone() else {
            shared.stop_committer();
            guard.finished = true;
            return;
        };

        let staged = {
            let mut state = shared.state.lock();
            match state.commits.pop_front() {
                Some(commit) => {
                    let squashed = commit.squash(&state.local);
                    let responder = state.tracker.stage(squashed.clone(), true);
                    state.stats.commit_attempts += 1;
                    debug!(
                        document = label,
                        transaction = squashed.transaction_id.as_deref().unwrap_or_default(),
                        tries = commit.tries(),
                        queued = state.commits.len(),
                        "staging commit"
                    );
                    Some((commit, squashed, responder))
                }
                None => {
                    state.committer_running = false;
                    None
                }
            }
        };

        let Some((commit, squashed, responder)) = staged else {
            guard.finished = true;
            shared.notify_idle();
            return;
        };
        guard.in_flight = Some((commit, responder));

        let transaction = squashed.transaction_id.clone().unwrap_or_default();
        // A panicking handler fails this attempt instead of the loop.
        let outcome = match tokio::spawn(async move { handler.commit(squashed).await }).await {
            Ok(outcome) => outcome,
            Err(err) => Err(CommitError::transient(format!("commit handler failed: {err}"))),
        };

        let Some((mut commit, responder)) = guard.in_flight.take() else {
            continue;
        };

        let mut notifications = Vec::new();
        let retry_delay = {
            let mut state = shared.state.lock();
            match outcome {
                Ok(()) => {
                    state.stats.commits_confirmed += 1;
                    debug!(document = label, transaction = %transaction, "commit accepted");
                    let events = state.tracker.resolve(responder, StageOutcome::Success);
                    state.apply_tracker_events(events, &mut notifications);
                    None
                }
                Err(error) => {
                    let tries = commit.record_failure();
                    state.stats.failed_attempts += 1;

                    if state.tracker.snapshot().is_deleted() {
                        info!(
                            document = label,
                            transaction = %transaction,
                            "dropping failed commit for deleted document"
                        );
                    } else if shared.config.retry.should_retry(&error, tries) {
                        warn!(
                            document = label,
                            transaction = %transaction,
                            tries,
                            error = %error,
                            "commit failed, retrying"
                        );
                        state.commits.push_front(commit);
                    } else {
                        warn!(
                            document = label,
                            transaction = %transaction,
                            tries,
                            error = %error,
                            "abandoning commit"
                        );
                        state.stats.commits_abandoned += 1;
                    }

                    let events = state.tracker.resolve(responder, StageOutcome::Failure);
                    state.apply_tracker_events(events, &mut notifications);
                    Some(shared.config.retry.delay)
                }
            }
        };

        shared.dispatch(notifications);

        if let Some(delay) = retry_delay {
            tokio::time::sleep(delay).await;
        }
    }
}
