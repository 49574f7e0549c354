//! Commit transport abstraction.

use crate::error::CommitError;
use docsync_mutation::Mutation;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future resolving to the remote outcome of one commit attempt.
pub type CommitFuture = Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'static>>;

/// Delivers squashed mutations to the remote authority.
///
/// The returned future resolves exactly once with the real network outcome.
/// Closures of the form `Fn(Mutation) -> impl Future<Output = Result<(),
/// CommitError>>` implement this trait.
pub trait CommitHandler: Send + Sync {
    /// Transmits one squashed mutation.
    fn commit(&self, mutation: Mutation) -> CommitFuture;
}

impl<F, Fut> CommitHandler for F
where
    F: Fn(Mutation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), CommitError>> + Send + 'static,
{
    fn commit(&self, mutation: Mutation) -> CommitFuture {
        Box::pin(self(mutation))
    }
}

#[derive(Debug, Default)]
struct MockState {
    outcomes: VecDeque<Result<(), CommitError>>,
    received: Vec<Mutation>,
    in_flight: usize,
    max_in_flight: usize,
}

/// A scripted commit handler for testing.
///
/// Outcomes are consumed in order; once the script runs out every attempt
/// succeeds. Cloned handles share the same script and history.
#[derive(Debug, Clone, Default)]
pub struct MockCommitHandler {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
}

impl MockCommitHandler {
    /// Creates a handler that accepts every commit immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every outcome by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Appends an outcome to the script.
    pub fn push_outcome(&self, outcome: Result<(), CommitError>) {
        self.state.lock().outcomes.push_back(outcome);
    }

    /// Scripts the next `count` attempts to fail with `error`.
    pub fn fail_next(&self, count: usize, error: CommitError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.outcomes.push_back(Err(error.clone()));
        }
    }

    /// Returns every mutation received so far, in order.
    pub fn received(&self) -> Vec<Mutation> {
        self.state.lock().received.clone()
    }

    /// Returns the number of attempts made.
    pub fn attempts(&self) -> usize {
        self.state.lock().received.len()
    }

    /// Returns the largest number of attempts that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }
}

impl CommitHandler for MockCommitHandler {
    fn commit(&self, mutation: Mutation) -> CommitFuture {
        let state = Arc::clone(&self.state);
        let latency = self.latency;

        Box::pin(async move {
            let outcome = {
                let mut state = state.lock();
                state.received.push(mutation);
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                state.outcomes.pop_front().unwrap_or(Ok(()))
            };

            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            state.lock().in_flight -= 1;
            outcome
        })
    }
}
