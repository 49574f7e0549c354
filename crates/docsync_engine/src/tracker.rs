//! Interface to the authoritative-state tracker.

use docsync_mutation::{Mutation, Snapshot};

/// Notification returned by the tracker when its authoritative view changes.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A remote mutation was applied cleanly on top of the authoritative
    /// snapshot.
    MutationArrived {
        /// The remote mutation.
        mutation: Mutation,
        /// Authoritative snapshot after the mutation.
        snapshot: Snapshot,
    },
    /// The authoritative snapshot changed in a way that requires the
    /// optimistic view to be rebuilt.
    RebaseRequired,
}

/// Remote outcome of a staged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The remote accepted the mutation.
    Success,
    /// The remote did not accept the mutation.
    Failure,
}

/// Token for a staged mutation.
///
/// It must be handed back to [`AuthoritativeTracker::resolve`] exactly once;
/// it cannot be cloned.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a staged mutation must be resolved"]
pub struct Responder {
    transaction_id: String,
}

impl Responder {
    /// Creates a responder for the given transaction.
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
        }
    }

    /// Returns the transaction this responder resolves.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

/// Tracks the last remote-consistent state of a document.
///
/// The buffered document reads [`snapshot`](Self::snapshot) as its
/// authoritative base and reacts to the events returned by the mutating
/// methods.
pub trait AuthoritativeTracker: Send + 'static {
    /// Returns the authoritative snapshot, including mutations staged
    /// optimistically.
    fn snapshot(&self) -> &Snapshot;

    /// Replaces the known remote state wholesale.
    fn reset(&mut self, snapshot: Snapshot);

    /// Accepts a mutation received from the remote.
    fn arrive(&mut self, mutation: Mutation) -> Vec<TrackerEvent>;

    /// Stages a local mutation that is about to be transmitted.
    fn stage(&mut self, mutation: Mutation, optimistic: bool) -> Responder;

    /// Reports the remote outcome of a staged mutation.
    fn resolve(&mut self, responder: Responder, outcome: StageOutcome) -> Vec<TrackerEvent>;
}
