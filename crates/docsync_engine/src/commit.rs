//! Batches of buffered mutations submitted together.

use docsync_mutation::{apply_all, squash, Mutation, Snapshot};

/// A batch of local mutations awaiting remote confirmation.
///
/// The mutations never change after creation; only the failure count does.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    mutations: Vec<Mutation>,
    tries: u32,
}

impl Commit {
    /// Creates a commit from buffered mutations, in causal order.
    pub fn new(mutations: Vec<Mutation>) -> Self {
        Self {
            mutations,
            tries: 0,
        }
    }

    /// Returns the mutations in this commit.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Returns how many attempts have failed.
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Records a failed attempt and returns the new count.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.tries += 1;
        self.tries
    }

    /// Replays the mutations onto a snapshot.
    pub fn apply(&self, snapshot: &Snapshot) -> Snapshot {
        apply_all(snapshot, &self.mutations)
    }

    /// Collapses the commit into one transmittable mutation with a new
    /// transaction ID.
    ///
    /// Every call produces a distinct transaction, so a retry never reuses
    /// the identity of a failed attempt.
    pub fn squash(&self, snapshot: &Snapshot) -> Mutation {
        let mut squashed = squash(snapshot, &self.mutations);
        squashed.assign_random_transaction_id();
        squashed
    }
}
