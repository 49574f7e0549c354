//! Notifications delivered to the caller.

use docsync_mutation::{Mutation, Snapshot};
use std::sync::Arc;

/// A mutation that changed the optimistic snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    /// The mutation that was applied.
    pub mutation: Mutation,
    /// Optimistic snapshot after the mutation.
    pub snapshot: Snapshot,
    /// True when the mutation came from the remote.
    pub remote: bool,
}

/// Callback for applied mutations.
pub type MutationListener = Arc<dyn Fn(&MutationEvent) + Send + Sync>;
/// Callback for rebased snapshots.
pub type RebaseListener = Arc<dyn Fn(&Snapshot) + Send + Sync>;
/// Callback for remote deletion; receives the last optimistic snapshot.
pub type DeleteListener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// At most one subscriber per notification kind.
#[derive(Default, Clone)]
pub(crate) struct Listeners {
    pub(crate) on_mutation: Option<MutationListener>,
    pub(crate) on_rebase: Option<RebaseListener>,
    pub(crate) on_delete: Option<DeleteListener>,
}

/// A notification produced while the engine state was locked.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Notification {
    Mutation(MutationEvent),
    Rebase(Snapshot),
    Delete(Snapshot),
}

impl Listeners {
    /// Delivers notifications in the order they were produced.
    pub(crate) fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::Mutation(event) => {
                    if let Some(listener) = &self.on_mutation {
                        listener(&event);
                    }
                }
                Notification::Rebase(snapshot) => {
                    if let Some(listener) = &self.on_rebase {
                        listener(&snapshot);
                    }
                }
                Notification::Delete(snapshot) => {
                    if let Some(listener) = &self.on_delete {
                        listener(&snapshot);
                    }
                }
            }
        }
    }
}
