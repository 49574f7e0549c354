//! In-memory authoritative tracker.

use crate::tracker::{AuthoritativeTracker, Responder, StageOutcome, TrackerEvent};
use docsync_mutation::{Mutation, Snapshot};
use std::collections::VecDeque;

/// Number of applied revisions remembered for dropping redeliveries.
const APPLIED_HISTORY: usize = 256;

/// A local mutation staged for transmission.
#[derive(Debug, Clone)]
struct StagedMutation {
    mutation: Mutation,
    optimistic: bool,
    submitted: bool,
}

impl StagedMutation {
    fn is_transaction(&self, transaction_id: &str) -> bool {
        self.mutation.transaction_id.as_deref() == Some(transaction_id)
    }
}

/// Tracks the confirmed remote state of one document.
///
/// The tracker keeps:
/// - the head: the last snapshot confirmed by the remote, with its revision
/// - remote mutations that arrived before the revision they build on
/// - local mutations staged for transmission, oldest first
/// - the edge: the head with every optimistic staged mutation applied
///
/// # Invariants
///
/// - Remote mutations are applied in revision order; a mutation waits until
///   its `previous_rev` matches the head revision
/// - The edge is always recomputed from the head, never patched in place
/// - A remote mutation whose result revision was recently applied is
///   discarded on arrival
pub struct Document {
    head: Snapshot,
    head_rev: Option<String>,
    edge: Snapshot,
    incoming: Vec<Mutation>,
    applied: VecDeque<String>,
    staged: VecDeque<StagedMutation>,
}

impl Document {
    /// Creates a tracker whose remote state is `snapshot`.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            head_rev: snapshot.rev().map(str::to_string),
            edge: snapshot.clone(),
            head: snapshot,
            incoming: Vec::new(),
            applied: VecDeque::new(),
            staged: VecDeque::new(),
        }
    }

    /// Returns the last snapshot confirmed by the remote.
    pub fn head(&self) -> &Snapshot {
        &self.head
    }

    /// Returns the revision of the confirmed snapshot.
    pub fn head_rev(&self) -> Option<&str> {
        self.head_rev.as_deref()
    }

    /// Returns the number of remote mutations waiting for an earlier
    /// revision.
    pub fn pending_arrivals(&self) -> usize {
        self.incoming.len()
    }

    /// Returns the number of staged local mutations.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Returns the number of staged mutations the remote has accepted but
    /// not yet echoed back.
    pub fn submitted_len(&self) -> usize {
        self.staged.iter().filter(|s| s.submitted).count()
    }

    /// Rebuilds the edge from the head; returns true if it changed.
    fn recompute_edge(&mut self) -> bool {
        let edge = self
            .staged
            .iter()
            .filter(|s| s.optimistic)
            .fold(self.head.clone(), |snapshot, s| s.mutation.apply(&snapshot));
        let changed = edge != self.edge;
        self.edge = edge;
        changed
    }

    /// Removes and returns the next remote mutation that builds on the head.
    fn next_applicable(&mut self) -> Option<Mutation> {
        let head_rev = self.head_rev.clone();
        let applied = &self.applied;

        // Already applied.
        self.incoming.retain(|m| match &m.result_rev {
            Some(rev) => head_rev.as_ref() != Some(rev) && !applied.contains(rev),
            None => true,
        });

        let position = self
            .incoming
            .iter()
            .position(|m| m.previous_rev.is_none() || m.previous_rev == head_rev)?;
        Some(self.incoming.remove(position))
    }

    fn apply_to_head(&mut self, mutation: &Mutation) {
        self.head = mutation.apply(&self.head);
        if let Some(rev) = mutation
            .result_rev
            .as_ref()
            .or(mutation.transaction_id.as_ref())
        {
            self.head_rev = Some(rev.clone());
        }
        if let Some(rev) = &mutation.result_rev {
            if self.applied.len() == APPLIED_HISTORY {
                self.applied.pop_front();
            }
            self.applied.push_back(rev.clone());
        }
    }
}

impl AuthoritativeTracker for Document {
    fn snapshot(&self) -> &Snapshot {
        &self.edge
    }

    fn reset(&mut self, snapshot: Snapshot) {
        self.head_rev = snapshot.rev().map(str::to_string);
        self.head = snapshot;
        self.incoming.clear();
        self.applied.clear();
        // Accepted mutations are part of any snapshot fetched after them.
        self.staged.retain(|s| !s.submitted);
        self.recompute_edge();
    }

    fn arrive(&mut self, mutation: Mutation) -> Vec<TrackerEvent> {
        self.incoming.push(mutation);

        let mut events = Vec::new();
        let mut rebase = false;

        while let Some(mutation) = self.next_applicable() {
            self.apply_to_head(&mutation);

            let echo = mutation.transaction_id.as_deref().and_then(|id| {
                self.staged
                    .iter()
                    .position(|staged| staged.is_transaction(id))
            });

            if let Some(position) = echo {
                self.staged.remove(position);
                rebase |= self.recompute_edge();
            } else if self.staged.is_empty() {
                self.edge = self.head.clone();
                events.push(TrackerEvent::MutationArrived {
                    mutation,
                    snapshot: self.edge.clone(),
                });
            } else {
                rebase |= self.recompute_edge();
            }
        }

        if rebase {
            events.push(TrackerEvent::RebaseRequired);
        }
        events
    }

    fn stage(&mut self, mutation: Mutation, optimistic: bool) -> Responder {
        let responder = Responder::new(mutation.transaction_id.clone().unwrap_or_default());
        if optimistic {
            self.edge = mutation.apply(&self.edge);
        }
        self.staged.push_back(StagedMutation {
            mutation,
            optimistic,
            submitted: false,
        });
        responder
    }

    fn resolve(&mut self, responder: Responder, outcome: StageOutcome) -> Vec<TrackerEvent> {
        let Some(position) = self
            .staged
            .iter()
            .position(|s| s.is_transaction(responder.transaction_id()))
        else {
            // Already echoed by the remote.
            return Vec::new();
        };

        match outcome {
            StageOutcome::Success => {
                self.staged[position].submitted = true;
                Vec::new()
            }
            StageOutcome::Failure => {
                self.staged.remove(position);
                if self.recompute_edge() {
                    vec![TrackerEvent::RebaseRequired]
                } else {
                    Vec::new()
                }
            }
        }
    }
}
