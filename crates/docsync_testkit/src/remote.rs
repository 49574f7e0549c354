//! In-process remote authority.
//!
//! `LoopbackRemote` stands in for the server side of a document: it accepts
//! committed mutations, stamps them with revisions, and keeps an ordered log
//! that clients replay through [`Subscription::deliver`].

use docsync_engine::{
    AuthoritativeTracker, BufferedDocument, CommitError, CommitFuture, CommitHandler,
    EngineConfig,
};
use docsync_mutation::{Mutation, Snapshot};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct RemoteState {
    snapshot: Snapshot,
    log: Vec<Mutation>,
    foreign_count: u64,
    offline: bool,
    rejected: u64,
}

impl RemoteState {
    fn accept(&mut self, mut mutation: Mutation) -> Mutation {
        if let Some(rev) = self.snapshot.rev() {
            mutation.previous_rev = Some(rev.to_string());
        } else {
            mutation.previous_rev = None;
        }
        if mutation.result_rev.is_none() {
            mutation.result_rev = mutation.transaction_id.clone();
        }
        self.snapshot = mutation.apply(&self.snapshot);
        self.log.push(mutation.clone());
        mutation
    }
}

/// A remote document shared by any number of clients.
///
/// Cloned handles share the same document.
#[derive(Debug, Clone)]
pub struct LoopbackRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl LoopbackRemote {
    /// Creates a remote holding `snapshot`.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                snapshot,
                log: Vec::new(),
                foreign_count: 0,
                offline: false,
                rejected: 0,
            })),
        }
    }

    /// Returns the current remote snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().snapshot.clone()
    }

    /// Returns every accepted mutation in revision order.
    pub fn log(&self) -> Vec<Mutation> {
        self.state.lock().log.clone()
    }

    /// Returns the number of commits refused while offline.
    pub fn rejected(&self) -> u64 {
        self.state.lock().rejected
    }

    /// While offline every commit fails with a transient error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Applies an edit made by some other client and returns it as it will
    /// be delivered.
    pub fn foreign(&self, mutation: Mutation) -> Mutation {
        let mut state = self.state.lock();
        state.foreign_count += 1;
        let rev = format!("foreign-{}", state.foreign_count);
        let mutation = mutation.with_transaction_id(rev.clone()).with_result_rev(rev);
        state.accept(mutation)
    }

    /// Starts a subscription at the current end of the log.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            remote: self.clone(),
            cursor: self.state.lock().log.len(),
        }
    }

    /// Creates a client document at the current remote state, with this
    /// remote as its commit handler, plus its subscription.
    pub fn client(&self, config: EngineConfig) -> (BufferedDocument, Subscription) {
        let subscription = self.subscribe();
        let doc = BufferedDocument::with_config(self.snapshot(), config)
            .with_commit_handler(self.clone());
        (doc, subscription)
    }
}

impl CommitHandler for LoopbackRemote {
    fn commit(&self, mutation: Mutation) -> CommitFuture {
        let outcome = {
            let mut state = self.state.lock();
            if state.offline {
                state.rejected += 1;
                Err(CommitError::transient("remote offline"))
            } else {
                state.accept(mutation);
                Ok(())
            }
        };
        Box::pin(std::future::ready(outcome))
    }
}

/// A client's position in the remote log.
#[derive(Debug)]
pub struct Subscription {
    remote: LoopbackRemote,
    cursor: usize,
}

impl Subscription {
    /// Returns the number of accepted mutations not yet delivered.
    pub fn pending(&self) -> usize {
        self.remote.state.lock().log.len() - self.cursor
    }

    /// Delivers every mutation accepted since the last call to `doc`.
    ///
    /// Returns the number delivered.
    pub fn deliver<T: AuthoritativeTracker>(&mut self, doc: &BufferedDocument<T>) -> usize {
        let batch: Vec<Mutation> = {
            let state = self.remote.state.lock();
            state.log[self.cursor..].to_vec()
        };
        self.cursor += batch.len();

        let delivered = batch.len();
        for mutation in batch {
            doc.arrive(mutation);
        }
        delivered
    }
}
