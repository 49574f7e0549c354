//! Optimistic buffered document.

use crate::commit::Commit;
use crate::committer;
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{EngineError, EngineResult};
use crate::events::{Listeners, MutationEvent, Notification};
use crate::tracker::{AuthoritativeTracker, TrackerEvent};
use crate::transport::CommitHandler;
use docsync_mutation::{apply_all, Mutation, Snapshot};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Counters describing the engine's activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Local mutations added to the buffer.
    pub mutations_added: u64,
    /// Commits created from the buffer.
    pub commits_created: u64,
    /// Commit attempts handed to the commit handler.
    pub commit_attempts: u64,
    /// Attempts that reported failure.
    pub failed_attempts: u64,
    /// Commits the remote accepted.
    pub commits_confirmed: u64,
    /// Commits dropped after the retry policy gave up.
    pub commits_abandoned: u64,
    /// Remote mutations adopted without a rebase.
    pub remote_mutations: u64,
    /// Rebases that changed the optimistic snapshot.
    pub rebases: u64,
    /// Remote deletions observed while the document existed locally.
    pub deletions: u64,
}

/// Mutable engine state, guarded by a single lock.
pub(crate) struct State<T> {
    pub(crate) tracker: T,
    pub(crate) local: Snapshot,
    pub(crate) buffer: Vec<Mutation>,
    pub(crate) commits: VecDeque<Commit>,
    pub(crate) committer_running: bool,
    pub(crate) stats: EngineStats,
    label: String,
}

impl<T: AuthoritativeTracker> State<T> {
    fn new(tracker: T, label: String) -> Self {
        Self {
            local: tracker.snapshot().clone(),
            tracker,
            buffer: Vec::new(),
            commits: VecDeque::new(),
            committer_running: false,
            stats: EngineStats::default(),
            label,
        }
    }

    fn add(&mut self, mutation: Mutation, notifications: &mut Vec<Notification>) {
        let next = mutation.apply(&self.local);
        let changed = next != self.local;

        self.buffer.push(mutation.clone());
        self.stats.mutations_added += 1;
        self.local = next;

        if changed {
            notifications.push(Notification::Mutation(MutationEvent {
                mutation,
                snapshot: self.local.clone(),
                remote: false,
            }));
        }
    }

    /// Rebuilds the optimistic snapshot from the authoritative one.
    pub(crate) fn rebase(&mut self, notifications: &mut Vec<Notification>) {
        if self.tracker.snapshot().is_deleted() {
            self.handle_deletion(notifications);
        }

        let base = self.tracker.snapshot().clone();
        let mut local = self
            .commits
            .iter()
            .fold(base, |snapshot, commit| commit.apply(&snapshot));
        local = apply_all(&local, &self.buffer);
        local.carry_revision_from(&self.local);

        if local == self.local {
            return;
        }

        self.local = local;
        self.stats.rebases += 1;
        debug!(
            document = %self.label,
            queued = self.commits.len(),
            buffered = self.buffer.len(),
            "rebased optimistic snapshot"
        );
        notifications.push(Notification::Rebase(self.local.clone()));
    }

    fn handle_deletion(&mut self, notifications: &mut Vec<Notification>) {
        if !self.local.is_deleted() {
            self.stats.deletions += 1;
            notifications.push(Notification::Delete(self.local.clone()));
        }

        if !self.commits.is_empty() || !self.buffer.is_empty() {
            info!(
                document = %self.label,
                queued = self.commits.len(),
                buffered = self.buffer.len(),
                "document deleted remotely, discarding local changes"
            );
        }
        self.commits.clear();
        self.buffer.clear();
    }

    /// Reacts to tracker events, finishing with a single rebase.
    pub(crate) fn apply_tracker_events(
        &mut self,
        events: Vec<TrackerEvent>,
        notifications: &mut Vec<Notification>,
    ) {
        if events.is_empty() {
            return;
        }

        for event in events {
            match event {
                TrackerEvent::MutationArrived { mutation, snapshot } => {
                    if self.commits.is_empty() && self.buffer.is_empty() {
                        if snapshot.is_deleted() {
                            self.handle_deletion(notifications);
                        }
                        self.local = snapshot.clone();
                        self.stats.remote_mutations += 1;
                        notifications.push(Notification::Mutation(MutationEvent {
                            mutation,
                            snapshot,
                            remote: true,
                        }));
                    }
                }
                TrackerEvent::RebaseRequired => {}
            }
        }

        self.rebase(notifications);
    }
}

/// State shared between document handles and the committer task.
pub(crate) struct Shared<T> {
    pub(crate) state: Mutex<State<T>>,
    pub(crate) listeners: RwLock<Listeners>,
    pub(crate) handler: RwLock<Option<Arc<dyn CommitHandler>>>,
    pub(crate) config: EngineConfig,
    idle: Notify,
}

impl<T> Shared<T> {
    /// Delivers notifications with no lock held.
    pub(crate) fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        listeners.dispatch(notifications);
    }

    pub(crate) fn stop_committer(&self) {
        self.state.lock().committer_running = false;
        self.notify_idle();
    }

    pub(crate) fn notify_idle(&self) {
        self.idle.notify_waiters();
    }
}

/// A document with optimistic local edits layered over an authoritative
/// snapshot.
///
/// Local mutations are applied immediately and collected in a buffer.
/// [`commit`](Self::commit) moves the buffer into a commit queue that a
/// background task drains one commit at a time, retrying failures after
/// the configured delay. Remote mutations go through the tracker; whenever
/// the authoritative snapshot moves, the optimistic snapshot is rebuilt as
/// the authoritative one with every queued commit and buffered mutation
/// replayed on top.
///
/// # Invariants
///
/// - At most one commit is in flight per document
/// - A failed commit is retried before any commit queued after it
/// - The delete listener fires once per deletion, with the last optimistic
///   snapshot
///
/// Handles are cheap to clone and share the same document.
pub struct BufferedDocument<T: AuthoritativeTracker = Document> {
    shared: Arc<Shared<T>>,
}

impl<T: AuthoritativeTracker> Clone for BufferedDocument<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl BufferedDocument<Document> {
    /// Creates a document whose remote state is `snapshot`.
    pub fn new(snapshot: Snapshot) -> Self {
        Self::with_config(snapshot, EngineConfig::default())
    }

    /// Creates a document with the given configuration.
    pub fn with_config(snapshot: Snapshot, config: EngineConfig) -> Self {
        Self::with_tracker(Document::new(snapshot), config)
    }
}

impl<T: AuthoritativeTracker> BufferedDocument<T> {
    /// Creates a document on top of a custom tracker.
    pub fn with_tracker(tracker: T, config: EngineConfig) -> Self {
        let state = State::new(tracker, config.label.clone());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                listeners: RwLock::new(Listeners::default()),
                handler: RwLock::new(None),
                config,
                idle: Notify::new(),
            }),
        }
    }

    /// Sets the commit handler, consuming and returning the document.
    pub fn with_commit_handler(self, handler: impl CommitHandler + 'static) -> Self {
        self.set_commit_handler(handler);
        self
    }

    /// Sets the commit handler.
    pub fn set_commit_handler(&self, handler: impl CommitHandler + 'static) {
        *self.shared.handler.write() = Some(Arc::new(handler));
    }

    /// Subscribes to applied mutations, replacing any previous subscriber.
    pub fn on_mutation(&self, listener: impl Fn(&MutationEvent) + Send + Sync + 'static) {
        self.shared.listeners.write().on_mutation = Some(Arc::new(listener));
    }

    /// Subscribes to rebased snapshots, replacing any previous subscriber.
    pub fn on_rebase(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) {
        self.shared.listeners.write().on_rebase = Some(Arc::new(listener));
    }

    /// Subscribes to remote deletion, replacing any previous subscriber.
    pub fn on_delete(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) {
        self.shared.listeners.write().on_delete = Some(Arc::new(listener));
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Returns the optimistic snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.state.lock().local.clone()
    }

    /// Returns the authoritative snapshot.
    pub fn authoritative(&self) -> Snapshot {
        self.shared.state.lock().tracker.snapshot().clone()
    }

    /// Returns the number of mutations not yet committed.
    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Returns the commits waiting to be transmitted, oldest first.
    ///
    /// The commit currently in flight is not included.
    pub fn commit_queue(&self) -> Vec<Commit> {
        self.shared.state.lock().commits.iter().cloned().collect()
    }

    /// Returns true while the committer task is running, including the
    /// delay between a failure and the retry.
    pub fn is_committing(&self) -> bool {
        self.shared.state.lock().committer_running
    }

    /// Returns activity counters.
    pub fn stats(&self) -> EngineStats {
        self.shared.state.lock().stats.clone()
    }

    /// Runs `f` against the tracker.
    ///
    /// The document's state lock is held while `f` runs, so `f` must not
    /// call back into this document or any clone of it; doing so
    /// deadlocks. Copy out what you need and act on it afterwards.
    pub fn inspect_tracker<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.state.lock().tracker)
    }

    /// Applies a local mutation optimistically and buffers it.
    pub fn add(&self, mutation: Mutation) {
        let mut notifications = Vec::new();
        self.shared.state.lock().add(mutation, &mut notifications);
        self.shared.dispatch(notifications);
    }

    /// Moves the buffered mutations into a new commit and starts the
    /// committer.
    ///
    /// Does nothing when the buffer is empty. Fails without touching the
    /// buffer if no commit handler is set or no Tokio runtime is available.
    pub fn commit(&self) -> EngineResult<()> {
        if self.shared.state.lock().buffer.is_empty() {
            return Ok(());
        }
        let runtime = self.committer_runtime()?;

        {
            let mut state = self.shared.state.lock();
            if state.buffer.is_empty() {
                return Ok(());
            }
            let mutations = std::mem::take(&mut state.buffer);
            debug!(
                document = %self.shared.config.label,
                mutations = mutations.len(),
                queued = state.commits.len() + 1,
                "queued commit"
            );
            state.commits.push_back(Commit::new(mutations));
            state.stats.commits_created += 1;
        }

        self.start_committer(&runtime);
        Ok(())
    }

    /// Starts the committer unless it is already running or there is
    /// nothing to send.
    pub fn perform_commits(&self) -> EngineResult<()> {
        let runtime = self.committer_runtime()?;
        self.start_committer(&runtime);
        Ok(())
    }

    /// Replaces the authoritative snapshot and rebases local work onto it.
    pub fn reset(&self, snapshot: Snapshot) {
        let mut notifications = Vec::new();
        {
            let mut state = self.shared.state.lock();
            debug!(document = %self.shared.config.label, "resetting authoritative snapshot");
            state.tracker.reset(snapshot);
            state.rebase(&mut notifications);
        }
        self.shared.dispatch(notifications);
    }

    /// Feeds a remote mutation to the tracker.
    pub fn arrive(&self, mutation: Mutation) {
        let mut notifications = Vec::new();
        {
            let mut state = self.shared.state.lock();
            let events = state.tracker.arrive(mutation);
            state.apply_tracker_events(events, &mut notifications);
        }
        self.shared.dispatch(notifications);
    }

    /// Decodes a remote mutation from its wire form and feeds it to the
    /// tracker.
    pub fn arrive_encoded(&self, bytes: &[u8]) -> EngineResult<()> {
        let mutation = Mutation::decode(bytes)?;
        self.arrive(mutation);
        Ok(())
    }

    /// Rebuilds the optimistic snapshot from the authoritative one.
    ///
    /// Notifies only if the snapshot changed.
    pub fn rebase(&self) {
        let mut notifications = Vec::new();
        self.shared.state.lock().rebase(&mut notifications);
        self.shared.dispatch(notifications);
    }

    /// Waits until the committer task has stopped.
    pub async fn idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            let running = self.shared.state.lock().committer_running;
            if !running {
                return;
            }
            notified.await;
        }
    }

    fn committer_runtime(&self) -> EngineResult<Handle> {
        if self.shared.handler.read().is_none() {
            return Err(EngineError::MissingCommitHandler);
        }
        Handle::try_current().map_err(|_| EngineError::NoRuntime)
    }

    fn start_committer(&self, runtime: &Handle) {
        {
            let mut state = self.shared.state.lock();
            if state.committer_running || state.commits.is_empty() {
                return;
            }
            state.committer_running = true;
        }
        runtime.spawn(committer::run(Arc::clone(&self.shared)));
    }
}

impl<T: AuthoritativeTracker> std::fmt::Debug for BufferedDocument<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BufferedDocument")
            .field("label", &self.shared.config.label)
            .field("local", &state.local)
            .field("buffered", &state.buffer.len())
            .field("queued", &state.commits.len())
            .field("committing", &state.committer_running)
            .finish()
    }
}
