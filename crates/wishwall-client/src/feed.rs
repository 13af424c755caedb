//! Live wish feed
//!
//! [`WishFeed`] keeps the client-visible set of wishes, ordered newest
//! first. Fetch results and pushed notifications flow through the same
//! reconciliation step ([`FeedState::reconcile`]) keyed by wish id:
//!
//! - `Loaded` replaces the set wholesale
//! - `Inserted` adds the wish unless its id is already present
//! - `Deleted` removes the wish if present and remembers the id, so an
//!   insert delivered after its delete stays out
//!
//! Every change publishes a fresh [`FeedSnapshot`] on a watch channel.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wishwall_core::{
    ChangeStream, RemoteWishStore, SubscriptionError, TransportError, Wish, WishChange, WishId,
};

/// Load state of the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// No fetch has completed yet
    Loading,
    Ready,
    /// The last fetch failed; the message is shown in place of content
    Failed(String),
}

/// Immutable view of the feed at one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub status: FeedStatus,
    /// Newest first
    pub wishes: Vec<Wish>,
    /// Bumped on every change
    pub revision: u64,
}

impl FeedSnapshot {
    fn loading() -> Self {
        Self {
            status: FeedStatus::Loading,
            wishes: Vec::new(),
            revision: 0,
        }
    }
}

/// Input to the reconciliation step
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Result of a full fetch
    Loaded(Vec<Wish>),
    /// A full fetch failed
    LoadFailed(String),
    /// A pushed notification
    Change(WishChange),
}

/// Sort key: newest first, then local insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    created_at: Reverse<DateTime<Utc>>,
    seq: u64,
}

/// Deleted ids remembered by default
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 4096;

/// The ordered, identity-keyed wish set
#[derive(Debug)]
pub struct FeedState {
    entries: BTreeMap<OrderKey, Wish>,
    index: HashMap<WishId, OrderKey>,
    /// Ids seen deleted; never shown again while remembered
    tombstones: HashSet<WishId>,
    /// Tombstones oldest first; the oldest is forgotten past capacity
    tombstone_order: VecDeque<WishId>,
    tombstone_capacity: usize,
    next_seq: u64,
    status: FeedStatus,
    revision: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    pub fn new() -> Self {
        Self::with_tombstone_capacity(DEFAULT_TOMBSTONE_CAPACITY)
    }

    /// Remember at most `capacity` deleted ids
    ///
    /// A delete older than that no longer blocks a late insert of the same
    /// id; the next refresh removes such an entry again.
    pub fn with_tombstone_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            tombstones: HashSet::new(),
            tombstone_order: VecDeque::new(),
            tombstone_capacity: capacity.max(1),
            next_seq: 0,
            status: FeedStatus::Loading,
            revision: 0,
        }
    }

    /// Apply one event; returns whether anything visible changed
    pub fn reconcile(&mut self, event: FeedEvent) -> bool {
        let changed = match event {
            FeedEvent::Loaded(wishes) => {
                self.replace_all(wishes);
                true
            }
            FeedEvent::LoadFailed(message) => {
                let changed = self.status != FeedStatus::Failed(message.clone());
                self.status = FeedStatus::Failed(message);
                changed
            }
            FeedEvent::Change(WishChange::Inserted(wish)) => self.insert(wish),
            FeedEvent::Change(WishChange::Deleted { id }) => self.remove(id),
        };

        if changed {
            self.revision += 1;
        }
        changed
    }

    fn replace_all(&mut self, wishes: Vec<Wish>) {
        self.entries.clear();
        self.index.clear();
        for wish in wishes {
            self.insert(wish);
        }
        self.status = FeedStatus::Ready;
    }

    fn insert(&mut self, wish: Wish) -> bool {
        if self.tombstones.contains(&wish.id) {
            tracing::debug!(id = %wish.id, "ignoring insert of deleted wish");
            return false;
        }
        if self.index.contains_key(&wish.id) {
            tracing::debug!(id = %wish.id, "ignoring duplicate insert");
            return false;
        }

        let key = OrderKey {
            created_at: Reverse(wish.created_at),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.index.insert(wish.id.clone(), key);
        self.entries.insert(key, wish);
        true
    }

    fn remove(&mut self, id: WishId) -> bool {
        let removed = match self.index.remove(&id) {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        };
        if !removed {
            tracing::debug!(%id, "delete for unknown wish recorded");
        }
        self.remember_deleted(id);
        removed
    }

    fn remember_deleted(&mut self, id: WishId) {
        if !self.tombstones.insert(id.clone()) {
            return;
        }
        self.tombstone_order.push_back(id);
        if self.tombstone_order.len() > self.tombstone_capacity
            && let Some(oldest) = self.tombstone_order.pop_front()
        {
            self.tombstones.remove(&oldest);
        }
    }

    /// Number of deleted ids currently remembered
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn contains(&self, id: &WishId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    /// Wishes, newest first
    pub fn wishes(&self) -> impl Iterator<Item = &Wish> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            status: self.status.clone(),
            wishes: self.entries.values().cloned().collect(),
            revision: self.revision,
        }
    }
}

struct FeedShared {
    store: Arc<dyn RemoteWishStore>,
    state: Mutex<FeedState>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
}

/// Client-side live feed backed by a [`RemoteWishStore`]
///
/// Cheap to clone; clones share the same set.
#[derive(Clone)]
pub struct WishFeed {
    inner: Arc<FeedShared>,
}

impl std::fmt::Debug for WishFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishFeed")
            .field("len", &self.inner.state.lock().len())
            .finish_non_exhaustive()
    }
}

impl WishFeed {
    pub fn new(store: Arc<dyn RemoteWishStore>) -> Self {
        let (snapshot_tx, _) = watch::channel(FeedSnapshot::loading());
        Self {
            inner: Arc::new(FeedShared {
                store,
                state: Mutex::new(FeedState::new()),
                snapshot_tx,
            }),
        }
    }

    /// Open the subscription, then perform the initial fetch
    ///
    /// Subscribing first means no notification is missed while the fetch
    /// is in flight. A failed fetch leaves the feed in
    /// [`FeedStatus::Failed`] but keeps the subscription open.
    pub async fn start(&self) -> Result<SubscriptionHandle, SubscriptionError> {
        let handle = self.subscribe()?;
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "initial wish fetch failed");
        }
        Ok(handle)
    }

    /// Fetch the full collection and replace the set wholesale
    pub async fn refresh(&self) -> Result<usize, TransportError> {
        match self.inner.store.list_wishes().await {
            Ok(wishes) => {
                let count = wishes.len();
                self.reconcile(FeedEvent::Loaded(wishes));
                tracing::debug!(count, "feed refreshed");
                Ok(count)
            }
            Err(e) => {
                self.reconcile(FeedEvent::LoadFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Apply a pushed notification
    pub fn apply(&self, change: WishChange) -> bool {
        self.reconcile(FeedEvent::Change(change))
    }

    fn reconcile(&self, event: FeedEvent) -> bool {
        let mut state = self.inner.state.lock();
        let changed = state.reconcile(event);
        if changed {
            // Published under the lock so snapshots never go backwards
            self.inner.snapshot_tx.send_replace(state.snapshot());
        }
        changed
    }

    /// Open the push subscription
    ///
    /// Notifications are reconciled on a background task until the
    /// returned handle is cancelled or dropped.
    pub fn subscribe(&self) -> Result<SubscriptionHandle, SubscriptionError> {
        let stream = self.inner.store.subscribe()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_subscription(self.clone(), stream, cancel_rx));
        tracing::info!("wish feed subscription opened");

        Ok(SubscriptionHandle {
            cancel_tx,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        })
    }

    /// Current snapshot
    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Receive a new snapshot on every change
    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().is_empty()
    }

    pub fn contains(&self, id: &WishId) -> bool {
        self.inner.state.lock().contains(id)
    }
}

async fn run_subscription(
    feed: WishFeed,
    mut stream: ChangeStream,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            cancelled = cancel_rx.changed() => {
                // Err means the handle is gone
                if cancelled.is_err() || *cancel_rx.borrow() {
                    break;
                }
            }
            next = stream.next() => match next {
                Some(change) => {
                    let id = change.id().clone();
                    if feed.apply(change) {
                        tracing::debug!(%id, "feed reconciled change");
                    }
                }
                None => {
                    tracing::warn!(error = %SubscriptionError::Closed, "change stream ended");
                    break;
                }
            },
        }
    }
    tracing::debug!("subscription task exited");
}

/// Handle to an open feed subscription
///
/// Cancelling is idempotent; dropping the handle cancels it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel_tx: watch::Sender<bool>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    /// Stop delivery; returns `false` if already cancelled
    pub fn cancel(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel_tx.send_replace(true);
        tracing::info!("wish feed subscription closed");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancel and wait for the delivery task to exit
    pub async fn close(self) {
        self.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
