//! TreeStorage (C3): a concurrent `TreeID -> Tree` cache with delayed,
//! cancellable removal (spec.md §4.3).
//!
//! Grounded on the teacher's `timer_service` (`timer.rs`): a
//! `tokio::select!` loop driving a `tokio::task::JoinSet` of in-flight
//! delayed work, with a per-entry cancel flag standing in for the timer
//! module's "debug"-triggered state dump. Entry storage itself is a
//! `DashMap`, as used throughout `kv.rs`/`net/mod.rs`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::error::StorageError;
use crate::ids::{RosterID, TreeID};
use crate::topology::{Roster, Tree};

/// Default delay between `remove` being requested and the entry actually
/// disappearing, giving in-flight messages referencing the tree time to
/// land (spec.md §4.3, §8 scenario 4).
pub const DEFAULT_REMOVAL_DELAY: Duration = Duration::from_secs(5 * 60);

struct Slot {
    tree: Option<Tree>,
    cancel: Arc<AtomicBool>,
    /// Set while a delayed removal task is in flight for this slot, so a
    /// second concurrent `remove` call is a no-op instead of spawning a
    /// duplicate waiter (spec.md §4.3).
    armed: Arc<AtomicBool>,
}

pub struct TreeStorage {
    slots: DashMap<TreeID, Slot>,
    removal_delay: Duration,
    closed: Arc<AtomicBool>,
    background: std::sync::Mutex<JoinSet<()>>,
}

impl TreeStorage {
    pub fn new() -> Arc<Self> {
        Self::with_removal_delay(DEFAULT_REMOVAL_DELAY)
    }

    pub fn with_removal_delay(removal_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            slots: DashMap::new(),
            removal_delay,
            closed: Arc::new(AtomicBool::new(false)),
            background: std::sync::Mutex::new(JoinSet::new()),
        })
    }

    /// Reserves a nil slot for `id` so concurrent `RequestTree` round trips
    /// collapse onto one fetch (spec.md §4.3). A no-op if already
    /// registered.
    pub fn register(&self, id: TreeID) {
        self.slots.entry(id).or_insert_with(|| Slot {
            tree: None,
            cancel: Arc::new(AtomicBool::new(false)),
            armed: Arc::new(AtomicBool::new(false)),
        });
    }

    /// Number of trees currently cached, folded into `Server::status()`
    /// (SPEC_FULL.md §3.2).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Drops the slot iff it is still nil (i.e. no `set` landed in the
    /// meantime); returns whether anything was removed.
    pub fn unregister(&self, id: TreeID) -> bool {
        let Some(entry) = self.slots.get(&id) else {
            return false;
        };
        if entry.tree.is_some() {
            return false;
        }
        drop(entry);
        self.slots.remove(&id).is_some()
    }

    pub fn is_registered(&self, id: TreeID) -> bool {
        self.slots.contains_key(&id)
    }

    /// Stores `tree`, cancelling any pending delayed removal for its id.
    pub fn set(self: &Arc<Self>, tree: Tree) {
        let id = tree.id();
        if let Some(mut slot) = self.slots.get_mut(&id) {
            slot.cancel.store(true, Ordering::SeqCst);
            slot.cancel = Arc::new(AtomicBool::new(false));
            slot.armed = Arc::new(AtomicBool::new(false));
            slot.tree = Some(tree);
        } else {
            self.slots.insert(
                id,
                Slot {
                    tree: Some(tree),
                    cancel: Arc::new(AtomicBool::new(false)),
                    armed: Arc::new(AtomicBool::new(false)),
                },
            );
        }
    }

    pub fn get(&self, id: TreeID) -> Option<Tree> {
        self.slots.get(&id).and_then(|s| s.tree.clone())
    }

    /// Like `get`, but cancels a pending removal for this id, since a
    /// successful lookup means the tree is still in active use
    /// (spec.md §4.3).
    pub fn get_and_refresh(self: &Arc<Self>, id: TreeID) -> Option<Tree> {
        if let Some(slot) = self.slots.get(&id) {
            slot.cancel.store(true, Ordering::SeqCst);
            slot.armed.store(false, Ordering::SeqCst);
        }
        self.get(id)
    }

    pub fn get_roster(&self, roster_id: RosterID) -> Option<Roster> {
        self.slots.iter().find_map(|entry| {
            entry
                .value()
                .tree
                .as_ref()
                .filter(|t| t.roster.get_id() == roster_id)
                .map(|t| t.roster.clone())
        })
    }

    /// Schedules removal of `id` after the storage's removal delay. Calling
    /// this again for the same id while a removal is already pending is a
    /// no-op (idempotent, spec.md §4.3); `set`/`get_and_refresh` cancel a
    /// pending removal.
    pub fn remove(self: &Arc<Self>, id: TreeID) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(entry) = self.slots.get(&id) else {
            return Err(StorageError::NotRegistered(id));
        };
        let cancel = entry.cancel.clone();
        let armed = entry.armed.clone();
        drop(entry);

        if armed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            // A removal is already pending for this slot; second call is a no-op.
            return Ok(());
        }

        let storage = self.clone_handle();
        let delay = self.removal_delay;
        let closed = self.closed.clone();
        self.background.lock().unwrap().spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if !cancel.load(Ordering::SeqCst) && !closed.load(Ordering::SeqCst) {
                        storage.slots.remove(&id);
                    }
                }
                _ = Self::wait_cancelled(&cancel) => {
                    armed.store(false, Ordering::SeqCst);
                }
            }
        });
        Ok(())
    }

    async fn wait_cancelled(cancel: &Arc<AtomicBool>) {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn clone_handle(self: &Arc<Self>) -> Arc<Self> {
        // TreeStorage is only ever held behind an Arc; this just names that
        // contract so `remove`'s spawned task can outlive the caller's
        // borrow.
        Arc::clone(self)
    }

    /// Cancels every pending delayed removal and waits for the background
    /// tasks to finish. Further `remove` calls after this become no-ops
    /// (spec.md §4.3).
    pub async fn close(self: &Arc<Self>) {
        self.closed.store(true, Ordering::SeqCst);
        for entry in self.slots.iter() {
            entry.value().cancel.store(true, Ordering::SeqCst);
        }
        let mut background = self.background.lock().unwrap();
        while background.join_next().await.is_some() {}
    }
}
