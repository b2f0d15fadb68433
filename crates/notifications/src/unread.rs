//! Unread count derived from the store.

use tokio::sync::watch;

use crate::store::NotificationStore;

/// Number of records with `read == false`.
pub fn unread_count(store: &NotificationStore) -> usize {
    store.iter().filter(|n| !n.read).count()
}

/// Publishes the unread count to observers.
///
/// Holds no state of its own beyond the last published value; callers invoke
/// [`UnreadTracker::observe`] after every store mutation.
#[derive(Debug)]
pub struct UnreadTracker {
    tx: watch::Sender<usize>,
}

impl Default for UnreadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UnreadTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Recompute from `store`, notify watchers if the value moved, and return it.
    pub fn observe(&self, store: &NotificationStore) -> usize {
        let count = unread_count(store);
        self.tx.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                *current = count;
                true
            }
        });
        count
    }

    /// Last published count.
    pub fn current(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}
