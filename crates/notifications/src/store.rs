//! In-memory notification store.
//!
//! Newest-received first, deduplicated by `id`. Producer timestamps are not used
//! for ordering.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;

use crate::model::Notification;

#[derive(Debug, Default)]
pub struct NotificationStore {
    items: VecDeque<Notification>,
    ids: FxHashSet<String>,
    /// Optional upper bound; oldest records are evicted first.
    capacity: Option<usize>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store keeping at most `capacity` records. `None` means unbounded.
    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.filter(|c| *c > 0),
            ..Self::default()
        }
    }

    /// Prepend a notification unless one with the same `id` is already stored.
    ///
    /// Returns `true` if the record was inserted. The first-seen copy wins.
    pub fn add(&mut self, notification: Notification) -> bool {
        if self.ids.contains(&notification.id) {
            return false;
        }
        self.ids.insert(notification.id.clone());
        self.items.push_front(notification);

        if let Some(cap) = self.capacity {
            while self.items.len() > cap {
                if let Some(evicted) = self.items.pop_back() {
                    self.ids.remove(&evicted.id);
                }
            }
        }
        true
    }

    /// Mark one record as read. Returns `true` only if its state changed.
    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every record as read. Returns how many changed.
    pub fn mark_all_as_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    pub fn clear_all(&mut self) {
        self.items.clear();
        self.ids.clear();
    }

    /// Snapshot in display order (newest first).
    pub fn list(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
