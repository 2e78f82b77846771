//! Per-host message buffer

use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::message::{Message, MessageId};

/// Capacity-bounded message buffer
///
/// Iteration is ordered by message id, so anything derived from a scan of
/// the buffer is reproducible between runs.
#[derive(Debug, Clone)]
pub struct MessageStore {
    capacity: u64,
    used: u64,
    messages: BTreeMap<MessageId, Message>,
}

impl MessageStore {
    /// Create an empty buffer of `capacity` bytes
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: 0,
            messages: BTreeMap::new(),
        }
    }

    /// Insert a message
    ///
    /// The buffer never makes room on its own; callers evict first.
    pub fn insert(&mut self, msg: Message) -> Result<(), StorageError> {
        if self.messages.contains_key(&msg.id) {
            return Err(StorageError::Duplicate(msg.id));
        }
        if msg.size > self.free_space() {
            return Err(StorageError::CapacityExceeded {
                needed: msg.size,
                free: self.free_space(),
            });
        }
        self.used += msg.size;
        self.messages.insert(msg.id, msg);
        Ok(())
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let msg = self.messages.remove(id)?;
        self.used -= msg.size;
        Some(msg)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.get(id)
    }

    /// Mutable access for per-copy bookkeeping. Size must not change.
    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.get_mut(id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.keys().copied().collect()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn free_space(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeId;
    use crate::time::SimTime;

    fn make_msg(id: u64, size: u64) -> Message {
        Message::new(MessageId(id), NodeId(0), NodeId(1), size, 60.0, SimTime::ZERO)
    }

    #[test]
    fn test_capacity_accounting() {
        let mut store = MessageStore::new(1000);
        store.insert(make_msg(1, 400)).unwrap();
        store.insert(make_msg(2, 300)).unwrap();
        assert_eq!(store.used(), 700);
        assert_eq!(store.free_space(), 300);

        store.remove(&MessageId(1));
        assert_eq!(store.free_space(), 700);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_rejects_overflow() {
        let mut store = MessageStore::new(500);
        store.insert(make_msg(1, 400)).unwrap();
        let err = store.insert(make_msg(2, 200)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::CapacityExceeded { needed: 200, free: 100 }
        ));
        assert!(!store.contains(&MessageId(2)));
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut store = MessageStore::new(500);
        store.insert(make_msg(1, 10)).unwrap();
        assert!(matches!(
            store.insert(make_msg(1, 10)),
            Err(StorageError::Duplicate(_))
        ));
        assert_eq!(store.used(), 10);
    }

    #[test]
    fn test_iteration_order() {
        let mut store = MessageStore::new(500);
        store.insert(make_msg(3, 10)).unwrap();
        store.insert(make_msg(1, 10)).unwrap();
        store.insert(make_msg(2, 10)).unwrap();
        assert_eq!(
            store.ids(),
            vec![MessageId(1), MessageId(2), MessageId(3)]
        );
    }

    #[test]
    fn test_remove_missing_is_none() {
        let mut store = MessageStore::new(10);
        assert!(store.remove(&MessageId(9)).is_none());
    }
}
