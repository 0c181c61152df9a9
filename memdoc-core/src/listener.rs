use crate::model::Document;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A change notification. Insert and update carry the new document; delete
/// carries only the primary-key value.
#[derive(Debug, Clone)]
pub enum Event {
    Insert(Document),
    Update(Document),
    Delete(Value),
}

pub type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Listener registry with monotonically assigned ids. Events are delivered
/// from a snapshot of the listener list, so no registry lock is held while
/// callbacks run.
pub(crate) struct ListenerRegistry {
    listeners: Mutex<HashMap<u64, Arc<Listener>>>,
    next_id: Mutex<u64>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        ListenerRegistry {
            listeners: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    pub(crate) fn register(&self, listener: Listener) -> u64 {
        let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next_id;
        *next_id += 1;

        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.insert(id, Arc::new(listener));
        id
    }

    pub(crate) fn unregister(&self, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.remove(&id);
    }

    pub(crate) fn emit(&self, event: &Event) {
        let snapshot: Vec<Arc<Listener>> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.values().cloned().collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }
}
