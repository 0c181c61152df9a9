use crate::collection::Collection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A named database: a registry of collections, created lazily on first
/// lookup and shared as handles.
pub struct Database {
    name: String,
    collections: Mutex<HashMap<String, Arc<Collection>>>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Database {
            name: name.into(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the collection with the given name, creating it on first use.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Collection::new(name)))
            .clone()
    }

    /// Drops every collection, then forgets them all.
    pub fn drop(&self) {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for collection in collections.values() {
            Collection::drop(collection);
        }
        collections.clear();
    }
}
