use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::index::IndexView;
use crate::listener::{Event, Listener, ListenerRegistry};
use crate::model::{primary_key, Document, KEY_ID};
use crate::sort::{compare_documents, Sort};
use crate::value::KeyValue;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::slice;
use std::sync::{PoisonError, RwLock};

/// A named set of documents with its own indexes and listeners. Mutations
/// serialize on the primary-table write lock; index maintenance runs while
/// it is held and events fire after it is released.
pub struct Collection {
    name: String,
    data: RwLock<HashMap<KeyValue, Document>>,
    indexes: IndexView,
    listeners: ListenerRegistry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub sorts: Option<Vec<Sort>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub upsert: Option<bool>,
}

impl FindOptions {
    /// Merges a sequence of options; later non-`None` fields win.
    pub fn merge(options: &[FindOptions]) -> FindOptions {
        let mut merged = FindOptions::default();
        for current in options {
            if current.limit.is_some() {
                merged.limit = current.limit;
            }
            if current.skip.is_some() {
                merged.skip = current.skip;
            }
            if current.sorts.is_some() {
                merged.sorts = current.sorts.clone();
            }
        }
        merged
    }
}

impl UpdateOptions {
    /// Merges a sequence of options; later non-`None` fields win.
    pub fn merge(options: &[UpdateOptions]) -> UpdateOptions {
        let mut merged = UpdateOptions::default();
        for current in options {
            if current.upsert.is_some() {
                merged.upsert = current.upsert;
            }
        }
        merged
    }
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Collection {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
            indexes: IndexView::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexes(&self) -> &IndexView {
        &self.indexes
    }

    /// Registers a change listener and returns its id.
    pub fn watch(&self, listener: Listener) -> u64 {
        self.listeners.register(listener)
    }

    pub fn unwatch(&self, listener_id: u64) {
        self.listeners.unregister(listener_id);
    }

    /// Inserts one document and returns its primary-key value.
    pub fn insert_one(&self, document: Document) -> Result<Value> {
        let mut ids = self.insert_docs(slice::from_ref(&document))?;
        let id = ids.swap_remove(0).into_value();
        self.listeners.emit(&Event::Insert(document));
        Ok(id)
    }

    /// Inserts a batch atomically: either every document lands or none do.
    pub fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<Value>> {
        let ids = self.insert_docs(&documents)?;
        for document in documents {
            self.listeners.emit(&Event::Insert(document));
        }
        Ok(ids.into_iter().map(KeyValue::into_value).collect())
    }

    pub fn find_one(
        &self,
        filter: Option<&Filter>,
        options: &[FindOptions],
    ) -> Result<Option<Document>> {
        let mut merged = options.to_vec();
        merged.push(FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        });
        Ok(self.find_many(filter, &merged)?.into_iter().next())
    }

    pub fn find_many(
        &self,
        filter: Option<&Filter>,
        options: &[FindOptions],
    ) -> Result<Vec<Document>> {
        let options = FindOptions::merge(options);
        let limit = options.limit;
        let skip = options.skip.unwrap_or(0);
        let sorts = options.sorts.unwrap_or_default();

        // Pagination and sorting need the full match set; a bare limit
        // caps the scan.
        let budget = if skip == 0 && sorts.is_empty() { limit } else { None };

        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut docs = Vec::new();
        match self.indexes.find_many(filter) {
            Ok(ids) => {
                for id in ids {
                    if budget.is_some_and(|n| docs.len() >= n) {
                        break;
                    }
                    if let Some(document) = data.get(&id) {
                        if filter::matches(filter, document) {
                            docs.push(document.clone());
                        }
                    }
                }
            }
            Err(err) => {
                debug!(
                    "collection {}: {err}; falling back to a table scan",
                    self.name
                );
                for document in data.values() {
                    if budget.is_some_and(|n| docs.len() >= n) {
                        break;
                    }
                    if filter::matches(filter, document) {
                        docs.push(document.clone());
                    }
                }
            }
        }
        drop(data);

        if !sorts.is_empty() {
            docs.sort_by(|a, b| compare_documents(&sorts, a, b));
        }
        let docs = match limit {
            Some(limit) => docs.into_iter().skip(skip).take(limit).collect(),
            None => docs.into_iter().skip(skip).collect(),
        };
        Ok(docs)
    }

    /// Replaces the first matching document with the update keyed by the
    /// resolved id; with `upsert` it inserts when nothing matches. Returns
    /// whether a change happened.
    pub fn update_one(
        &self,
        filter: Option<&Filter>,
        update: Document,
        options: &[UpdateOptions],
    ) -> Result<bool> {
        let upsert = UpdateOptions::merge(options).upsert.unwrap_or(false);

        let existing = self.find_one(filter, &[])?;
        if existing.is_none() && !upsert {
            return Ok(false);
        }

        let mut id = existing
            .as_ref()
            .and_then(|doc| doc.get(KEY_ID))
            .filter(|v| !v.is_null())
            .cloned();
        if id.is_none() {
            id = update.get(KEY_ID).filter(|v| !v.is_null()).cloned();
        }
        if id.is_none() {
            id = resolve_filter_id(filter)?;
        }
        let Some(id) = id else {
            return Err(Error::PrimaryKeyNotFound);
        };

        if let Some(old) = &existing {
            self.delete_docs(slice::from_ref(old))?;
        }

        let document = replace_document(id, &update);
        if let Err(err) = self.insert_docs(slice::from_ref(&document)) {
            if let Some(old) = existing {
                if self.insert_docs(slice::from_ref(&old)).is_err() {
                    warn!(
                        "collection {}: failed to restore a document after an update error",
                        self.name
                    );
                }
            }
            return Err(err);
        }

        self.listeners.emit(&Event::Update(document));
        Ok(true)
    }

    /// Replaces every matching document with the update keyed by its
    /// existing id; with `upsert` it inserts one document when nothing
    /// matches. Returns the number of documents written.
    pub fn update_many(
        &self,
        filter: Option<&Filter>,
        update: Document,
        options: &[UpdateOptions],
    ) -> Result<usize> {
        let upsert = UpdateOptions::merge(options).upsert.unwrap_or(false);

        let matched = self.find_many(filter, &[])?;
        if matched.is_empty() {
            if !upsert {
                return Ok(0);
            }
            let mut id = update.get(KEY_ID).filter(|v| !v.is_null()).cloned();
            if id.is_none() {
                id = resolve_filter_id(filter)?;
            }
            let Some(id) = id else {
                return Err(Error::PrimaryKeyNotFound);
            };
            let document = replace_document(id, &update);
            self.insert_docs(slice::from_ref(&document))?;
            self.listeners.emit(&Event::Update(document));
            return Ok(1);
        }

        let deleted = self.delete_docs(&matched)?;
        let replacements: Vec<Document> = deleted
            .iter()
            .filter_map(|doc| doc.get(KEY_ID).cloned())
            .map(|id| replace_document(id, &update))
            .collect();
        if let Err(err) = self.insert_docs(&replacements) {
            if self.insert_docs(&deleted).is_err() {
                warn!(
                    "collection {}: failed to restore documents after an update error",
                    self.name
                );
            }
            return Err(err);
        }

        let count = replacements.len();
        for document in replacements {
            self.listeners.emit(&Event::Update(document));
        }
        Ok(count)
    }

    pub fn delete_one(&self, filter: Option<&Filter>) -> Result<bool> {
        let Some(document) = self.find_one(filter, &[])? else {
            return Ok(false);
        };
        let deleted = self.delete_docs(slice::from_ref(&document))?;
        let changed = !deleted.is_empty();
        self.emit_deletes(deleted);
        Ok(changed)
    }

    pub fn delete_many(&self, filter: Option<&Filter>) -> Result<usize> {
        let matched = self.find_many(filter, &[])?;
        let deleted = self.delete_docs(&matched)?;
        let count = deleted.len();
        self.emit_deletes(deleted);
        Ok(count)
    }

    /// Removes every document and all index data in one critical section,
    /// then emits a delete event per primary key that was present.
    pub fn drop(&self) {
        let old = {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            self.indexes.delete_all();
            mem::take(&mut *data)
        };
        for (id, _) in old {
            self.listeners.emit(&Event::Delete(id.into_value()));
        }
    }

    fn insert_docs(&self, documents: &[Document]) -> Result<Vec<KeyValue>> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);

        let mut ids = Vec::with_capacity(documents.len());
        let mut seen = HashSet::with_capacity(documents.len());
        for document in documents {
            let id = primary_key(document).ok_or(Error::PrimaryKeyNotFound)?;
            if data.contains_key(&id) || !seen.insert(id.clone()) {
                return Err(Error::PrimaryKeyDuplicated);
            }
            ids.push(id);
        }

        self.indexes.insert_many(documents)?;
        for (id, document) in ids.iter().zip(documents) {
            data.insert(id.clone(), document.clone());
        }
        Ok(ids)
    }

    fn delete_docs(&self, documents: &[Document]) -> Result<Vec<Document>> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);

        let mut ids = Vec::new();
        let mut docs = Vec::new();
        for document in documents {
            if let Some(id) = primary_key(document) {
                ids.push(id);
                docs.push(document.clone());
            }
        }

        self.indexes.delete_many(&docs)?;
        for id in &ids {
            data.remove(id);
        }
        Ok(docs)
    }

    fn emit_deletes(&self, documents: Vec<Document>) {
        for mut document in documents {
            if let Some(id) = document.remove(KEY_ID) {
                self.listeners.emit(&Event::Delete(id));
            }
        }
    }
}

/// Resolves a target id from the filter's example set: exactly one example
/// may name `id`; a second candidate is a duplicate-key error.
fn resolve_filter_id(filter: Option<&Filter>) -> Result<Option<Value>> {
    let Some(examples) = filter::to_examples(filter) else {
        return Ok(None);
    };
    let mut id = None;
    for example in examples {
        if let Some(value) = example.get(KEY_ID).filter(|v| !v.is_null()) {
            if id.is_some() {
                return Err(Error::PrimaryKeyDuplicated);
            }
            id = Some(value.clone());
        }
    }
    Ok(id)
}

/// Builds the replacement document: the id plus every update field. The
/// update replaces all non-id fields; this is a whole-document replace, not
/// a field merge.
fn replace_document(id: Value, update: &Document) -> Document {
    let mut document = Document::new();
    document.insert(KEY_ID.to_string(), id);
    for (key, value) in update {
        document.insert(key.clone(), value.clone());
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_options_merge_later_wins() {
        let merged = FindOptions::merge(&[
            FindOptions {
                limit: Some(10),
                skip: Some(2),
                sorts: None,
            },
            FindOptions {
                limit: Some(5),
                ..FindOptions::default()
            },
        ]);
        assert_eq!(merged.limit, Some(5));
        assert_eq!(merged.skip, Some(2));
        assert_eq!(merged.sorts, None);
    }

    #[test]
    fn test_update_options_merge_later_wins() {
        let merged = UpdateOptions::merge(&[
            UpdateOptions { upsert: Some(true) },
            UpdateOptions { upsert: None },
            UpdateOptions { upsert: Some(false) },
        ]);
        assert_eq!(merged.upsert, Some(false));
    }

    #[test]
    fn test_merge_of_nothing_is_default() {
        assert_eq!(FindOptions::merge(&[]), FindOptions::default());
        assert_eq!(UpdateOptions::merge(&[]), UpdateOptions::default());
    }
}
