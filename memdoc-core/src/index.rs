use crate::error::{Error, Result};
use crate::filter::{self, Example, Filter};
use crate::model::{primary_key, Document, KEY_ID};
use crate::path::get_field;
use crate::pool;
use crate::value::KeyValue;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// Name of the built-in unique index over `id`.
pub const ID_INDEX: &str = "_id";

pub(crate) type NodeMap = HashMap<KeyValue, Node>;
pub(crate) type Bucket = HashSet<KeyValue>;

/// One slot of an index tree. Interior levels hold branches; the leaf level
/// holds a primary key directly (unique index) or a bucket of them.
#[derive(Debug)]
pub(crate) enum Node {
    Branch(NodeMap),
    Bucket(Bucket),
    Id(KeyValue),
}

/// Declaration of one index: an ordered composite key of dotted paths, a
/// display name, a uniqueness flag, and an optional partial predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexModel {
    pub keys: Vec<String>,
    pub name: String,
    pub unique: bool,
    pub partial: Option<Filter>,
}

/// The index set of a collection: prefix trees maintained in lockstep with
/// the primary table, guarded by their own lock.
pub struct IndexView {
    inner: RwLock<Inner>,
}

struct Inner {
    names: Vec<String>,
    models: Vec<IndexModel>,
    data: Vec<NodeMap>,
}

impl IndexView {
    pub(crate) fn new() -> Self {
        let view = IndexView {
            inner: RwLock::new(Inner {
                names: Vec::new(),
                models: Vec::new(),
                data: Vec::new(),
            }),
        };
        view.create(IndexModel {
            keys: vec![KEY_ID.to_string()],
            name: ID_INDEX.to_string(),
            unique: true,
            partial: None,
        });
        view
    }

    pub fn list(&self) -> Vec<IndexModel> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.models.clone()
    }

    /// Registers an index, replacing any existing index of the same name.
    /// The new index starts empty; it is not back-filled from the table.
    pub fn create(&self, model: IndexModel) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(i) = inner.names.iter().position(|n| *n == model.name) {
            inner.names.remove(i);
            inner.models.remove(i);
            let mut root = inner.data.remove(i);
            clear_tree(&mut root);
            pool::recycle_node(root);
        }
        inner.names.push(model.name.clone());
        inner.models.push(model);
        inner.data.push(pool::take_node());
    }

    /// Removes an index by name; absent names and the built-in `_id` index
    /// are left untouched.
    pub fn drop(&self, name: &str) {
        if name == ID_INDEX {
            return;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(i) = inner.names.iter().position(|n| n == name) {
            inner.names.remove(i);
            inner.models.remove(i);
            let mut root = inner.data.remove(i);
            clear_tree(&mut root);
            pool::recycle_node(root);
        }
    }

    pub(crate) fn insert_many(&self, documents: &[Document]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (i, document) in documents.iter().enumerate() {
            if let Err(err) = inner.insert_one(document) {
                for previous in documents[..i].iter().rev() {
                    if inner.delete_one(previous).is_err() {
                        warn!("index rollback skipped a document without a primary key");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn delete_many(&self, documents: &[Document]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (i, document) in documents.iter().enumerate() {
            if let Err(err) = inner.delete_one(document) {
                for previous in documents[..i].iter().rev() {
                    if inner.insert_one(previous).is_err() {
                        warn!("index rollback failed to restore a document");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Clears every index's data while keeping the models registered.
    pub(crate) fn delete_all(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for root in &mut inner.data {
            clear_tree(root);
        }
    }

    /// Probes the indexes with the filter's example set. `IndexNotFound`
    /// means no index can serve it and the caller should scan.
    pub(crate) fn find_many(&self, filter: Option<&Filter>) -> Result<Vec<KeyValue>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let examples = filter::to_examples(filter).ok_or(Error::IndexNotFound)?;

        let mut ids: HashSet<KeyValue> = HashSet::new();
        'examples: for example in &examples {
            for (model, root) in inner.models.iter().zip(inner.data.iter()) {
                if let Some(found) = probe(model, root, example) {
                    ids.extend(found);
                    continue 'examples;
                }
            }
            return Err(Error::IndexNotFound);
        }
        Ok(ids.into_iter().collect())
    }
}

impl Inner {
    fn insert_one(&mut self, document: &Document) -> Result<()> {
        let id = primary_key(document).ok_or(Error::IndexConflict)?;
        let mut failed = None;
        {
            let Inner { models, data, .. } = self;
            for (model, root) in models.iter().zip(data.iter_mut()) {
                if let Err(err) = insert_entry(model, root, document, &id) {
                    failed = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failed {
            // Entries installed for this document so far come back out.
            let _ = self.delete_one(document);
            return Err(err);
        }
        Ok(())
    }

    fn delete_one(&mut self, document: &Document) -> Result<()> {
        let id = primary_key(document).ok_or(Error::IndexConflict)?;
        let Inner { models, data, .. } = self;
        for (model, root) in models.iter().zip(data.iter_mut()) {
            if !filter::matches(model.partial.as_ref(), document) {
                continue;
            }
            let values: Vec<KeyValue> = model
                .keys
                .iter()
                .map(|key| lookup_value(document, key))
                .collect();
            remove_entry(root, &values, &id);
        }
        Ok(())
    }
}

fn insert_entry(
    model: &IndexModel,
    root: &mut NodeMap,
    document: &Document,
    id: &KeyValue,
) -> Result<()> {
    if !filter::matches(model.partial.as_ref(), document) {
        return Ok(());
    }
    let mut current = root;
    let last = model.keys.len() - 1;
    for (depth, key) in model.keys.iter().enumerate() {
        let value = lookup_value(document, key);
        if depth < last {
            let node = current
                .entry(value)
                .or_insert_with(|| Node::Branch(pool::take_node()));
            let Node::Branch(child) = node else {
                unreachable!("interior node is always a branch");
            };
            current = child;
        } else if model.unique {
            match current.entry(value) {
                Entry::Occupied(entry) => {
                    let Node::Id(existing) = entry.get() else {
                        unreachable!("unique leaf holds a primary key");
                    };
                    if existing != id {
                        return Err(Error::IndexConflict);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(Node::Id(id.clone()));
                }
            }
        } else {
            let node = current
                .entry(value)
                .or_insert_with(|| Node::Bucket(pool::take_bucket()));
            let Node::Bucket(bucket) = node else {
                unreachable!("non-unique leaf holds a bucket");
            };
            bucket.insert(id.clone());
        }
    }
    Ok(())
}

/// Removes one document's entry along `values`, pruning interior nodes that
/// become empty on the way back up.
fn remove_entry(map: &mut NodeMap, values: &[KeyValue], id: &KeyValue) {
    let [value, rest @ ..] = values else { return };
    if !rest.is_empty() {
        let Some(Node::Branch(child)) = map.get_mut(value) else {
            return;
        };
        remove_entry(child, rest, id);
        if child.is_empty() {
            if let Some(Node::Branch(child)) = map.remove(value) {
                pool::recycle_node(child);
            }
        }
        return;
    }
    match map.get_mut(value) {
        // A unique leaf only comes out when it is bound to this document.
        Some(Node::Id(existing)) if existing == id => {
            map.remove(value);
        }
        Some(Node::Bucket(bucket)) => {
            bucket.remove(id);
            if bucket.is_empty() {
                if let Some(Node::Bucket(bucket)) = map.remove(value) {
                    pool::recycle_bucket(bucket);
                }
            }
        }
        _ => {}
    }
}

fn clear_tree(map: &mut NodeMap) {
    for (_, node) in map.drain() {
        match node {
            Node::Branch(mut child) => {
                clear_tree(&mut child);
                pool::recycle_node(child);
            }
            Node::Bucket(mut bucket) => {
                bucket.clear();
                pool::recycle_bucket(bucket);
            }
            Node::Id(_) => {}
        }
    }
}

/// Matches one example against one index. The index serves the example when
/// a prefix of its key list consumes every example key; the walk descends by
/// value and collects every id under the reached subtree. `None` means this
/// index cannot serve the example (structurally, or no entry for a value).
fn probe(model: &IndexModel, root: &NodeMap, example: &Example) -> Option<Vec<KeyValue>> {
    let mut prefix = 0;
    for key in &model.keys {
        if example.contains_key(key) {
            prefix += 1;
        } else {
            break;
        }
    }
    if example.len() != prefix {
        return None;
    }

    let mut current = root;
    for (depth, key) in model.keys[..prefix].iter().enumerate() {
        let value = example.get(key)?;
        let node = current.get(&KeyValue::from(value.clone()))?;
        if depth + 1 == model.keys.len() {
            return Some(match node {
                Node::Id(id) => vec![id.clone()],
                Node::Bucket(bucket) => bucket.iter().cloned().collect(),
                Node::Branch(_) => return None,
            });
        }
        let Node::Branch(child) = node else { return None };
        current = child;
    }

    let mut found = Vec::new();
    collect_subtree(current, model.keys.len() - prefix, &mut found);
    Some(found)
}

fn collect_subtree(map: &NodeMap, levels: usize, out: &mut Vec<KeyValue>) {
    if levels <= 1 {
        for node in map.values() {
            match node {
                Node::Id(id) => out.push(id.clone()),
                Node::Bucket(bucket) => out.extend(bucket.iter().cloned()),
                Node::Branch(_) => {}
            }
        }
        return;
    }
    for node in map.values() {
        if let Node::Branch(child) = node {
            collect_subtree(child, levels - 1, out);
        }
    }
}

fn lookup_value(document: &Document, key: &str) -> KeyValue {
    KeyValue::from(get_field(document, key).cloned().unwrap_or(Value::Null))
}
