use crate::index::{Bucket, NodeMap};
use lazy_static::lazy_static;
use std::sync::{Mutex, PoisonError};

// Bound keeps an unlucky burst of deletes from pinning memory forever.
const POOL_CAP: usize = 1024;

lazy_static! {
    static ref NODES: Mutex<Vec<NodeMap>> = Mutex::new(Vec::new());
    static ref BUCKETS: Mutex<Vec<Bucket>> = Mutex::new(Vec::new());
}

pub(crate) fn take_node() -> NodeMap {
    let mut pool = NODES.lock().unwrap_or_else(PoisonError::into_inner);
    pool.pop().unwrap_or_default()
}

pub(crate) fn recycle_node(mut node: NodeMap) {
    debug_assert!(node.is_empty());
    node.clear();
    let mut pool = NODES.lock().unwrap_or_else(PoisonError::into_inner);
    if pool.len() < POOL_CAP {
        pool.push(node);
    }
}

pub(crate) fn take_bucket() -> Bucket {
    let mut pool = BUCKETS.lock().unwrap_or_else(PoisonError::into_inner);
    pool.pop().unwrap_or_default()
}

pub(crate) fn recycle_bucket(mut bucket: Bucket) {
    debug_assert!(bucket.is_empty());
    bucket.clear();
    let mut pool = BUCKETS.lock().unwrap_or_else(PoisonError::into_inner);
    if pool.len() < POOL_CAP {
        pool.push(bucket);
    }
}
