use crate::model::Document;
use crate::path::get_field;
use crate::value::compare;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

/// One sort key: a dotted path and a direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub key: String,
    pub order: Order,
}

impl Sort {
    pub fn asc(key: impl Into<String>) -> Self {
        Sort { key: key.into(), order: Order::Asc }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Sort { key: key.into(), order: Order::Desc }
    }
}

/// Chains the value comparator over the sort keys; a missing path reads as
/// null. The first non-equal key decides.
pub(crate) fn compare_documents(sorts: &[Sort], a: &Document, b: &Document) -> Ordering {
    let null = Value::Null;
    for sort in sorts {
        let x = get_field(a, &sort.key).unwrap_or(&null);
        let y = get_field(b, &sort.key).unwrap_or(&null);
        let ord = compare(x, y);
        if ord != Ordering::Equal {
            return match sort.order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            };
        }
    }
    Ordering::Equal
}
