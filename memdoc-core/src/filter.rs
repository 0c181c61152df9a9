use crate::model::Document;
use crate::path::get_field;
use crate::value::{compare, equal};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// A predicate over documents. Leaves test one dotted key; `And`/`Or`
/// combine children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq { key: String, value: Value },
    Ne { key: String, value: Value },
    Lt { key: String, value: Value },
    Lte { key: String, value: Value },
    Gt { key: String, value: Value },
    Gte { key: String, value: Value },
    In { key: String, values: Vec<Value> },
    Nin { key: String, values: Vec<Value> },
    Null { key: String },
    NotNull { key: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// A partial document: any document matching the filter must agree with some
/// example on the example's keys. Examples whose keys line up with an index
/// enable a probe.
pub type Example = Map<String, Value>;

/// Starts a fluent filter: `where_("a.b").eq(1).and(where_("c").is_null())`.
pub fn where_(key: impl Into<String>) -> WhereClause {
    WhereClause { key: key.into() }
}

pub struct WhereClause {
    key: String,
}

impl WhereClause {
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        Filter::Eq { key: self.key, value: value.into() }
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        Filter::Ne { key: self.key, value: value.into() }
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        Filter::Lt { key: self.key, value: value.into() }
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        Filter::Lte { key: self.key, value: value.into() }
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        Filter::Gt { key: self.key, value: value.into() }
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        Filter::Gte { key: self.key, value: value.into() }
    }

    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            key: self.key,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::Nin {
            key: self.key,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(self) -> Filter {
        Filter::Null { key: self.key }
    }

    pub fn is_not_null(self) -> Filter {
        Filter::NotNull { key: self.key }
    }
}

impl Filter {
    pub fn and(self, other: Filter) -> Filter {
        Filter::And(vec![self, other])
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::Or(vec![self, other])
    }

    /// Evaluates the filter against a document. Every leaf except `Null`
    /// requires the key to be present.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::Eq { key, value } => {
                get_field(document, key).is_some_and(|v| equal(v, value))
            }
            Filter::Ne { key, value } => {
                get_field(document, key).is_some_and(|v| !equal(v, value))
            }
            Filter::Lt { key, value } => {
                get_field(document, key)
                    .is_some_and(|v| compare(v, value) == Ordering::Less)
            }
            Filter::Lte { key, value } => {
                get_field(document, key)
                    .is_some_and(|v| compare(v, value) != Ordering::Greater)
            }
            Filter::Gt { key, value } => {
                get_field(document, key)
                    .is_some_and(|v| compare(v, value) == Ordering::Greater)
            }
            Filter::Gte { key, value } => {
                get_field(document, key)
                    .is_some_and(|v| compare(v, value) != Ordering::Less)
            }
            Filter::In { key, values } => get_field(document, key)
                .is_some_and(|v| values.iter().any(|c| equal(v, c))),
            Filter::Nin { key, values } => get_field(document, key)
                .is_some_and(|v| values.iter().all(|c| !equal(v, c))),
            Filter::Null { key } => {
                get_field(document, key).map_or(true, Value::is_null)
            }
            Filter::NotNull { key } => {
                get_field(document, key).is_some_and(|v| !v.is_null())
            }
            Filter::And(children) => children.iter().all(|c| c.matches(document)),
            Filter::Or(children) => children.iter().any(|c| c.matches(document)),
        }
    }

    /// Extracts the example set: partial documents any match must agree
    /// with. `None` means no index probe is possible and the caller scans.
    pub fn examples(&self) -> Option<Vec<Example>> {
        match self {
            Filter::Eq { key, value } => Some(vec![single(key, value.clone())]),
            Filter::In { key, values } => Some(
                values.iter().map(|v| single(key, v.clone())).collect(),
            ),
            Filter::Null { key } => Some(vec![single(key, Value::Null)]),
            Filter::And(children) => {
                let mut merged = Example::new();
                for child in children {
                    // Children with no example set (inequalities and
                    // negations) stay behind for the evaluator.
                    let Some(set) = child.examples() else { continue };
                    let mut set = set.into_iter();
                    let Some(example) = set.next() else { continue };
                    if set.next().is_some() {
                        return None;
                    }
                    for (k, v) in example {
                        match merged.get(&k) {
                            None => {
                                merged.insert(k, v);
                            }
                            Some(existing) if equal(existing, &v) => {}
                            // Same key, different value: unsatisfiable, so
                            // no probe; the caller falls back to a scan.
                            Some(_) => return None,
                        }
                    }
                }
                Some(vec![merged])
            }
            Filter::Or(children) => {
                let mut examples = Vec::new();
                for child in children {
                    examples.extend(child.examples()?);
                }
                Some(examples)
            }
            _ => None,
        }
    }

    fn op(&self) -> &'static str {
        match self {
            Filter::Eq { .. } => "=",
            Filter::Ne { .. } => "!=",
            Filter::Lt { .. } => "<",
            Filter::Lte { .. } => "<=",
            Filter::Gt { .. } => ">",
            Filter::Gte { .. } => ">=",
            Filter::In { .. } => "IN",
            Filter::Nin { .. } => "NOT IN",
            Filter::Null { .. } => "IS NULL",
            Filter::NotNull { .. } => "IS NOT NULL",
            Filter::And(_) => "AND",
            Filter::Or(_) => "OR",
        }
    }
}

/// Evaluates an optional filter; no filter matches everything.
pub(crate) fn matches(filter: Option<&Filter>, document: &Document) -> bool {
    filter.map_or(true, |f| f.matches(document))
}

/// Example set of an optional filter; no filter yields no example set.
pub(crate) fn to_examples(filter: Option<&Filter>) -> Option<Vec<Example>> {
    filter.and_then(Filter::examples)
}

fn single(key: &str, value: Value) -> Example {
    let mut example = Example::new();
    example.insert(key.to_string(), value);
    example
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", self.op())?;
                    }
                    write!(f, "({child})")?;
                }
                Ok(())
            }
            Filter::Null { key } | Filter::NotNull { key } => {
                write!(f, "{key} {}", self.op())
            }
            Filter::Eq { key, value }
            | Filter::Ne { key, value }
            | Filter::Lt { key, value }
            | Filter::Lte { key, value }
            | Filter::Gt { key, value }
            | Filter::Gte { key, value } => {
                let rendered = serde_json::to_string(value).map_err(|_| fmt::Error)?;
                write!(f, "{key} {} {rendered}", self.op())
            }
            Filter::In { key, values } | Filter::Nin { key, values } => {
                let rendered = serde_json::to_string(values).map_err(|_| fmt::Error)?;
                write!(f, "{key} {} {rendered}", self.op())
            }
        }
    }
}
