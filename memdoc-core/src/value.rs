use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Total order over heterogeneous JSON values: null first, then booleans,
/// numbers (integers and floats compared numerically), strings, arrays,
/// objects. Mixed types fall back to that tag order.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let ord = compare(ex, ey);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => compare_objects(x, y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Structural equality with the same numeric coercion as [`compare`]:
/// the integer 1 equals the float 1.0.
pub fn equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}

fn compare_objects(x: &Map<String, Value>, y: &Map<String, Value>) -> Ordering {
    // serde_json's Map iterates in key order.
    for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
        let ord = kx.cmp(ky);
        if ord != Ordering::Equal {
            return ord;
        }
        let ord = compare(vx, vy);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    x.len().cmp(&y.len())
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// A JSON value usable as a map key: equality and hashing follow the
/// comparator, so `1` and `1.0` land in the same slot.
#[derive(Debug, Clone)]
pub struct KeyValue(Value);

impl KeyValue {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for KeyValue {
    fn from(value: Value) -> Self {
        KeyValue(value)
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        equal(&self.0, &other.0)
    }
}

// serde_json numbers are never NaN, so the comparator equality is reflexive.
impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: Hasher>(v: &Value, state: &mut H) {
    state.write_u8(type_rank(v));
    match v {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => {
            // Canonical f64 bits keep the hash aligned with `equal`;
            // -0.0 folds into 0.0.
            let f = n.as_f64().unwrap_or(0.0);
            let f = if f == 0.0 { 0.0 } else { f };
            f.to_bits().hash(state);
        }
        Value::String(s) => s.hash(state),
        Value::Array(items) => {
            state.write_usize(items.len());
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            state.write_usize(map.len());
            for (k, val) in map {
                k.hash(state);
                hash_value(val, state);
            }
        }
    }
}
