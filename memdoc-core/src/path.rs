use crate::model::Document;
use serde_json::Value;

/// Resolves a dotted path against a document. `[i]` subscripts are
/// normalized to path components, so `"tags[0]"` and `"tags.0"` are the same
/// path. Objects look up by key, arrays by index; an absent path is `None`.
pub fn get_field<'a>(document: &'a Document, key: &str) -> Option<&'a Value> {
    let mut parts = parse_key(key).into_iter();
    let mut current = document.get(&parts.next()?)?;
    for part in parts {
        current = step(current, &part)?;
    }
    Some(current)
}

/// Writes `value` at the terminal location of a dotted path. Intermediate
/// segments must already exist; array writes must be in bounds. Returns
/// whether the write happened.
pub fn set_field(document: &mut Document, key: &str, value: Value) -> bool {
    let parts = parse_key(key);
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };

    if parents.is_empty() {
        document.insert(last.clone(), value);
        return true;
    }

    let mut iter = parents.iter();
    let Some(first) = iter.next() else {
        return false;
    };
    let Some(mut current) = document.get_mut(first) else {
        return false;
    };
    for part in iter {
        current = match step_mut(current, part) {
            Some(next) => next,
            None => return false,
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            true
        }
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

fn step<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        _ => None,
    }
}

fn step_mut<'a>(current: &'a mut Value, part: &str) -> Option<&'a mut Value> {
    match current {
        Value::Object(map) => map.get_mut(part),
        Value::Array(items) => {
            let index = part.parse::<usize>().ok()?;
            items.get_mut(index)
        }
        _ => None,
    }
}

/// Splits a dotted key into components, rewriting `[N]` subscripts into
/// plain components first.
fn parse_key(key: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '[' {
            normalized.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        if !digits.is_empty() && chars.peek() == Some(&']') {
            chars.next();
            normalized.push('.');
            normalized.push_str(&digits);
        } else {
            // Not a numeric subscript; keep the text as-is.
            normalized.push('[');
            normalized.push_str(&digits);
        }
    }
    normalized.split('.').map(str::to_string).collect()
}
