// Document helpers - dotted-path access and value ordering on JSON documents

use crate::error::{Result, SchemaGateError};
use crate::validation::type_name;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Primary key field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// How many null slots a single write may append when it targets an index
/// past the end of an array.
pub const MAX_ARRAY_PADDING: usize = 1024;

/// Whether a path segment addresses an array element.
pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Read the value at a dotted path; numeric segments index into arrays.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn get_path_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Write `value` at a dotted path, creating intermediate objects as needed.
/// Array indexes past the end are padded with nulls.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or_default();

    let mut current = doc;
    for segment in segments {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => padded_slot(items, segment, path)?,
            other => {
                return Err(SchemaGateError::Storage(format!(
                    "Cannot create field '{segment}' of path '{path}' inside a {}",
                    type_name(other)
                )))
            }
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            *padded_slot(items, last, path)? = value;
            Ok(())
        }
        other => Err(SchemaGateError::Storage(format!(
            "Cannot set '{path}': parent is a {}",
            type_name(other)
        ))),
    }
}

/// Remove the value at a dotted path. Array elements are nulled, not shifted.
pub fn remove_path(doc: &mut Value, path: &str) -> Option<Value> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (get_path_mut(doc, parent)?, last),
        None => (doc, path),
    };
    match parent {
        Value::Object(map) => remove_key(map, last),
        Value::Array(items) => {
            let slot = items.get_mut(last.parse::<usize>().ok()?)?;
            Some(std::mem::replace(slot, Value::Null))
        }
        _ => None,
    }
}

/// Remove a key while keeping the remaining keys in their original order.
pub fn remove_key(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    map.shift_remove(key)
}

fn padded_slot<'a>(items: &'a mut Vec<Value>, segment: &str, path: &str) -> Result<&'a mut Value> {
    let index = segment.parse::<usize>().map_err(|_| {
        SchemaGateError::Storage(format!(
            "Cannot use '{segment}' of path '{path}' as an array index"
        ))
    })?;
    if index >= items.len() {
        let len = index
            .checked_add(1)
            .filter(|len| len - items.len() <= MAX_ARRAY_PADDING)
            .ok_or_else(|| {
                SchemaGateError::Storage(format!(
                    "Index {index} of path '{path}' is too far past the end of an array of {} item(s)",
                    items.len()
                ))
            })?;
        items.resize(len, Value::Null);
    }
    Ok(&mut items[index])
}

/// Total order over JSON values: null < numbers < strings < objects < arrays < booleans.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Object(_) => 3,
            Value::Array(_) => 4,
            Value::Bool(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y)
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}
