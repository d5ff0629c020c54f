// In-memory backend - filters and update operators over JSON documents

use super::{DocumentStore, UpdateOptions, UpdateResult};
use crate::document::{
    compare_values, get_path, get_path_mut, remove_path, set_path, values_equal, ID_FIELD,
};
use crate::error::{Result, SchemaGateError};
use crate::validation::type_name;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Snapshot of every document in `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self.read()?.get(collection).cloned().unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Value>>>> {
        self.collections
            .read()
            .map_err(|_| SchemaGateError::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Value>>>> {
        self.collections
            .write()
            .map_err(|_| SchemaGateError::Storage("memory store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, collection: &str, mut document: Value) -> Result<String> {
        let Some(fields) = document.as_object_mut() else {
            return Err(SchemaGateError::Storage(format!(
                "Cannot insert a {} into '{collection}'",
                type_name(&document)
            )));
        };
        let id = ensure_id(fields);

        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get(ID_FIELD).map(id_string).as_deref() == Some(id.as_str())) {
            return Err(SchemaGateError::Storage(format!(
                "Duplicate _id '{id}' in '{collection}'"
            )));
        }
        docs.push(document);
        Ok(id)
    }

    fn update(
        &self,
        collection: &str,
        filter: &Value,
        modifier: &Value,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();

        let mut targets: Vec<usize> = docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| matches_filter(doc, filter))
            .map(|(i, _)| i)
            .collect();
        if !options.multi {
            targets.truncate(1);
        }

        if targets.is_empty() {
            if !options.upsert {
                return Ok(UpdateResult::default());
            }
            let mut document = seed_from_filter(filter)?;
            apply_modifier(&mut document, modifier, true)?;
            let id = match document.as_object_mut() {
                Some(fields) => ensure_id(fields),
                None => return Err(SchemaGateError::Storage("upsert produced a non-object".into())),
            };
            docs.push(document);
            return Ok(UpdateResult {
                matched: 0,
                modified: 0,
                upserted_id: Some(id),
            });
        }

        // Apply to copies first so a failing operator leaves every document untouched.
        let mut updated = Vec::with_capacity(targets.len());
        for &index in &targets {
            let mut doc = docs[index].clone();
            apply_modifier(&mut doc, modifier, false)?;
            updated.push((index, doc));
        }

        let mut result = UpdateResult {
            matched: targets.len() as u64,
            ..UpdateResult::default()
        };
        for (index, doc) in updated {
            if docs[index] != doc {
                docs[index] = doc;
                result.modified += 1;
            }
        }
        Ok(result)
    }

    fn remove(&self, collection: &str, filter: &Value) -> Result<u64> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !matches_filter(doc, filter));
        Ok((before - docs.len()) as u64)
    }

    fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>> {
        Ok(self
            .read()?
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| matches_filter(doc, filter)))
            .cloned())
    }
}

fn ensure_id(fields: &mut Map<String, Value>) -> String {
    if let Some(id) = fields.get(ID_FIELD) {
        return id_string(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    let mut out = Map::new();
    out.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    out.extend(std::mem::take(fields));
    *fields = out;
    id
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Filters ────────────────────────────────────────────────────────

/// `{}` matches everything; otherwise every key must hold.
pub fn matches_filter(doc: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(conditions) => conditions
            .iter()
            .all(|(path, condition)| matches_condition(get_path(doc, path), condition)),
        None => false,
    }
}

fn operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    condition
        .as_object()
        .filter(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> bool {
    let Some(operators) = operator_object(condition) else {
        return equals(value, condition);
    };
    operators.iter().all(|(operator, arg)| match operator.as_str() {
        "$eq" => equals(value, arg),
        "$ne" => !equals(value, arg),
        "$in" => arg.as_array().map_or(false, |c| c.iter().any(|a| equals(value, a))),
        "$nin" => arg.as_array().map_or(false, |c| !c.iter().any(|a| equals(value, a))),
        "$exists" => value.is_some() == arg.as_bool().unwrap_or(true),
        "$gt" => compare(value, arg) == Some(Ordering::Greater),
        "$gte" => matches!(compare(value, arg), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => compare(value, arg) == Some(Ordering::Less),
        "$lte" => matches!(compare(value, arg), Some(Ordering::Less | Ordering::Equal)),
        other => {
            log::debug!("Unsupported filter operator '{other}' never matches");
            false
        }
    })
}

/// Equality with array membership: `{tags: "a"}` matches `tags: ["a", "b"]`.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

/// Range comparison only between values of the same JSON type.
fn compare(value: Option<&Value>, arg: &Value) -> Option<Ordering> {
    let value = value?;
    let comparable = matches!(
        (value, arg),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
    );
    comparable.then(|| compare_values(value, arg))
}

/// Starting document of an upsert: the filter's plain equality fields.
fn seed_from_filter(filter: &Value) -> Result<Value> {
    let mut document = Value::Object(Map::new());
    if let Some(conditions) = filter.as_object() {
        for (path, condition) in conditions {
            if path.starts_with('$') {
                continue;
            }
            match operator_object(condition) {
                None => set_path(&mut document, path, condition.clone())?,
                Some(operators) => {
                    if let Some(value) = operators.get("$eq") {
                        set_path(&mut document, path, value.clone())?;
                    }
                }
            }
        }
    }
    Ok(document)
}

// ── Update operators ───────────────────────────────────────────────

fn apply_modifier(doc: &mut Value, modifier: &Value, inserting: bool) -> Result<()> {
    let Some(operators) = modifier.as_object() else {
        return Err(SchemaGateError::Storage(format!(
            "Update modifier must be a document, got {}",
            type_name(modifier)
        )));
    };

    for (operator, operand) in operators {
        let Some(fields) = operand.as_object() else {
            return Err(SchemaGateError::Storage(format!(
                "{operator} expects a document, got {}",
                type_name(operand)
            )));
        };
        for (path, value) in fields {
            if path == ID_FIELD && operator != "$setOnInsert" {
                continue;
            }
            match operator.as_str() {
                "$set" => set_path(doc, path, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(doc, path, value.clone())?;
                    }
                }
                "$unset" => {
                    remove_path(doc, path);
                }
                "$inc" => increment(doc, path, value)?,
                "$push" => push(doc, path, value)?,
                "$addToSet" => add_to_set(doc, path, value)?,
                "$pop" => pop(doc, path, value)?,
                "$pull" => pull(doc, path, value)?,
                other => {
                    return Err(SchemaGateError::Storage(format!(
                        "Unsupported update operator: {other}"
                    )))
                }
            }
        }
    }
    Ok(())
}

fn increment(doc: &mut Value, path: &str, by: &Value) -> Result<()> {
    if !by.is_number() {
        return Err(SchemaGateError::Storage(format!(
            "$inc: cannot increment '{path}' by a {}",
            type_name(by)
        )));
    }
    let current = get_path(doc, path).cloned().unwrap_or(Value::from(0));
    let next = match (current.as_i64(), by.as_i64()) {
        (Some(a), Some(b)) => Value::from(a.checked_add(b).ok_or_else(|| {
            SchemaGateError::Storage(format!("$inc: incrementing '{path}' by {b} overflows a 64-bit integer"))
        })?),
        _ => match (current.as_f64(), by.as_f64()) {
            (Some(a), Some(b)) => Value::from(a + b),
            _ => {
                return Err(SchemaGateError::Storage(format!(
                    "$inc: field '{path}' is a {}, not a number",
                    type_name(&current)
                )))
            }
        },
    };
    set_path(doc, path, next)
}

/// The array at `path`, created empty when missing.
fn array_at<'a>(doc: &'a mut Value, path: &str, operator: &str) -> Result<&'a mut Vec<Value>> {
    if get_path(doc, path).is_none() {
        set_path(doc, path, Value::Array(Vec::new()))?;
    }
    match get_path_mut(doc, path) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(SchemaGateError::Storage(format!(
            "{operator}: field '{path}' is a {}, not an array",
            type_name(other)
        ))),
        None => Err(SchemaGateError::Storage(format!(
            "{operator}: cannot create array at '{path}'"
        ))),
    }
}

fn each_items<'a>(
    operand: &'a Value,
    operator: &str,
) -> Result<(Vec<Value>, Option<&'a Map<String, Value>>)> {
    match operand.as_object().filter(|m| m.contains_key("$each")) {
        Some(modifiers) => match modifiers.get("$each") {
            Some(Value::Array(items)) => Ok((items.clone(), Some(modifiers))),
            _ => Err(SchemaGateError::Storage(format!(
                "{operator}: $each expects an array"
            ))),
        },
        None => Ok((vec![operand.clone()], None)),
    }
}

fn push(doc: &mut Value, path: &str, operand: &Value) -> Result<()> {
    let (items, modifiers) = each_items(operand, "$push")?;
    let position = modifiers.and_then(|m| m.get("$position")).and_then(Value::as_i64);
    let sort = modifiers.and_then(|m| m.get("$sort"));
    let slice = modifiers.and_then(|m| m.get("$slice")).and_then(Value::as_i64);

    let array = array_at(doc, path, "$push")?;
    match position {
        Some(position) => {
            let len = array.len() as i64;
            let at = if position < 0 { (len + position).max(0) } else { position.min(len) };
            let at = at as usize;
            for (offset, item) in items.into_iter().enumerate() {
                array.insert(at + offset, item);
            }
        }
        None => array.extend(items),
    }

    // Sort sees the whole array, then the slice trims it.
    if let Some(sort) = sort {
        sort_array(array, sort);
    }
    if let Some(slice) = slice {
        if slice < 0 {
            let keep = slice.unsigned_abs() as usize;
            if array.len() > keep {
                let excess = array.len() - keep;
                array.drain(..excess);
            }
        } else {
            array.truncate(slice as usize);
        }
    }
    Ok(())
}

fn sort_array(array: &mut [Value], order: &Value) {
    match order {
        Value::Object(fields) => array.sort_by(|a, b| {
            fields
                .iter()
                .map(|(field, direction)| {
                    let left = get_path(a, field).unwrap_or(&Value::Null);
                    let right = get_path(b, field).unwrap_or(&Value::Null);
                    directed(compare_values(left, right), direction)
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        direction => array.sort_by(|a, b| directed(compare_values(a, b), direction)),
    }
}

fn directed(ordering: Ordering, direction: &Value) -> Ordering {
    if direction.as_f64().map_or(false, |d| d < 0.0) {
        ordering.reverse()
    } else {
        ordering
    }
}

fn add_to_set(doc: &mut Value, path: &str, operand: &Value) -> Result<()> {
    let (items, _) = each_items(operand, "$addToSet")?;
    let array = array_at(doc, path, "$addToSet")?;
    for item in items {
        if !array.iter().any(|existing| values_equal(existing, &item)) {
            array.push(item);
        }
    }
    Ok(())
}

fn pop(doc: &mut Value, path: &str, direction: &Value) -> Result<()> {
    let from_end = match direction.as_f64() {
        Some(d) if d == 1.0 => true,
        Some(d) if d == -1.0 => false,
        _ => {
            return Err(SchemaGateError::Storage(format!(
                "$pop: expected 1 or -1 for '{path}', got {direction}"
            )))
        }
    };
    match get_path_mut(doc, path) {
        None => Ok(()),
        Some(Value::Array(items)) => {
            if from_end {
                items.pop();
            } else if !items.is_empty() {
                items.remove(0);
            }
            Ok(())
        }
        Some(other) => Err(SchemaGateError::Storage(format!(
            "$pop: field '{path}' is a {}, not an array",
            type_name(other)
        ))),
    }
}

fn pull(doc: &mut Value, path: &str, condition: &Value) -> Result<()> {
    match get_path_mut(doc, path) {
        None => Ok(()),
        Some(Value::Array(items)) => {
            items.retain(|item| !pull_matches(item, condition));
            Ok(())
        }
        Some(other) => Err(SchemaGateError::Storage(format!(
            "$pull: field '{path}' is a {}, not an array",
            type_name(other)
        ))),
    }
}

/// `$pull` conditions: an operator document, a field-match document for
/// object elements, or a plain value compared by equality.
fn pull_matches(item: &Value, condition: &Value) -> bool {
    if operator_object(condition).is_some() {
        return matches_condition(Some(item), condition);
    }
    match (item, condition) {
        (Value::Object(_), Value::Object(_)) => matches_filter(item, condition),
        _ => values_equal(item, condition),
    }
}
