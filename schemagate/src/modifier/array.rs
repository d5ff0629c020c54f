// Array operator policies: $push / $addToSet operands and $pop directions

use super::operators::Operator;
use crate::path::{array_element, has_positional_segment, resolve};
use crate::schema::{FieldSchema, Schema};
use crate::validation::{safe_parse, type_name, IssueCollector, IssueKind};
use serde_json::{Map, Value};

const EACH: &str = "$each";

/// Validate `$push`/`$addToSet` operands against the element descriptor of
/// each targeted array, rewriting them with the parsed elements.
pub(super) fn check_push(
    schema: &Schema,
    operator: Operator,
    fields: &mut Map<String, Value>,
    issues: &mut IssueCollector,
) {
    for (path, operand) in fields.iter_mut() {
        if has_positional_segment(path) {
            log::debug!("{operator}: positional path '{path}' passed through");
            continue;
        }
        let Some(element) = element_of(schema, operator, path, issues) else {
            continue;
        };

        let composite = operand.as_object().map_or(false, |m| m.contains_key(EACH));
        if composite {
            if let Some(modifiers) = operand.as_object_mut() {
                check_composite(operator, path, element, modifiers, issues);
            }
            continue;
        }
        match safe_parse(element, operand) {
            Ok(parsed) => *operand = parsed,
            Err(engine) => issues.extend_engine(path, engine),
        }
    }
}

/// `{ $each: [...], $position?, $slice?, $sort? }`
fn check_composite(
    operator: Operator,
    path: &str,
    element: &FieldSchema,
    modifiers: &mut Map<String, Value>,
    issues: &mut IssueCollector,
) {
    for (key, value) in modifiers.iter_mut() {
        let at = format!("{path}.{key}");
        match key.as_str() {
            EACH => {
                let parsed = match value.as_array() {
                    Some(items) => {
                        let mut parsed = Vec::with_capacity(items.len());
                        for (index, item) in items.iter().enumerate() {
                            match safe_parse(element, item) {
                                Ok(v) => parsed.push(v),
                                Err(engine) => issues.extend_engine(&format!("{at}.{index}"), engine),
                            }
                        }
                        Some(parsed)
                    }
                    None => {
                        issues.push(
                            at.as_str(),
                            IssueKind::InvalidType,
                            format!("expected array, got {}", type_name(value)),
                        );
                        None
                    }
                };
                if let Some(parsed) = parsed {
                    *value = Value::Array(parsed);
                }
            }
            "$position" | "$slice" if operator == Operator::Push => {
                if !is_integer(value) {
                    issues.push(
                        at.as_str(),
                        IssueKind::InvalidType,
                        format!("expected integer, got {}", type_name(value)),
                    );
                }
            }
            "$sort" if operator == Operator::Push => {
                if !is_sort_order(value) {
                    issues.push(
                        at.as_str(),
                        IssueKind::InvalidType,
                        "expected 1, -1 or a document of field directions",
                    );
                }
            }
            other => issues.push(
                path,
                IssueKind::UnrecognizedKeys,
                format!("Unrecognized key '{other}' in {operator} modifier"),
            ),
        }
    }
}

/// Require every `$pop` target to be an array and every operand to be 1 or -1.
pub(super) fn check_pop(schema: &Schema, fields: &Map<String, Value>, issues: &mut IssueCollector) {
    for (path, operand) in fields {
        if has_positional_segment(path) {
            log::debug!("$pop: positional path '{path}' passed through");
            continue;
        }
        if element_of(schema, Operator::Pop, path, issues).is_none() {
            continue;
        }
        if !is_direction(operand) {
            issues.push(
                path.as_str(),
                IssueKind::InvalidArrayPopOperation,
                format!("$pop expects 1 or -1, got {operand}"),
            );
        }
    }
}

fn element_of<'a>(
    schema: &'a Schema,
    operator: Operator,
    path: &str,
    issues: &mut IssueCollector,
) -> Option<&'a FieldSchema> {
    let Some(target) = resolve(schema, path) else {
        issues.push(
            path,
            IssueKind::InvalidField,
            format!("{operator}: field '{path}' is not declared in the schema"),
        );
        return None;
    };
    if matches!(target.unwrapped(), FieldSchema::Any) {
        return Some(target);
    }
    let element = array_element(target);
    if element.is_none() {
        issues.push(
            path,
            IssueKind::InvalidArrayField,
            format!("{operator}: field '{path}' is a {}, not an array", target.type_name()),
        );
    }
    element
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64() || value.as_f64().map_or(false, |f| f.fract() == 0.0)
}

fn is_direction(value: &Value) -> bool {
    matches!(value.as_f64(), Some(d) if d == 1.0 || d == -1.0)
}

fn is_sort_order(value: &Value) -> bool {
    is_direction(value)
        || value
            .as_object()
            .map_or(false, |fields| !fields.is_empty() && fields.values().all(is_direction))
}
