//! Operator translator: validates the payload of a write against the
//! collection schema and rewrites it with parsed values.
//!
//! Inserts are parsed as a whole document. Updates are checked operator by
//! operator, in modifier key order:
//!
//! - `$set` / `$setOnInsert` validate each key against the view picked by
//!   [`derive_mode`]; dotted keys are validated against the resolved leaf.
//!   Undeclared keys are dropped, not reported.
//! - `$push` / `$addToSet` / `$pop` require a declared array target.
//! - Every other `$` operator is forwarded untouched.
//!
//! All issues of one write end up in a single [`AggregatedError`].

mod array;
mod operators;

pub use operators::Operator;

use crate::binding::SchemaViews;
use crate::document::{remove_key, ID_FIELD};
use crate::path::{has_positional_segment, resolve};
use crate::schema::{FieldSchema, Schema, Settings, UnknownKeys};
use crate::validation::{
    safe_parse, safe_parse_document, type_name, AggregatedError, IssueCollector, IssueKind,
};
use crate::write::{derive_mode, SchemaView, ValidationMode, WriteRequest, WriteTarget};
use serde_json::{Map, Value};

const SET_ON_INSERT: &str = "$setOnInsert";

/// Validate and rewrite `request` in place.
pub fn translate(views: &SchemaViews, request: &mut WriteRequest) -> Result<(), AggregatedError> {
    let mut issues = IssueCollector::new();
    match (derive_mode(request.kind), &mut request.target) {
        (ValidationMode::Document(view), WriteTarget::Document(document)) => {
            translate_document(views.view(view), document, &mut issues)
        }
        (
            ValidationMode::Modifier {
                set,
                set_on_insert,
                require_on_insert,
            },
            WriteTarget::Modifier { modifier, .. },
        ) => {
            let got = type_name(modifier);
            match modifier.as_object_mut() {
                Some(operators) => {
                    translate_operators(views, set, set_on_insert, operators, &mut issues);
                    if require_on_insert {
                        check_insert_completeness(views.strict(), operators, &mut issues);
                    }
                }
                None => issues.push(
                    "",
                    IssueKind::InvalidModifier,
                    format!("update modifier must be a document, got {got}"),
                ),
            }
        }
        (_, _) => issues.push(
            "",
            IssueKind::InvalidModifier,
            "inserts take a document and updates take a modifier",
        ),
    }
    issues.finish()
}

fn translate_document(schema: &Schema, document: &mut Value, issues: &mut IssueCollector) {
    let id = document.get(ID_FIELD).cloned();
    match safe_parse_document(schema, document) {
        Ok(Value::Object(parsed)) => {
            let mut out = Map::new();
            if let Some(id) = id.filter(|_| !parsed.contains_key(ID_FIELD)) {
                out.insert(ID_FIELD.to_string(), id);
            }
            out.extend(parsed);
            *document = Value::Object(out);
        }
        Ok(parsed) => *document = parsed,
        Err(engine) => issues.extend_engine("", engine),
    }
}

fn translate_operators(
    views: &SchemaViews,
    set: SchemaView,
    set_on_insert: SchemaView,
    operators: &mut Map<String, Value>,
    issues: &mut IssueCollector,
) {
    let mut emptied = Vec::new();
    for (key, operand) in operators.iter_mut() {
        let Some(operator) = Operator::classify(key) else {
            issues.push(
                key.as_str(),
                IssueKind::InvalidModifier,
                format!("'{key}' is not an update operator; schema-bound collections only accept operator updates"),
            );
            continue;
        };
        if operator == Operator::PassThrough {
            log::debug!("{key} forwarded without schema checks");
            continue;
        }

        let got = type_name(operand);
        let Some(fields) = operand.as_object_mut() else {
            issues.push(
                key.as_str(),
                IssueKind::InvalidModifier,
                format!("{key} expects a document of fields, got {got}"),
            );
            continue;
        };

        match operator {
            Operator::Set => assign(views, set, operator, fields, issues),
            Operator::SetOnInsert => assign(views, set_on_insert, operator, fields, issues),
            Operator::Push | Operator::AddToSet => {
                array::check_push(views.strict(), operator, fields, issues)
            }
            Operator::Pop => array::check_pop(views.strict(), fields, issues),
            Operator::PassThrough => {}
        }

        if matches!(operator, Operator::Set | Operator::SetOnInsert) && fields.is_empty() {
            emptied.push(key.clone());
        }
    }
    for key in emptied {
        remove_key(operators, &key);
    }
}

/// `$set` / `$setOnInsert`: plain keys go through `view`, dotted keys through
/// the strict leaf they resolve to.
fn assign(
    views: &SchemaViews,
    view: SchemaView,
    operator: Operator,
    fields: &mut Map<String, Value>,
    issues: &mut IssueCollector,
) {
    let schema = views.view(view);
    let open = schema.root().unknown_keys == UnknownKeys::Passthrough;
    let mut kept = Map::new();

    for (path, value) in std::mem::take(fields) {
        if has_positional_segment(&path) {
            log::debug!("{operator}: positional path '{path}' forwarded without schema checks");
            kept.insert(path, value);
            continue;
        }
        if operator == Operator::SetOnInsert && path == ID_FIELD {
            kept.insert(path, value);
            continue;
        }

        let descriptor = if path.contains('.') {
            resolve(views.strict(), &path)
        } else {
            schema.field(&path)
        };
        match descriptor {
            Some(descriptor) => match safe_parse(descriptor, &value) {
                Ok(parsed) => {
                    kept.insert(path, parsed);
                }
                Err(engine) => issues.extend_engine(&path, engine),
            },
            None if open => {
                kept.insert(path, value);
            }
            None => log::debug!("{operator}: dropping undeclared path '{path}'"),
        }
    }
    *fields = kept;
}

/// An upsert may insert: every required top-level field must come from
/// `$set` or `$setOnInsert`. Defaults for fields supplied by neither are
/// added to `$setOnInsert`.
fn check_insert_completeness(
    schema: &Schema,
    operators: &mut Map<String, Value>,
    issues: &mut IssueCollector,
) {
    for name in schema.required_fields() {
        if !supplies(operators, name) {
            issues.push(
                name,
                IssueKind::Required,
                format!("Required field '{name}' must be supplied by $set or $setOnInsert on upsert"),
            );
        }
    }

    let defaults: Vec<(String, Value)> = schema
        .root()
        .fields()
        .filter_map(|(name, field)| match field {
            FieldSchema::Default(_, value) if !supplies(operators, name) => {
                Some((name.to_string(), value.clone()))
            }
            _ => None,
        })
        .collect();
    if defaults.is_empty() {
        return;
    }
    let set_on_insert = operators
        .entry(SET_ON_INSERT)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(fields) = set_on_insert.as_object_mut() {
        fields.extend(defaults);
    }
}

fn supplies(operators: &Map<String, Value>, name: &str) -> bool {
    ["$set", SET_ON_INSERT].iter().any(|operator| {
        operators
            .get(*operator)
            .and_then(Value::as_object)
            .map_or(false, |fields| {
                fields.keys().any(|key| {
                    key == name || key.strip_prefix(name).map_or(false, |rest| rest.starts_with('.'))
                })
            })
    })
}

/// Updates on the identity collection that only touch the credential subtree
/// are housekeeping and skip validation entirely.
pub fn is_credential_update(settings: &Settings, collection: &str, modifier: &Value) -> bool {
    if collection != settings.identity_collection {
        return false;
    }
    let Some(operators) = modifier.as_object() else {
        return false;
    };
    let credential = settings.credential_field.as_str();
    let prefix = format!("{credential}.");
    !operators.is_empty()
        && operators.iter().all(|(operator, operand)| {
            operator.starts_with('$')
                && operand.as_object().map_or(false, |fields| {
                    !fields.is_empty()
                        && fields.keys().all(|key| key == credential || key.starts_with(&prefix))
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectSchema;
    use crate::write::WriteOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn views() -> SchemaViews {
        let address = ObjectSchema::new()
            .with_field("city", FieldSchema::string())
            .with_field("zip", FieldSchema::string().optional());
        SchemaViews::new(Schema::new(
            ObjectSchema::new()
                .with_field("name", FieldSchema::string())
                .with_field("age", FieldSchema::number())
                .with_field("tags", FieldSchema::array(FieldSchema::string()).optional())
                .with_field("address", FieldSchema::object(address).optional())
                .with_field("active", FieldSchema::Boolean.with_default(json!(true))),
        ))
    }

    fn update(modifier: Value) -> WriteRequest {
        WriteRequest::update(json!({}), modifier, WriteOptions::new())
    }

    fn upsert(modifier: Value) -> WriteRequest {
        WriteRequest::update(json!({}), modifier, WriteOptions::new().upsert())
    }

    fn issue_paths(err: &AggregatedError) -> Vec<(&str, IssueKind)> {
        err.issues.iter().map(|i| (i.path.as_str(), i.kind)).collect()
    }

    #[test]
    fn test_insert_strips_and_defaults() {
        let mut request = WriteRequest::insert(
            json!({ "_id": "x1", "name": "A", "age": 3, "junk": 1 }),
            WriteOptions::new(),
        );
        translate(&views(), &mut request).unwrap();
        assert_eq!(
            request.target,
            WriteTarget::Document(json!({ "_id": "x1", "name": "A", "age": 3, "active": true }))
        );
    }

    #[test]
    fn test_insert_type_rejection() {
        let mut request = WriteRequest::insert(json!({ "name": "John", "age": "x" }), WriteOptions::new());
        let err = translate(&views(), &mut request).unwrap_err();
        assert_eq!(err.first().unwrap().path, "age");
        assert_eq!(err.first().unwrap().kind, IssueKind::InvalidType);
    }

    #[test]
    fn test_partial_set_succeeds() {
        let mut request = update(json!({ "$set": { "age": 31 } }));
        translate(&views(), &mut request).unwrap();
        assert_eq!(request.modifier(), Some(&json!({ "$set": { "age": 31 } })));
    }

    #[test]
    fn test_set_nested_object_is_deep_partial() {
        let mut request = update(json!({ "$set": { "address": { "zip": "10001" } } }));
        translate(&views(), &mut request).unwrap();
    }

    #[test]
    fn test_set_dotted_path_uses_leaf() {
        let mut request = update(json!({ "$set": { "address.city": 5, "address.nowhere": 1 } }));
        let err = translate(&views(), &mut request).unwrap_err();
        assert_eq!(issue_paths(&err), vec![("address.city", IssueKind::InvalidType)]);

        let mut request = update(json!({ "$set": { "address.city": "NYC", "address.nowhere": 1 } }));
        translate(&views(), &mut request).unwrap();
        assert_eq!(request.modifier(), Some(&json!({ "$set": { "address.city": "NYC" } })));
    }

    #[test]
    fn test_stripped_operator_is_removed() {
        let mut request = update(json!({ "$set": { "junk": 1 }, "$inc": { "age": 1 } }));
        translate(&views(), &mut request).unwrap();
        assert_eq!(request.modifier(), Some(&json!({ "$inc": { "age": 1 } })));
    }

    #[test]
    fn test_replacement_update_rejected() {
        let mut request = update(json!({ "name": "B", "$set": "oops" }));
        let err = translate(&views(), &mut request).unwrap_err();
        assert_eq!(
            issue_paths(&err),
            vec![("name", IssueKind::InvalidModifier), ("$set", IssueKind::InvalidModifier)]
        );
    }

    #[test]
    fn test_issue_order_follows_operators_then_fields() {
        let mut request = update(json!({
            "$pop": { "tags": 3 },
            "$set": { "name": 1, "age": "old" },
            "$push": { "age": 1 }
        }));
        let err = translate(&views(), &mut request).unwrap_err();
        assert_eq!(
            issue_paths(&err),
            vec![
                ("tags", IssueKind::InvalidArrayPopOperation),
                ("name", IssueKind::InvalidType),
                ("age", IssueKind::InvalidType),
                ("age", IssueKind::InvalidArrayField),
            ]
        );
        assert!(err.message.starts_with("validation failed with 4 issue(s): tags:"));
    }

    #[test]
    fn test_upsert_requires_fields_on_insert() {
        let mut request = upsert(json!({ "$set": { "age": 2 } }));
        let err = translate(&views(), &mut request).unwrap_err();
        assert_eq!(issue_paths(&err), vec![("name", IssueKind::Required)]);
    }

    #[test]
    fn test_upsert_complete_adds_defaults() {
        let mut request = upsert(json!({
            "$set": { "age": 2 },
            "$setOnInsert": { "name": "A" }
        }));
        translate(&views(), &mut request).unwrap();
        assert_eq!(
            request.modifier(),
            Some(&json!({
                "$set": { "age": 2 },
                "$setOnInsert": { "name": "A", "active": true }
            }))
        );
    }

    #[test]
    fn test_upsert_dotted_key_supplies_root() {
        let views = SchemaViews::new(Schema::new(
            ObjectSchema::new().with_field(
                "profile",
                FieldSchema::object(ObjectSchema::new().with_field("nick", FieldSchema::string())),
            ),
        ));
        let mut request = upsert(json!({ "$set": { "profile.nick": "n" } }));
        translate(&views, &mut request).unwrap();
    }

    #[test]
    fn test_set_on_insert_is_partial_not_deep() {
        let mut request = upsert(json!({
            "$setOnInsert": { "name": "A", "age": 1, "address": { "zip": "1" } }
        }));
        let err = translate(&views(), &mut request).unwrap_err();
        assert_eq!(issue_paths(&err), vec![("address.city", IssueKind::Required)]);
    }

    #[test]
    fn test_credential_update_detection() {
        let settings = Settings::default();
        let housekeeping = json!({ "$set": { "services.resume.loginTokens": [] }, "$unset": { "services.password": "" } });
        assert!(is_credential_update(&settings, "users", &housekeeping));
        assert!(!is_credential_update(&settings, "posts", &housekeeping));
        assert!(!is_credential_update(
            &settings,
            "users",
            &json!({ "$set": { "services.x": 1, "name": "A" } })
        ));
        assert!(!is_credential_update(&settings, "users", &json!({ "$set": { "servicesX": 1 } })));
        assert!(!is_credential_update(&settings, "users", &json!({})));
    }
}
