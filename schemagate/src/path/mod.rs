//! Dotted-path resolution through the schema tree.
//!
//! `resolve(schema, "address.city")` walks object fields, unwrapping
//! optional/nullable/default wrappers on the way, and descends into array
//! elements on numeric segments (`scores.0.value`). Anything below an `any`
//! node or an undeclared key of a passthrough object resolves to `any`.

use crate::document::is_index;
use crate::schema::{FieldSchema, Schema, UnknownKeys};

static ANY: FieldSchema = FieldSchema::Any;

/// Resolve a dotted path to the descriptor that validates its value.
/// `None` means the schema does not declare the path.
pub fn resolve<'a>(schema: &'a Schema, path: &str) -> Option<&'a FieldSchema> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = match schema.field(first) {
        Some(field) => field,
        None if schema.root().unknown_keys == UnknownKeys::Passthrough => &ANY,
        None => return None,
    };
    for segment in segments {
        current = descend(current, segment)?;
    }
    Some(strip_optional(current))
}

fn descend<'a>(schema: &'a FieldSchema, segment: &str) -> Option<&'a FieldSchema> {
    match schema.unwrapped() {
        FieldSchema::Object(object) => match object.field(segment) {
            Some(field) => Some(field),
            None if object.unknown_keys == UnknownKeys::Passthrough => Some(&ANY),
            None => None,
        },
        FieldSchema::Array(array) if is_index(segment) => Some(&array.element),
        FieldSchema::Union(candidates) => candidates.iter().find_map(|c| descend(c, segment)),
        FieldSchema::Any => Some(&ANY),
        _ => None,
    }
}

/// Drop the "may be absent" wrappers but keep nullability: a value written to
/// an explicit path is present by definition.
fn strip_optional(schema: &FieldSchema) -> &FieldSchema {
    match schema {
        FieldSchema::Optional(inner) | FieldSchema::Default(inner, _) => strip_optional(inner),
        other => other,
    }
}

/// Element descriptor of an array-typed descriptor.
pub fn array_element(schema: &FieldSchema) -> Option<&FieldSchema> {
    match schema.unwrapped() {
        FieldSchema::Array(array) => Some(&array.element),
        _ => None,
    }
}

/// Whether a path uses positional operators (`$`, `$[]`, `$[ident]`), which
/// cannot be checked against the schema.
pub fn has_positional_segment(path: &str) -> bool {
    path.split('.').any(|s| s == "$" || s.starts_with("$["))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectSchema;

    fn schema() -> Schema {
        let score = ObjectSchema::new()
            .with_field("value", FieldSchema::number())
            .with_field("label", FieldSchema::string().optional());
        let address = ObjectSchema::new()
            .with_field("city", FieldSchema::string())
            .with_field("zip", FieldSchema::string().nullable().optional());
        Schema::new(
            ObjectSchema::new()
                .with_field("name", FieldSchema::string())
                .with_field("address", FieldSchema::object(address).optional())
                .with_field("scores", FieldSchema::array(FieldSchema::object(score)).optional())
                .with_field("meta", FieldSchema::object(ObjectSchema::new().passthrough()))
                .with_field("payload", FieldSchema::Any)
                .with_field(
                    "contact",
                    FieldSchema::Union(vec![
                        FieldSchema::string(),
                        FieldSchema::object(ObjectSchema::new().with_field("email", FieldSchema::string())),
                    ]),
                ),
        )
    }

    #[test]
    fn test_resolve_top_level_and_nested() {
        let schema = schema();
        assert_eq!(resolve(&schema, "name"), Some(&FieldSchema::string()));
        assert_eq!(resolve(&schema, "address.city"), Some(&FieldSchema::string()));
        assert!(matches!(resolve(&schema, "address"), Some(FieldSchema::Object(_))));
    }

    #[test]
    fn test_resolve_keeps_nullable() {
        let schema = schema();
        assert_eq!(
            resolve(&schema, "address.zip"),
            Some(&FieldSchema::string().nullable())
        );
    }

    #[test]
    fn test_resolve_array_elements() {
        let schema = schema();
        assert!(matches!(resolve(&schema, "scores.3"), Some(FieldSchema::Object(_))));
        assert_eq!(resolve(&schema, "scores.0.value"), Some(&FieldSchema::number()));
        assert_eq!(resolve(&schema, "scores.first"), None);
    }

    #[test]
    fn test_resolve_not_found() {
        let schema = schema();
        assert_eq!(resolve(&schema, "nope"), None);
        assert_eq!(resolve(&schema, "address.street"), None);
        assert_eq!(resolve(&schema, "name.first"), None);
    }

    #[test]
    fn test_resolve_free_form() {
        let schema = schema();
        assert_eq!(resolve(&schema, "meta.anything"), Some(&FieldSchema::Any));
        assert_eq!(resolve(&schema, "payload.a.b.c"), Some(&FieldSchema::Any));
    }

    #[test]
    fn test_resolve_through_union() {
        let schema = schema();
        assert_eq!(resolve(&schema, "contact.email"), Some(&FieldSchema::string()));
    }

    #[test]
    fn test_array_element() {
        let schema = schema();
        assert!(array_element(schema.field("scores").unwrap()).is_some());
        assert!(array_element(schema.field("name").unwrap()).is_none());
    }

    #[test]
    fn test_positional_segments() {
        assert!(has_positional_segment("scores.$.value"));
        assert!(has_positional_segment("scores.$[].value"));
        assert!(has_positional_segment("scores.$[elem].value"));
        assert!(!has_positional_segment("scores.0.value"));
    }
}
