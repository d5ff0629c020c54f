mod issue;

pub use issue::{
    join_path, AggregatedError, EngineIssue, IssueCollector, IssueKind, PathKey, ValidationIssue,
};

use crate::schema::{FieldSchema, NumberRules, ObjectSchema, Schema, StringRules, UnknownKeys};
use serde_json::{Map, Value};

pub type ParseOutcome = std::result::Result<Value, Vec<EngineIssue>>;

/// Validate a present value against a descriptor.
pub fn safe_parse(schema: &FieldSchema, value: &Value) -> ParseOutcome {
    let mut parser = Parser::default();
    let parsed = parser.present(schema, value);
    parser.finish(parsed)
}

/// Validate a whole document against a collection schema.
pub fn safe_parse_document(schema: &Schema, document: &Value) -> ParseOutcome {
    let mut parser = Parser::default();
    let parsed = parser.object(schema.root(), document);
    parser.finish(parsed)
}

/// Like [`safe_parse`], with the issues aggregated into one error.
pub fn parse(schema: &FieldSchema, value: &Value) -> std::result::Result<Value, AggregatedError> {
    safe_parse(schema, value).map_err(|issues| {
        let mut collector = IssueCollector::new();
        collector.extend_engine("", issues);
        AggregatedError::new(collector.into_issues())
    })
}

#[derive(Default)]
struct Parser {
    path: Vec<PathKey>,
    issues: Vec<EngineIssue>,
}

impl Parser {
    fn finish(self, parsed: Option<Value>) -> ParseOutcome {
        match parsed {
            Some(value) if self.issues.is_empty() => Ok(value),
            _ => Err(self.issues),
        }
    }

    fn issue(&mut self, kind: IssueKind, message: String) {
        self.issues.push(EngineIssue {
            path: self.path.clone(),
            kind,
            message,
        });
    }

    fn invalid_type(&mut self, expected: &str, value: &Value) {
        self.issue(
            IssueKind::InvalidType,
            format!("expected {expected}, got {}", type_name(value)),
        );
    }

    /// A keyed slot that may be absent. `None` means "leave the key out".
    fn slot(&mut self, schema: &FieldSchema, value: Option<&Value>) -> Option<Value> {
        match (schema, value) {
            (_, Some(v)) => self.present(schema, v),
            (FieldSchema::Optional(_), None) => None,
            (FieldSchema::Default(_, default), None) => Some(default.clone()),
            (FieldSchema::Nullable(inner), None) => self.slot(inner, None),
            (_, None) => {
                let message = match self.path.last() {
                    Some(PathKey::Key(name)) => format!("Required field '{name}' is missing"),
                    _ => "Required value is missing".to_string(),
                };
                self.issue(IssueKind::Required, message);
                None
            }
        }
    }

    fn present(&mut self, schema: &FieldSchema, value: &Value) -> Option<Value> {
        match schema {
            FieldSchema::Optional(inner) | FieldSchema::Default(inner, _) => {
                self.present(inner, value)
            }
            FieldSchema::Nullable(inner) => {
                if value.is_null() {
                    Some(Value::Null)
                } else {
                    self.present(inner, value)
                }
            }
            FieldSchema::String(rules) => self.string(rules, value),
            FieldSchema::Number(rules) => self.number(rules, value),
            FieldSchema::Boolean => {
                if value.is_boolean() {
                    Some(value.clone())
                } else {
                    self.invalid_type("boolean", value);
                    None
                }
            }
            FieldSchema::Date => match value.as_str() {
                Some(s) if is_date(s) => Some(value.clone()),
                Some(s) => {
                    self.issue(IssueKind::InvalidDate, format!("'{s}' is not a valid date"));
                    None
                }
                None => {
                    self.invalid_type("date string", value);
                    None
                }
            },
            FieldSchema::Literal(expected) => {
                if value == expected {
                    Some(value.clone())
                } else {
                    self.issue(
                        IssueKind::InvalidLiteral,
                        format!("expected literal {expected}, got {value}"),
                    );
                    None
                }
            }
            FieldSchema::Any => Some(value.clone()),
            FieldSchema::Object(object) => self.object(object, value),
            FieldSchema::Array(array) => {
                let Some(items) = value.as_array() else {
                    self.invalid_type("array", value);
                    return None;
                };
                if let Some(min) = array.min_items {
                    if items.len() < min {
                        self.issue(
                            IssueKind::TooSmall,
                            format!("expected at least {min} item(s), got {}", items.len()),
                        );
                    }
                }
                if let Some(max) = array.max_items {
                    if items.len() > max {
                        self.issue(
                            IssueKind::TooBig,
                            format!("expected at most {max} item(s), got {}", items.len()),
                        );
                    }
                }
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    self.path.push(PathKey::Index(index));
                    if let Some(parsed) = self.present(&array.element, item) {
                        out.push(parsed);
                    }
                    self.path.pop();
                }
                Some(Value::Array(out))
            }
            FieldSchema::Union(candidates) => {
                for candidate in candidates {
                    let mut attempt = Parser {
                        path: self.path.clone(),
                        issues: Vec::new(),
                    };
                    if let Some(parsed) = attempt.present(candidate, value) {
                        if attempt.issues.is_empty() {
                            return Some(parsed);
                        }
                    }
                }
                let expected: Vec<&str> = candidates.iter().map(FieldSchema::type_name).collect();
                self.issue(
                    IssueKind::InvalidUnion,
                    format!(
                        "{} matched none of the variants ({})",
                        type_name(value),
                        expected.join(" | ")
                    ),
                );
                None
            }
        }
    }

    fn object(&mut self, object: &ObjectSchema, value: &Value) -> Option<Value> {
        let Some(map) = value.as_object() else {
            self.invalid_type("object", value);
            return None;
        };

        let mut out = Map::new();
        for (name, field) in object.fields() {
            self.path.push(PathKey::Key(name.to_string()));
            if let Some(parsed) = self.slot(field, map.get(name)) {
                out.insert(name.to_string(), parsed);
            }
            self.path.pop();
        }

        if object.unknown_keys == UnknownKeys::Passthrough {
            for (key, extra) in map {
                if object.field(key).is_none() {
                    out.insert(key.clone(), extra.clone());
                }
            }
        }

        Some(Value::Object(out))
    }

    fn string(&mut self, rules: &StringRules, value: &Value) -> Option<Value> {
        let Some(s) = value.as_str() else {
            self.invalid_type("string", value);
            return None;
        };

        if let Some(enum_values) = &rules.enum_values {
            if !enum_values.iter().any(|allowed| allowed == s) {
                self.issue(
                    IssueKind::InvalidEnumValue,
                    format!("value '{s}' is not in enum: {enum_values:?}"),
                );
            }
        }
        if let Some(pattern) = &rules.pattern {
            if !pattern.is_match(s) {
                self.issue(
                    IssueKind::InvalidString,
                    format!("value '{s}' does not match pattern '{}'", pattern.as_str()),
                );
            }
        }
        let length = s.chars().count();
        if let Some(min) = rules.min_length {
            if length < min {
                self.issue(
                    IssueKind::TooSmall,
                    format!("expected at least {min} character(s), got {length}"),
                );
            }
        }
        if let Some(max) = rules.max_length {
            if length > max {
                self.issue(
                    IssueKind::TooBig,
                    format!("expected at most {max} character(s), got {length}"),
                );
            }
        }
        Some(value.clone())
    }

    fn number(&mut self, rules: &NumberRules, value: &Value) -> Option<Value> {
        let Some(n) = value.as_f64() else {
            self.invalid_type(if rules.integer { "integer" } else { "number" }, value);
            return None;
        };

        if rules.integer && n.fract() != 0.0 {
            self.issue(IssueKind::NotInteger, format!("expected integer, got {n}"));
        }
        if let Some(min) = rules.min {
            if n < min {
                self.issue(IssueKind::TooSmall, format!("expected >= {min}, got {n}"));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                self.issue(IssueKind::TooBig, format!("expected <= {max}, got {n}"));
            }
        }
        Some(value.clone())
    }
}

/// RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
fn is_date(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
