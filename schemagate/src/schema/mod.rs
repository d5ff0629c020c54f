mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::{
    CollectionDefinition, FieldDefinition, FieldMap, FieldType, ItemType, SchemaDefinition,
    Settings,
};

use crate::error::{Result, SchemaGateError};
use regex::Regex;
use serde_json::{json, Value};

/// A single node in the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSchema {
    String(StringRules),
    Number(NumberRules),
    Boolean,
    Date,
    Literal(Value),
    Any,
    Object(ObjectSchema),
    Array(ArraySchema),
    /// Value may be absent
    Optional(Box<FieldSchema>),
    /// Value may be `null`
    Nullable(Box<FieldSchema>),
    /// Value is filled in when absent (strict view only)
    Default(Box<FieldSchema>, Value),
    /// First candidate that accepts the value wins
    Union(Vec<FieldSchema>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringRules {
    pub enum_values: Option<Vec<String>>,
    pub pattern: Option<Pattern>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumberRules {
    pub integer: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub element: Box<FieldSchema>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// What an object does with keys it does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    #[default]
    Strip,
    Passthrough,
}

/// An object node: declared fields in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, FieldSchema)>,
    pub unknown_keys: UnknownKeys,
}

/// Compiled regular expression compared by source text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(Pattern)
            .map_err(|e| SchemaGateError::Schema(format!("Invalid pattern '{source}': {e}")))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl ObjectSchema {
    pub fn new() -> Self {
        ObjectSchema::default()
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.insert(name.into(), schema);
        self
    }

    pub fn passthrough(mut self) -> Self {
        self.unknown_keys = UnknownKeys::Passthrough;
        self
    }

    /// Insert a field, replacing an existing one of the same name in place.
    pub fn insert(&mut self, name: String, schema: FieldSchema) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = schema,
            None => self.fields.push((name, schema)),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    fn map_fields(&self, f: impl Fn(&FieldSchema) -> FieldSchema) -> ObjectSchema {
        ObjectSchema {
            fields: self.fields.iter().map(|(n, s)| (n.clone(), f(s))).collect(),
            unknown_keys: self.unknown_keys,
        }
    }
}

impl FieldSchema {
    pub fn string() -> Self {
        FieldSchema::String(StringRules::default())
    }

    pub fn number() -> Self {
        FieldSchema::Number(NumberRules::default())
    }

    pub fn integer() -> Self {
        FieldSchema::Number(NumberRules {
            integer: true,
            ..NumberRules::default()
        })
    }

    pub fn array(element: FieldSchema) -> Self {
        FieldSchema::Array(ArraySchema {
            element: Box::new(element),
            min_items: None,
            max_items: None,
        })
    }

    pub fn object(object: ObjectSchema) -> Self {
        FieldSchema::Object(object)
    }

    pub fn optional(self) -> Self {
        match self {
            FieldSchema::Optional(_) => self,
            other => FieldSchema::Optional(Box::new(other)),
        }
    }

    pub fn nullable(self) -> Self {
        FieldSchema::Nullable(Box::new(self))
    }

    pub fn with_default(self, value: Value) -> Self {
        FieldSchema::Default(Box::new(self), value)
    }

    /// Strip every optional/nullable/default wrapper.
    pub fn unwrapped(&self) -> &FieldSchema {
        let mut current = self;
        loop {
            match current {
                FieldSchema::Optional(inner)
                | FieldSchema::Nullable(inner)
                | FieldSchema::Default(inner, _) => current = inner,
                other => return other,
            }
        }
    }

    /// Whether an absent value is acceptable (optional or defaulted).
    pub fn accepts_missing(&self) -> bool {
        match self {
            FieldSchema::Optional(_) | FieldSchema::Default(..) => true,
            FieldSchema::Nullable(inner) => inner.accepts_missing(),
            _ => false,
        }
    }

    /// Short type name used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldSchema::String(_) => "string",
            FieldSchema::Number(rules) if rules.integer => "integer",
            FieldSchema::Number(_) => "number",
            FieldSchema::Boolean => "boolean",
            FieldSchema::Date => "date",
            FieldSchema::Literal(_) => "literal",
            FieldSchema::Any => "any",
            FieldSchema::Object(_) => "object",
            FieldSchema::Array(_) => "array",
            FieldSchema::Union(_) => "union",
            FieldSchema::Optional(inner)
            | FieldSchema::Nullable(inner)
            | FieldSchema::Default(inner, _) => inner.type_name(),
        }
    }

    /// Optionality applied recursively through objects, arrays and unions.
    /// Defaults are dropped: a partial write never invents values.
    pub fn deep_partial(&self) -> FieldSchema {
        match self {
            FieldSchema::Object(object) => {
                FieldSchema::Object(object.map_fields(|f| f.deep_partial().optional()))
            }
            FieldSchema::Array(array) => FieldSchema::Array(ArraySchema {
                element: Box::new(array.element.deep_partial()),
                min_items: array.min_items,
                max_items: array.max_items,
            }),
            FieldSchema::Optional(inner) => inner.deep_partial().optional(),
            FieldSchema::Nullable(inner) => inner.deep_partial().nullable(),
            FieldSchema::Default(inner, _) => inner.deep_partial().optional(),
            FieldSchema::Union(candidates) => {
                FieldSchema::Union(candidates.iter().map(FieldSchema::deep_partial).collect())
            }
            primitive => primitive.clone(),
        }
    }

    /// JSON description of the node, used by the CLI.
    pub fn describe(&self) -> Value {
        match self {
            FieldSchema::String(rules) => {
                let mut out = json!({ "type": "string" });
                if let Some(values) = &rules.enum_values {
                    out["enum"] = json!(values);
                }
                if let Some(pattern) = &rules.pattern {
                    out["pattern"] = json!(pattern.as_str());
                }
                if let Some(min) = rules.min_length {
                    out["min"] = json!(min);
                }
                if let Some(max) = rules.max_length {
                    out["max"] = json!(max);
                }
                out
            }
            FieldSchema::Number(rules) => {
                let type_name = if rules.integer { "integer" } else { "number" };
                let mut out = json!({ "type": type_name });
                if let Some(min) = rules.min {
                    out["min"] = json!(min);
                }
                if let Some(max) = rules.max {
                    out["max"] = json!(max);
                }
                out
            }
            FieldSchema::Boolean => json!({ "type": "boolean" }),
            FieldSchema::Date => json!({ "type": "date" }),
            FieldSchema::Any => json!({ "type": "any" }),
            FieldSchema::Literal(value) => json!({ "type": "literal", "value": value }),
            FieldSchema::Object(object) => {
                let fields: serde_json::Map<String, Value> = object
                    .fields()
                    .map(|(name, schema)| (name.to_string(), schema.describe()))
                    .collect();
                let mut out = json!({ "type": "object", "fields": fields });
                if object.unknown_keys == UnknownKeys::Passthrough {
                    out["additional_properties"] = json!(true);
                }
                out
            }
            FieldSchema::Array(array) => json!({ "type": "array", "items": array.element.describe() }),
            FieldSchema::Union(candidates) => json!({
                "type": "union",
                "variants": candidates.iter().map(FieldSchema::describe).collect::<Vec<_>>(),
            }),
            FieldSchema::Optional(inner) => {
                let mut out = inner.describe();
                out["optional"] = json!(true);
                out
            }
            FieldSchema::Nullable(inner) => {
                let mut out = inner.describe();
                out["nullable"] = json!(true);
                out
            }
            FieldSchema::Default(inner, value) => {
                let mut out = inner.describe();
                out["default"] = value.clone();
                out
            }
        }
    }
}

/// A collection's document schema: an object node at the root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    root: ObjectSchema,
}

impl Schema {
    pub fn new(root: ObjectSchema) -> Self {
        Schema { root }
    }

    pub fn root(&self) -> &ObjectSchema {
        &self.root
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.root.field(name)
    }

    /// Top-level fields become optional; nested shapes are untouched.
    pub fn partial(&self) -> Schema {
        Schema {
            root: self.root.map_fields(|f| match f {
                FieldSchema::Default(inner, _) => inner.as_ref().clone().optional(),
                other => other.clone().optional(),
            }),
        }
    }

    /// Every field at every depth becomes optional.
    pub fn deep_partial(&self) -> Schema {
        Schema {
            root: self.root.map_fields(|f| f.deep_partial().optional()),
        }
    }

    /// A new schema with the given fields added (or replaced in place).
    pub fn extend<I>(&self, fields: I) -> Schema
    where
        I: IntoIterator<Item = (String, FieldSchema)>,
    {
        let mut root = self.root.clone();
        for (name, schema) in fields {
            root.insert(name, schema);
        }
        Schema { root }
    }

    /// Names of top-level fields that must be present in a stored document.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.root
            .fields()
            .filter(|(_, schema)| !schema.accepts_missing())
            .map(|(name, _)| name)
    }

    pub fn describe(&self) -> Value {
        FieldSchema::Object(self.root.clone()).describe()
    }
}

impl SchemaDefinition {
    /// Compile the named collection's field definitions into a [`Schema`].
    pub fn compile_collection(&self, name: &str) -> Result<Schema> {
        let collection = self.collections.get(name).ok_or_else(|| {
            SchemaGateError::Config(format!("Collection '{name}' not found in schema"))
        })?;

        let mut stack = Vec::new();
        let mut root = self.compile_fields(&collection.fields, &mut stack)?;
        if collection.additional_properties {
            root.unknown_keys = UnknownKeys::Passthrough;
        }
        Ok(Schema::new(root))
    }

    fn compile_fields<'a>(
        &'a self,
        fields: &FieldMap,
        stack: &mut Vec<&'a str>,
    ) -> Result<ObjectSchema> {
        let mut object = ObjectSchema::new();
        for (field_name, def) in fields.iter() {
            let schema = self.compile_field(def, stack).map_err(|e| match e {
                SchemaGateError::Schema(msg) => {
                    SchemaGateError::Schema(format!("Field '{field_name}': {msg}"))
                }
                other => other,
            })?;
            object.insert(field_name.to_string(), schema);
        }
        Ok(object)
    }

    /// Compile a field, applying its presence wrappers.
    fn compile_field<'a>(
        &'a self,
        def: &FieldDefinition,
        stack: &mut Vec<&'a str>,
    ) -> Result<FieldSchema> {
        let mut schema = self.compile_inner(def, stack)?;
        if def.nullable {
            schema = schema.nullable();
        }
        if let Some(default) = &def.default {
            let default = serde_json::to_value(default)
                .map_err(|e| SchemaGateError::Schema(format!("Invalid default: {e}")))?;
            Ok(schema.with_default(default))
        } else if def.required {
            Ok(schema)
        } else {
            Ok(schema.optional())
        }
    }

    /// Compile the node itself; list items and union variants go through here
    /// so their `required` flag is ignored.
    fn compile_inner<'a>(
        &'a self,
        def: &FieldDefinition,
        stack: &mut Vec<&'a str>,
    ) -> Result<FieldSchema> {
        let length = |bound: Option<f64>| bound.map(|b| b.max(0.0) as usize);

        let schema = match &def.field_type {
            FieldType::String => FieldSchema::String(StringRules {
                enum_values: def.enum_values.clone(),
                pattern: def.pattern.as_deref().map(Pattern::new).transpose()?,
                min_length: length(def.min),
                max_length: length(def.max),
            }),
            FieldType::Number | FieldType::Integer => FieldSchema::Number(NumberRules {
                integer: def.field_type == FieldType::Integer,
                min: def.min,
                max: def.max,
            }),
            FieldType::Boolean => FieldSchema::Boolean,
            FieldType::Date | FieldType::Datetime => FieldSchema::Date,
            FieldType::Any => FieldSchema::Any,
            FieldType::Literal => {
                let value = def.value.as_ref().ok_or_else(|| {
                    SchemaGateError::Schema("literal type requires a 'value'".into())
                })?;
                let value = serde_json::to_value(value)
                    .map_err(|e| SchemaGateError::Schema(format!("Invalid literal: {e}")))?;
                FieldSchema::Literal(value)
            }
            FieldType::List => {
                let element = match &def.items {
                    Some(item) => {
                        let item_def = item.definition();
                        let mut element = self.compile_inner(&item_def, stack)?;
                        if item_def.nullable {
                            element = element.nullable();
                        }
                        element
                    }
                    None => FieldSchema::Any,
                };
                FieldSchema::Array(ArraySchema {
                    element: Box::new(element),
                    min_items: length(def.min),
                    max_items: length(def.max),
                })
            }
            FieldType::Object => {
                let mut object = match &def.fields {
                    Some(fields) => self.compile_fields(fields, stack)?,
                    None => ObjectSchema::new().passthrough(),
                };
                if def.additional_properties {
                    object.unknown_keys = UnknownKeys::Passthrough;
                }
                FieldSchema::Object(object)
            }
            FieldType::Union => {
                let variants = def.variants.as_ref().filter(|v| !v.is_empty()).ok_or_else(|| {
                    SchemaGateError::Schema("union type requires at least one variant".into())
                })?;
                let mut candidates = Vec::with_capacity(variants.len());
                for variant in variants {
                    let variant_def = variant.definition();
                    let mut candidate = self.compile_inner(&variant_def, stack)?;
                    if variant_def.nullable {
                        candidate = candidate.nullable();
                    }
                    candidates.push(candidate);
                }
                FieldSchema::Union(candidates)
            }
            FieldType::Custom(type_name) => {
                let (name, fields) = self
                    .types
                    .get_key_value(type_name.as_str())
                    .ok_or_else(|| {
                        SchemaGateError::Schema(format!("Unknown type '{type_name}'"))
                    })?;
                if stack.contains(&name.as_str()) {
                    return Err(SchemaGateError::Schema(format!(
                        "Type '{type_name}' refers to itself"
                    )));
                }
                stack.push(name.as_str());
                let mut object = self.compile_fields(fields, stack)?;
                stack.pop();
                if def.additional_properties {
                    object.unknown_keys = UnknownKeys::Passthrough;
                }
                FieldSchema::Object(object)
            }
        };
        Ok(schema)
    }
}
