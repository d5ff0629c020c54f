use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Top-level schema definition parsed from schema.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub types: HashMap<String, FieldMap>,
    #[serde(default)]
    pub collections: HashMap<String, CollectionDefinition>,
}

/// Process-wide settings for the write pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Collection holding user accounts; its credential subtree is never schema-checked
    #[serde(default = "default_identity_collection")]
    pub identity_collection: String,
    /// Top-level field of the identity collection holding login credentials
    #[serde(default = "default_credential_field")]
    pub credential_field: String,
}

fn default_identity_collection() -> String {
    "users".into()
}

fn default_credential_field() -> String {
    "services".into()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            identity_collection: default_identity_collection(),
            credential_field: default_credential_field(),
        }
    }
}

/// Definition of a single collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionDefinition {
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub additional_properties: bool,
    /// Stamp `createdAt` / `updatedAt` on every write
    #[serde(default)]
    pub timestamps: bool,
    /// Stamp `userId` from the write context on insert
    #[serde(default)]
    pub owned: bool,
    /// Turn removes into `isDeleted` / `deletedAt` updates
    #[serde(default)]
    pub soft_delete: bool,
}

/// Definition of a single field in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub items: Option<ItemType>,
    #[serde(default)]
    pub fields: Option<FieldMap>,
    #[serde(default)]
    pub variants: Option<Vec<ItemType>>,
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub additional_properties: bool,
}

impl FieldDefinition {
    /// A required field of the given type with no further constraints
    pub fn of_type(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: true,
            nullable: false,
            enum_values: None,
            default: None,
            items: None,
            fields: None,
            variants: None,
            value: None,
            min: None,
            max: None,
            pattern: None,
            additional_properties: false,
        }
    }
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
    Literal,
    Union,
    Any,
    #[serde(untagged)]
    Custom(std::string::String),
}

impl FieldType {
    /// Parse a bare type name as used in `items: string`
    pub fn from_name(name: &str) -> FieldType {
        match name {
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "integer" => FieldType::Integer,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::Datetime,
            "list" => FieldType::List,
            "object" => FieldType::Object,
            "literal" => FieldType::Literal,
            "union" => FieldType::Union,
            "any" => FieldType::Any,
            other => FieldType::Custom(other.to_string()),
        }
    }
}

/// Item type for lists and union variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemType {
    Simple(String),
    Complex(Box<FieldDefinition>),
}

impl ItemType {
    pub fn definition(&self) -> FieldDefinition {
        match self {
            ItemType::Simple(name) => FieldDefinition::of_type(FieldType::from_name(name)),
            ItemType::Complex(def) => (**def).clone(),
        }
    }
}

/// Field definitions in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldMap(Vec<(String, FieldDefinition)>);

impl FieldMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDefinition)> {
        self.0.iter().map(|(n, d)| (n.as_str(), d))
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of field names to field definitions")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<FieldMap, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields: Vec<(String, FieldDefinition)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, def)) = access.next_entry::<String, FieldDefinition>()? {
                    if fields.iter().any(|(n, _)| *n == name) {
                        return Err(de::Error::custom(format!("duplicate field '{name}'")));
                    }
                    fields.push((name, def));
                }
                Ok(FieldMap(fields))
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

impl Serialize for FieldMap {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, def) in &self.0 {
            map.serialize_entry(name, def)?;
        }
        map.end()
    }
}
