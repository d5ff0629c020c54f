// Collection binding - declared schema, behaviours and derived views

use crate::error::{Result, SchemaGateError};
use crate::hooks::{CREATED_AT, DELETED_AT, IS_DELETED, UPDATED_AT, USER_ID};
use crate::schema::{FieldSchema, Schema};
use crate::write::SchemaView;
use serde_json::Value;
use std::fmt;

/// Behaviour that extends a collection schema with synthetic fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    DateStamping,
    UserStamping,
    SoftDelete,
}

impl Behaviour {
    fn fields(self) -> Vec<(String, FieldSchema)> {
        match self {
            Behaviour::DateStamping => vec![
                (CREATED_AT.to_string(), FieldSchema::Date),
                (UPDATED_AT.to_string(), FieldSchema::Date),
            ],
            Behaviour::UserStamping => {
                vec![(USER_ID.to_string(), FieldSchema::string().optional())]
            }
            Behaviour::SoftDelete => vec![
                (
                    IS_DELETED.to_string(),
                    FieldSchema::Boolean.with_default(Value::Bool(false)),
                ),
                (DELETED_AT.to_string(), FieldSchema::Date.optional()),
            ],
        }
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Behaviour::DateStamping => "date stamping",
            Behaviour::UserStamping => "user stamping",
            Behaviour::SoftDelete => "soft delete",
        })
    }
}

/// The three views of one effective schema, derived once per declaration.
#[derive(Debug, Clone)]
pub struct SchemaViews {
    strict: Schema,
    partial: Schema,
    deep_partial: Schema,
}

impl SchemaViews {
    pub fn new(strict: Schema) -> Self {
        SchemaViews {
            partial: strict.partial(),
            deep_partial: strict.deep_partial(),
            strict,
        }
    }

    pub fn strict(&self) -> &Schema {
        &self.strict
    }

    pub fn view(&self, view: SchemaView) -> &Schema {
        match view {
            SchemaView::Strict => &self.strict,
            SchemaView::Partial => &self.partial,
            SchemaView::DeepPartial => &self.deep_partial,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionBinding {
    declared: Option<Schema>,
    behaviours: Vec<Behaviour>,
    views: Option<SchemaViews>,
}

impl CollectionBinding {
    pub fn new() -> Self {
        CollectionBinding::default()
    }

    /// Attach (or replace) the collection schema. Behaviours already enabled
    /// are re-applied on top of it.
    pub fn declare_schema(&mut self, schema: Schema) {
        self.declared = Some(schema);
        self.rebuild();
    }

    pub fn enable_date_stamping(&mut self) -> Result<()> {
        self.enable(Behaviour::DateStamping)
    }

    pub fn enable_user_stamping(&mut self) -> Result<()> {
        self.enable(Behaviour::UserStamping)
    }

    pub fn enable_soft_delete(&mut self) -> Result<()> {
        self.enable(Behaviour::SoftDelete)
    }

    fn enable(&mut self, behaviour: Behaviour) -> Result<()> {
        if self.declared.is_none() {
            return Err(SchemaGateError::Config(format!(
                "Cannot enable {behaviour} before a schema is declared"
            )));
        }
        if !self.behaviours.contains(&behaviour) {
            self.behaviours.push(behaviour);
        }
        self.rebuild();
        Ok(())
    }

    fn rebuild(&mut self) {
        self.views = self.declared.as_ref().map(|declared| {
            let effective = self
                .behaviours
                .iter()
                .fold(declared.clone(), |schema, b| schema.extend(b.fields()));
            SchemaViews::new(effective)
        });
    }

    /// Effective strict schema, synthetic fields included.
    pub fn schema(&self) -> Option<&Schema> {
        self.views.as_ref().map(SchemaViews::strict)
    }

    pub fn views(&self) -> Option<&SchemaViews> {
        self.views.as_ref()
    }

    pub fn has(&self, behaviour: Behaviour) -> bool {
        self.behaviours.contains(&behaviour)
    }

    pub fn stamps_dates(&self) -> bool {
        self.has(Behaviour::DateStamping)
    }

    pub fn stamps_user(&self) -> bool {
        self.has(Behaviour::UserStamping)
    }

    pub fn soft_deletes(&self) -> bool {
        self.has(Behaviour::SoftDelete)
    }
}
