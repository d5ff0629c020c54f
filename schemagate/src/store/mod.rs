mod collection;
mod memory;

pub use collection::GuardedCollection;
pub use memory::{matches_filter, MemoryStore};

use crate::error::{Result, SchemaGateError};
use crate::schema::{parse_schema, SchemaDefinition, Settings};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Options forwarded to the backend's update primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
    pub multi: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    /// Id of the document an upsert created, if it created one.
    pub upserted_id: Option<String>,
}

/// The storage primitives the guarded collections delegate to.
/// Documents are JSON objects; implementations own id assignment.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, collection: &str, document: Value) -> Result<String>;

    fn update(
        &self,
        collection: &str,
        filter: &Value,
        modifier: &Value,
        options: &UpdateOptions,
    ) -> Result<UpdateResult>;

    fn remove(&self, collection: &str, filter: &Value) -> Result<u64>;

    fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>>;
}

/// Entry point: one guarded collection per collection in the schema file,
/// all sharing a single backend.
#[derive(Debug)]
pub struct Store<S> {
    schema: SchemaDefinition,
    backend: Arc<S>,
    collections: HashMap<String, GuardedCollection<S>>,
}

impl<S: DocumentStore> Store<S> {
    /// Parse the schema file at `path` and bind every collection to `backend`.
    pub fn open(path: impl AsRef<Path>, backend: S) -> Result<Self> {
        let schema = parse_schema(path.as_ref())?;
        Self::from_definition(schema, Arc::new(backend))
    }

    pub fn from_definition(schema: SchemaDefinition, backend: Arc<S>) -> Result<Self> {
        let mut collections = HashMap::new();
        for (name, definition) in &schema.collections {
            let mut collection = GuardedCollection::new(name.as_str(), Arc::clone(&backend))
                .with_settings(schema.settings.clone());
            collection.declare_schema(schema.compile_collection(name)?);

            // Fixed order keeps the synthetic fields in the same place for every collection.
            if definition.timestamps {
                collection.enable_date_stamping()?;
            }
            if definition.owned {
                collection.enable_user_stamping()?;
            }
            if definition.soft_delete {
                collection.enable_soft_delete()?;
            }
            collections.insert(name.clone(), collection);
        }
        log::debug!("Bound {} collection(s)", collections.len());

        Ok(Store {
            schema,
            backend,
            collections,
        })
    }

    pub fn collection(&self, name: &str) -> Result<&GuardedCollection<S>> {
        self.collections.get(name).ok_or_else(|| {
            SchemaGateError::Config(format!("Collection '{name}' not found in schema"))
        })
    }

    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    pub fn settings(&self) -> &Settings {
        &self.schema.settings
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }
}

impl Store<MemoryStore> {
    pub fn in_memory(schema: SchemaDefinition) -> Result<Self> {
        Self::from_definition(schema, Arc::new(MemoryStore::new()))
    }
}
