use super::{DocumentStore, UpdateOptions, UpdateResult};
use crate::binding::CollectionBinding;
use crate::error::{Result, SchemaGateError};
use crate::hooks::{self, DELETED_AT, IS_DELETED};
use crate::modifier::{is_credential_update, translate};
use crate::schema::{Schema, Settings};
use crate::write::{WriteContext, WriteOptions, WriteRequest, WriteTarget};
use serde_json::{json, Value};
use std::sync::Arc;

/// A collection handle that validates every write against its binding before
/// handing it to the backend. Nothing reaches the backend unless validation
/// passed (or was bypassed).
#[derive(Debug)]
pub struct GuardedCollection<S> {
    name: String,
    binding: CollectionBinding,
    settings: Settings,
    store: Arc<S>,
}

impl<S: DocumentStore> GuardedCollection<S> {
    pub fn new(name: impl Into<String>, store: Arc<S>) -> Self {
        GuardedCollection {
            name: name.into(),
            binding: CollectionBinding::new(),
            settings: Settings::default(),
            store,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> &CollectionBinding {
        &self.binding
    }

    /// Effective schema, synthetic fields included.
    pub fn schema(&self) -> Option<&Schema> {
        self.binding.schema()
    }

    pub fn declare_schema(&mut self, schema: Schema) -> &mut Self {
        self.binding.declare_schema(schema);
        self
    }

    pub fn enable_date_stamping(&mut self) -> Result<&mut Self> {
        self.binding.enable_date_stamping()?;
        Ok(self)
    }

    pub fn enable_user_stamping(&mut self) -> Result<&mut Self> {
        self.binding.enable_user_stamping()?;
        Ok(self)
    }

    pub fn enable_soft_delete(&mut self) -> Result<&mut Self> {
        self.binding.enable_soft_delete()?;
        Ok(self)
    }

    /// Run hooks and validation over `request`, rewriting it in place.
    pub fn prepare(&self, request: &mut WriteRequest, ctx: &WriteContext) -> Result<()> {
        if request.options.skip_schema {
            log::debug!("{}: schema checks skipped for this write", self.name);
            return Ok(());
        }
        let Some(views) = self.binding.views() else {
            log::debug!("{}: no schema declared, write forwarded as is", self.name);
            return Ok(());
        };
        if let Some(modifier) = request.modifier() {
            if is_credential_update(&self.settings, &self.name, modifier) {
                log::debug!("{}: credential update forwarded without schema checks", self.name);
                return Ok(());
            }
        }

        if self.binding.stamps_dates() {
            hooks::stamp_dates(request, ctx);
        }
        if self.binding.stamps_user() {
            hooks::stamp_user(request, ctx);
        }
        translate(views, request)?;
        Ok(())
    }

    /// Insert a document. Returns the new document's id.
    pub fn insert(&self, document: Value, options: &WriteOptions, ctx: &WriteContext) -> Result<String> {
        let mut request = WriteRequest::insert(document, options.clone());
        self.prepare(&mut request, ctx)?;
        match request.target {
            WriteTarget::Document(document) => self.store.insert(&self.name, document),
            WriteTarget::Modifier { .. } => Err(SchemaGateError::Other(
                "insert request turned into an update".into(),
            )),
        }
    }

    pub fn update(
        &self,
        filter: Value,
        modifier: Value,
        options: &WriteOptions,
        ctx: &WriteContext,
    ) -> Result<UpdateResult> {
        let mut request = WriteRequest::update(filter, modifier, options.clone());
        self.prepare(&mut request, ctx)?;
        match request.target {
            WriteTarget::Modifier { filter, modifier } => {
                let update_options = UpdateOptions {
                    upsert: options.upsert,
                    multi: options.multi,
                };
                self.store.update(&self.name, &filter, &modifier, &update_options)
            }
            WriteTarget::Document(_) => Err(SchemaGateError::Other(
                "update request turned into an insert".into(),
            )),
        }
    }

    pub fn upsert(
        &self,
        filter: Value,
        modifier: Value,
        options: &WriteOptions,
        ctx: &WriteContext,
    ) -> Result<UpdateResult> {
        self.update(filter, modifier, &options.clone().upsert(), ctx)
    }

    /// Remove matching documents. With soft delete enabled they are flagged
    /// instead. Returns how many documents were removed or flagged.
    pub fn remove(&self, filter: Value, ctx: &WriteContext) -> Result<u64> {
        if !self.binding.soft_deletes() {
            return self.store.remove(&self.name, &filter);
        }
        let modifier = json!({ "$set": { IS_DELETED: true, DELETED_AT: ctx.timestamp() } });
        let result = self.update(filter, modifier, &WriteOptions::new().multi(), ctx)?;
        Ok(result.modified)
    }

    /// Undo a soft delete.
    pub fn recover(&self, filter: Value, ctx: &WriteContext) -> Result<u64> {
        if !self.binding.soft_deletes() {
            return Err(SchemaGateError::Config(format!(
                "Collection '{}' does not have soft delete enabled",
                self.name
            )));
        }
        let modifier = json!({ "$set": { IS_DELETED: false }, "$unset": { DELETED_AT: "" } });
        let result = self.update(filter, modifier, &WriteOptions::new().multi(), ctx)?;
        Ok(result.modified)
    }

    pub fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        self.store.find_one(&self.name, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, ObjectSchema};
    use crate::store::MemoryStore;
    use crate::validation::IssueKind;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const NOW: &str = "2024-01-02T03:04:05.000Z";

    fn ctx() -> WriteContext {
        WriteContext::new().at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    fn people() -> GuardedCollection<MemoryStore> {
        let mut collection = GuardedCollection::new("people", Arc::new(MemoryStore::new()));
        collection.declare_schema(Schema::new(
            ObjectSchema::new()
                .with_field("name", FieldSchema::string())
                .with_field("age", FieldSchema::number()),
        ));
        collection
    }

    fn insert(collection: &GuardedCollection<MemoryStore>, doc: Value) -> String {
        collection.insert(doc, &WriteOptions::new(), &ctx()).unwrap()
    }

    fn by_id(collection: &GuardedCollection<MemoryStore>, id: &str) -> Value {
        collection.find_one(&json!({ "_id": id })).unwrap().unwrap()
    }

    #[test]
    fn test_insert_strips_undeclared_fields() {
        let collection = people();
        let id = insert(&collection, json!({ "name": "John", "age": 30, "extra": 1 }));
        assert_eq!(by_id(&collection, &id), json!({ "_id": id, "name": "John", "age": 30 }));
    }

    #[test]
    fn test_insert_type_rejection_stores_nothing() {
        let collection = people();
        let err = collection
            .insert(json!({ "name": "John", "age": "x" }), &WriteOptions::new(), &ctx())
            .unwrap_err();
        let issues = err.validation().unwrap();
        assert_eq!(issues.first().unwrap().path, "age");
        assert_eq!(collection.find_one(&json!({})).unwrap(), None);
    }

    #[test]
    fn test_partial_update_without_required_fields() {
        let collection = people();
        let id = insert(&collection, json!({ "name": "John", "age": 30 }));
        let result = collection
            .update(json!({ "_id": id }), json!({ "$set": { "age": 31 } }), &WriteOptions::new(), &ctx())
            .unwrap();
        assert_eq!(result.modified, 1);
        assert_eq!(by_id(&collection, &id)["age"], 31);
    }

    #[test]
    fn test_skip_schema_stores_invalid_value() {
        let collection = people();
        let id = collection
            .insert(json!({ "name": 5, "junk": true }), &WriteOptions::new().skip_schema(), &ctx())
            .unwrap();
        assert_eq!(by_id(&collection, &id), json!({ "_id": id, "name": 5, "junk": true }));
    }

    #[test]
    fn test_skip_schema_update_and_upsert_store_modifier_as_is() {
        let mut collection = people();
        collection.enable_date_stamping().unwrap();
        let id = insert(&collection, json!({ "name": "A", "age": 1 }));

        let later = WriteContext::new().at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        collection
            .update(
                json!({ "_id": id }),
                json!({ "$set": { "age": "x", "junk": 1 } }),
                &WriteOptions::new().skip_schema(),
                &later,
            )
            .unwrap();
        let doc = by_id(&collection, &id);
        assert_eq!(doc["age"], "x");
        assert_eq!(doc["junk"], 1);
        assert_eq!(doc["updatedAt"], NOW);

        let result = collection
            .upsert(
                json!({ "name": "Z" }),
                json!({ "$set": { "age": "y" } }),
                &WriteOptions::new().skip_schema(),
                &later,
            )
            .unwrap();
        let doc = by_id(&collection, &result.upserted_id.unwrap());
        assert_eq!(doc["name"], "Z");
        assert_eq!(doc["age"], "y");
        assert!(doc.get("createdAt").is_none());
        assert!(doc.get("updatedAt").is_none());
    }

    #[test]
    fn test_storage_failures_leave_collection_usable() {
        let mut collection = GuardedCollection::new("counters", Arc::new(MemoryStore::new()));
        collection.declare_schema(Schema::new(
            ObjectSchema::new()
                .with_field("n", FieldSchema::integer())
                .with_field("tags", FieldSchema::array(FieldSchema::string())),
        ));
        let id = collection
            .insert(json!({ "n": i64::MAX, "tags": [] }), &WriteOptions::new().skip_schema(), &ctx())
            .unwrap();
        let filter = json!({ "_id": id });

        let err = collection
            .update(filter.clone(), json!({ "$inc": { "n": 1 } }), &WriteOptions::new(), &ctx())
            .unwrap_err();
        assert!(matches!(err, SchemaGateError::Storage(_)));
        let err = collection
            .update(
                filter.clone(),
                json!({ "$set": { "tags.18446744073709551615": "x" } }),
                &WriteOptions::new(),
                &ctx(),
            )
            .unwrap_err();
        assert!(matches!(err, SchemaGateError::Storage(_)));

        collection
            .update(filter, json!({ "$push": { "tags": "ok" } }), &WriteOptions::new(), &ctx())
            .unwrap();
        assert_eq!(by_id(&collection, &id), json!({ "_id": id, "n": i64::MAX, "tags": ["ok"] }));
    }

    #[test]
    fn test_undeclared_collection_forwards_everything() {
        let collection = GuardedCollection::new("loose", Arc::new(MemoryStore::new()));
        let id = insert(&collection, json!({ "anything": [1, 2] }));
        assert_eq!(by_id(&collection, &id)["anything"], json!([1, 2]));
    }

    #[test]
    fn test_enable_before_declare_is_config_error() {
        let mut collection: GuardedCollection<MemoryStore> =
            GuardedCollection::new("people", Arc::new(MemoryStore::new()));
        assert!(matches!(
            collection.enable_date_stamping(),
            Err(SchemaGateError::Config(_))
        ));
    }

    #[test]
    fn test_date_stamping() {
        let mut collection = people();
        collection.enable_date_stamping().unwrap();
        let id = insert(&collection, json!({ "name": "A", "age": 1, "createdAt": "1999-01-01" }));
        let doc = by_id(&collection, &id);
        assert_eq!(doc["createdAt"], NOW);
        assert_eq!(doc["updatedAt"], NOW);

        let later = WriteContext::new().at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        collection
            .update(
                json!({ "_id": id }),
                json!({ "$set": { "age": 2, "createdAt": "2000-01-01T00:00:00Z" } }),
                &WriteOptions::new(),
                &later,
            )
            .unwrap();
        let doc = by_id(&collection, &id);
        assert_eq!(doc["createdAt"], NOW);
        assert_eq!(doc["updatedAt"], "2024-06-01T00:00:00.000Z");
    }

    #[test]
    fn test_user_stamping() {
        let mut collection = people();
        collection.enable_user_stamping().unwrap();
        let id = collection
            .insert(json!({ "name": "A", "age": 1 }), &WriteOptions::new(), &ctx().with_user("u-1"))
            .unwrap();
        assert_eq!(by_id(&collection, &id)["userId"], "u-1");

        collection
            .update(
                json!({ "_id": id }),
                json!({ "$set": { "userId": "intruder" } }),
                &WriteOptions::new(),
                &ctx().with_user("u-2"),
            )
            .unwrap();
        assert_eq!(by_id(&collection, &id)["userId"], "u-1");
    }

    #[test]
    fn test_array_operators() {
        let mut collection = GuardedCollection::new("posts", Arc::new(MemoryStore::new()));
        collection.declare_schema(Schema::new(
            ObjectSchema::new()
                .with_field("title", FieldSchema::string())
                .with_field("tags", FieldSchema::array(FieldSchema::string())),
        ));
        let id = insert(&collection, json!({ "title": "T", "tags": ["t1", "t2"] }));
        let filter = json!({ "_id": id });

        collection
            .update(filter.clone(), json!({ "$push": { "tags": "t3" } }), &WriteOptions::new(), &ctx())
            .unwrap();
        assert_eq!(by_id(&collection, &id)["tags"], json!(["t1", "t2", "t3"]));

        let err = collection
            .update(filter.clone(), json!({ "$push": { "tags": 1 } }), &WriteOptions::new(), &ctx())
            .unwrap_err();
        let first = err.validation().unwrap().first().unwrap().clone();
        assert_eq!((first.path.as_str(), first.kind), ("tags", IssueKind::InvalidType));

        let err = collection
            .update(filter.clone(), json!({ "$push": { "title": "x" } }), &WriteOptions::new(), &ctx())
            .unwrap_err();
        assert_eq!(err.validation().unwrap().first().unwrap().kind, IssueKind::InvalidArrayField);

        collection
            .update(filter.clone(), json!({ "$pop": { "tags": -1 } }), &WriteOptions::new(), &ctx())
            .unwrap();
        assert_eq!(by_id(&collection, &id)["tags"], json!(["t2", "t3"]));

        let err = collection
            .update(filter.clone(), json!({ "$pop": { "tags": 0 } }), &WriteOptions::new(), &ctx())
            .unwrap_err();
        assert_eq!(
            err.validation().unwrap().first().unwrap().kind,
            IssueKind::InvalidArrayPopOperation
        );
        assert_eq!(by_id(&collection, &id)["tags"], json!(["t2", "t3"]));
    }

    #[test]
    fn test_push_each_sort_then_slice() {
        let mut collection = GuardedCollection::new("boards", Arc::new(MemoryStore::new()));
        collection.declare_schema(Schema::new(
            ObjectSchema::new().with_field("scores", FieldSchema::array(FieldSchema::number())),
        ));
        let id = insert(&collection, json!({ "scores": [40, 10] }));
        collection
            .update(
                json!({ "_id": id }),
                json!({ "$push": { "scores": { "$each": [30, 50], "$sort": -1, "$slice": 3 } } }),
                &WriteOptions::new(),
                &ctx(),
            )
            .unwrap();
        assert_eq!(by_id(&collection, &id)["scores"], json!([50, 40, 30]));
    }

    #[test]
    fn test_soft_delete_round_trip() {
        let mut collection = people();
        collection.enable_soft_delete().unwrap();
        let id = insert(&collection, json!({ "name": "A", "age": 1 }));
        assert_eq!(by_id(&collection, &id)["isDeleted"], false);

        assert_eq!(collection.remove(json!({ "_id": id }), &ctx()).unwrap(), 1);
        let doc = by_id(&collection, &id);
        assert_eq!(doc["isDeleted"], true);
        assert_eq!(doc["deletedAt"], NOW);

        assert_eq!(collection.recover(json!({ "_id": id }), &ctx()).unwrap(), 1);
        let doc = by_id(&collection, &id);
        assert_eq!(doc["isDeleted"], false);
        assert!(doc.get("deletedAt").is_none());
    }

    #[test]
    fn test_hard_remove_and_recover_without_soft_delete() {
        let collection = people();
        let id = insert(&collection, json!({ "name": "A", "age": 1 }));
        assert!(matches!(
            collection.recover(json!({ "_id": id }), &ctx()),
            Err(SchemaGateError::Config(_))
        ));
        assert_eq!(collection.remove(json!({ "_id": id }), &ctx()).unwrap(), 1);
        assert_eq!(collection.find_one(&json!({ "_id": id })).unwrap(), None);
    }

    #[test]
    fn test_upsert_dual_mode() {
        let mut collection = people();
        collection.enable_date_stamping().unwrap();

        let err = collection
            .upsert(json!({ "name": "A" }), json!({ "$set": { "age": 1 } }), &WriteOptions::new(), &ctx())
            .unwrap_err();
        let issues = err.validation().unwrap();
        assert_eq!(issues.issues.len(), 1);
        assert_eq!((issues.issues[0].path.as_str(), issues.issues[0].kind), ("name", IssueKind::Required));

        let result = collection
            .upsert(
                json!({ "name": "A" }),
                json!({ "$set": { "age": 1 }, "$setOnInsert": { "name": "A" } }),
                &WriteOptions::new(),
                &ctx(),
            )
            .unwrap();
        let id = result.upserted_id.unwrap();
        let doc = by_id(&collection, &id);
        assert_eq!(doc["name"], "A");
        assert_eq!(doc["age"], 1);
        assert_eq!(doc["createdAt"], NOW);
    }

    #[test]
    fn test_upsert_through_set_on_insert_only() {
        let mut collection = GuardedCollection::new("people", Arc::new(MemoryStore::new()));
        collection.declare_schema(Schema::new(
            ObjectSchema::new()
                .with_field("name", FieldSchema::string())
                .with_field("age", FieldSchema::number())
                .with_field("status", FieldSchema::string().with_default(json!("active")))
                .with_field("tags", FieldSchema::array(FieldSchema::string()).optional())
                .with_field(
                    "address",
                    FieldSchema::object(ObjectSchema::new().with_field("city", FieldSchema::string()))
                        .optional(),
                ),
        ));

        let result = collection
            .upsert(
                json!({ "name": "B" }),
                json!({ "$setOnInsert": { "name": "B", "age": 40 } }),
                &WriteOptions::new(),
                &ctx(),
            )
            .unwrap();
        let id = result.upserted_id.unwrap();
        let doc = by_id(&collection, &id);
        let mut keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["_id", "age", "name", "status"]);
        assert_eq!(doc["name"], "B");
        assert_eq!(doc["age"], 40);
        assert_eq!(doc["status"], "active");
    }

    #[test]
    fn test_credential_update_bypasses_validation() {
        let mut users = GuardedCollection::new("users", Arc::new(MemoryStore::new()));
        users.declare_schema(Schema::new(
            ObjectSchema::new().with_field("username", FieldSchema::string()),
        ));
        users.enable_date_stamping().unwrap();
        let id = insert(&users, json!({ "username": "a" }));

        users
            .update(
                json!({ "_id": id }),
                json!({ "$set": { "services.resume.loginTokens": [{ "when": 1 }] } }),
                &WriteOptions::new(),
                &ctx(),
            )
            .unwrap();
        let doc = by_id(&users, &id);
        assert_eq!(doc["services"]["resume"]["loginTokens"], json!([{ "when": 1 }]));

        // Anything else on the same collection is still checked.
        users
            .update(
                json!({ "_id": id }),
                json!({ "$set": { "services.x": 1, "junk": 1 } }),
                &WriteOptions::new(),
                &ctx(),
            )
            .unwrap();
        let doc = by_id(&users, &id);
        assert!(doc.get("junk").is_none());
    }
}
