pub mod binding;
pub mod document;
pub mod error;
pub mod hooks;
pub mod modifier;
pub mod path;
pub mod schema;
pub mod store;
pub mod validation;
pub mod write;

pub use binding::CollectionBinding;
pub use error::{Result, SchemaGateError};
pub use schema::{FieldSchema, ObjectSchema, Schema, SchemaDefinition, Settings};
pub use store::{DocumentStore, GuardedCollection, MemoryStore, Store, UpdateOptions, UpdateResult};
pub use validation::{AggregatedError, IssueKind, ValidationIssue};
pub use write::{WriteContext, WriteOptions};
