// Lifecycle hooks - stamp synthetic fields before validation

use crate::document::remove_key;
use crate::write::{WriteContext, WriteKind, WriteRequest};
use serde_json::Value;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const USER_ID: &str = "userId";
pub const IS_DELETED: &str = "isDeleted";
pub const DELETED_AT: &str = "deletedAt";

/// Stamp `createdAt`/`updatedAt`. Client-supplied `createdAt` never survives
/// an update.
pub fn stamp_dates(request: &mut WriteRequest, ctx: &WriteContext) {
    let now = Value::String(ctx.timestamp());
    match request.kind {
        WriteKind::Insert => {
            if let Some(doc) = request.document_mut() {
                doc.insert(CREATED_AT.to_string(), now.clone());
                doc.insert(UPDATED_AT.to_string(), now);
            }
        }
        WriteKind::Update => {
            if let Some(set) = request.operator_mut("$set") {
                remove_key(set, CREATED_AT);
                set.insert(UPDATED_AT.to_string(), now);
            }
        }
        WriteKind::Upsert => {
            if let Some(set_on_insert) = request.operator_mut("$setOnInsert") {
                set_on_insert.insert(CREATED_AT.to_string(), now.clone());
                set_on_insert.insert(UPDATED_AT.to_string(), now.clone());
            }
            if let Some(set) = request.operator_mut("$set") {
                remove_key(set, CREATED_AT);
                set.insert(UPDATED_AT.to_string(), now);
            }
        }
    }
}

/// Stamp the acting user's id. Without a user in the context nothing is
/// stamped, and updates still lose any client-supplied `userId`.
pub fn stamp_user(request: &mut WriteRequest, ctx: &WriteContext) {
    if let Some(set) = request.existing_operator_mut("$set") {
        remove_key(set, USER_ID);
    }

    let Some(user_id) = ctx.user_id.as_deref() else {
        log::debug!("No user in write context, skipping user stamping");
        return;
    };
    let user = Value::String(user_id.to_string());
    match request.kind {
        WriteKind::Insert => {
            if let Some(doc) = request.document_mut() {
                doc.insert(USER_ID.to_string(), user);
            }
        }
        WriteKind::Update => {}
        WriteKind::Upsert => {
            if let Some(set_on_insert) = request.operator_mut("$setOnInsert") {
                set_on_insert.insert(USER_ID.to_string(), user);
            }
        }
    }
}
