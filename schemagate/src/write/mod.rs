mod mode;

pub use mode::{derive_mode, SchemaView, ValidationMode};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// What kind of storage primitive a write ends up calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Upsert,
}

impl WriteKind {
    pub fn from_flags(is_insert: bool, upsert: bool) -> Self {
        match (is_insert, upsert) {
            (true, _) => WriteKind::Insert,
            (false, true) => WriteKind::Upsert,
            (false, false) => WriteKind::Update,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Bypass hooks and validation for this call.
    pub skip_schema: bool,
    pub upsert: bool,
    pub multi: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        WriteOptions::default()
    }

    pub fn skip_schema(mut self) -> Self {
        self.skip_schema = true;
        self
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }
}

/// Caller identity and clock for one write.
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub user_id: Option<String>,
    pub now: DateTime<Utc>,
}

impl WriteContext {
    pub fn new() -> Self {
        WriteContext {
            user_id: None,
            now: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// `now` as an RFC 3339 UTC string with millisecond precision.
    pub fn timestamp(&self) -> String {
        self.now.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Default for WriteContext {
    fn default() -> Self {
        WriteContext::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    Document(Value),
    Modifier { filter: Value, modifier: Value },
}

/// A write in flight. Hooks and the translator rewrite `target` in place.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub kind: WriteKind,
    pub target: WriteTarget,
    pub options: WriteOptions,
}

impl WriteRequest {
    pub fn insert(document: Value, options: WriteOptions) -> Self {
        WriteRequest {
            kind: WriteKind::Insert,
            target: WriteTarget::Document(document),
            options,
        }
    }

    pub fn update(filter: Value, modifier: Value, options: WriteOptions) -> Self {
        WriteRequest {
            kind: WriteKind::from_flags(false, options.upsert),
            target: WriteTarget::Modifier { filter, modifier },
            options,
        }
    }

    /// The document of an insert, when it is an object.
    pub fn document_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match &mut self.target {
            WriteTarget::Document(doc) => doc.as_object_mut(),
            WriteTarget::Modifier { .. } => None,
        }
    }

    pub fn modifier(&self) -> Option<&Value> {
        match &self.target {
            WriteTarget::Modifier { modifier, .. } => Some(modifier),
            WriteTarget::Document(_) => None,
        }
    }

    /// Operand of `operator`, created as `{}` when missing. `None` when the
    /// request is an insert or the existing operand is not an object.
    pub fn operator_mut(&mut self, operator: &str) -> Option<&mut Map<String, Value>> {
        let WriteTarget::Modifier { modifier, .. } = &mut self.target else {
            return None;
        };
        modifier
            .as_object_mut()?
            .entry(operator)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    /// Operand of `operator` only if the caller already supplied one.
    pub fn existing_operator_mut(&mut self, operator: &str) -> Option<&mut Map<String, Value>> {
        let WriteTarget::Modifier { modifier, .. } = &mut self.target else {
            return None;
        };
        modifier.get_mut(operator)?.as_object_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_kind_from_flags() {
        assert_eq!(WriteKind::from_flags(true, true), WriteKind::Insert);
        assert_eq!(WriteKind::from_flags(false, true), WriteKind::Upsert);
        assert_eq!(WriteKind::from_flags(false, false), WriteKind::Update);
    }

    #[test]
    fn test_update_request_picks_upsert_kind() {
        let request = WriteRequest::update(json!({}), json!({}), WriteOptions::new().upsert());
        assert_eq!(request.kind, WriteKind::Upsert);
    }

    #[test]
    fn test_timestamp_format() {
        let ctx = WriteContext::new().at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        assert_eq!(ctx.timestamp(), "2024-03-01T12:30:00.000Z");
    }

    #[test]
    fn test_operator_mut_creates_operand() {
        let mut request = WriteRequest::update(json!({}), json!({ "$inc": { "n": 1 } }), WriteOptions::new());
        request.operator_mut("$set").unwrap().insert("a".into(), json!(1));
        assert_eq!(
            request.modifier(),
            Some(&json!({ "$inc": { "n": 1 }, "$set": { "a": 1 } }))
        );
        assert!(request.existing_operator_mut("$setOnInsert").is_none());
    }

    #[test]
    fn test_operator_mut_refuses_malformed_operand() {
        let mut request = WriteRequest::update(json!({}), json!({ "$set": 5 }), WriteOptions::new());
        assert!(request.operator_mut("$set").is_none());

        let mut insert = WriteRequest::insert(json!({}), WriteOptions::new());
        assert!(insert.operator_mut("$set").is_none());
        assert!(insert.document_mut().is_some());
    }
}
