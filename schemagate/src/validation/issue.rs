use serde::Serialize;
use std::fmt;

/// Tag identifying what went wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    InvalidType,
    Required,
    InvalidLiteral,
    InvalidEnumValue,
    InvalidString,
    InvalidDate,
    TooSmall,
    TooBig,
    NotInteger,
    InvalidUnion,
    UnrecognizedKeys,
    /// Modifier targets a path the schema does not declare
    InvalidField,
    /// Array operator aimed at a field that is not an array
    InvalidArrayField,
    /// `$pop` operand other than 1 / -1
    InvalidArrayPopOperation,
    /// Modifier document is not made of operator objects
    InvalidModifier,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::InvalidType => "invalid_type",
            IssueKind::Required => "required",
            IssueKind::InvalidLiteral => "invalid_literal",
            IssueKind::InvalidEnumValue => "invalid_enum_value",
            IssueKind::InvalidString => "invalid_string",
            IssueKind::InvalidDate => "invalid_date",
            IssueKind::TooSmall => "too_small",
            IssueKind::TooBig => "too_big",
            IssueKind::NotInteger => "not_integer",
            IssueKind::InvalidUnion => "invalid_union",
            IssueKind::UnrecognizedKeys => "unrecognized_keys",
            IssueKind::InvalidField => "invalid_field",
            IssueKind::InvalidArrayField => "invalid_array_field",
            IssueKind::InvalidArrayPopOperation => "invalid_array_pop_operation",
            IssueKind::InvalidModifier => "invalid_modifier",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of an engine path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

/// Issue raised by the schema engine; `path` is relative to the parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineIssue {
    pub path: Vec<PathKey>,
    pub kind: IssueKind,
    pub message: String,
}

/// A single failed field check within a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} ({})", self.message, self.kind)
        } else {
            write!(f, "{}: {} ({})", self.path, self.message, self.kind)
        }
    }
}

/// Every issue found while validating one write.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct AggregatedError {
    pub issues: Vec<ValidationIssue>,
    pub message: String,
}

impl AggregatedError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        let details: Vec<String> = issues.iter().map(ValidationIssue::to_string).collect();
        let message = format!(
            "validation failed with {} issue(s): {}",
            issues.len(),
            details.join("; ")
        );
        AggregatedError { issues, message }
    }

    pub fn first(&self) -> Option<&ValidationIssue> {
        self.issues.first()
    }
}

/// Join an engine path under a dotted prefix: `("tags", [$each, 1])` -> `tags.$each.1`.
pub fn join_path(prefix: &str, path: &[PathKey]) -> String {
    let mut joined = prefix.to_string();
    for key in path {
        if !joined.is_empty() {
            joined.push('.');
        }
        match key {
            PathKey::Key(k) => joined.push_str(k),
            PathKey::Index(i) => joined.push_str(&i.to_string()),
        }
    }
    joined
}

/// Accumulates issues across a whole write, in visit order.
#[derive(Debug, Default)]
pub struct IssueCollector {
    issues: Vec<ValidationIssue>,
}

impl IssueCollector {
    pub fn new() -> Self {
        IssueCollector::default()
    }

    pub fn push(&mut self, path: impl Into<String>, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: path.into(),
            kind,
            message: message.into(),
        });
    }

    /// Translate engine issues into dotted-path issues under `prefix`.
    pub fn extend_engine(&mut self, prefix: &str, issues: Vec<EngineIssue>) {
        for issue in issues {
            self.issues.push(ValidationIssue {
                path: join_path(prefix, &issue.path),
                kind: issue.kind,
                message: issue.message,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    /// `Ok` only when nothing was collected.
    pub fn finish(self) -> std::result::Result<(), AggregatedError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(AggregatedError::new(self.issues))
        }
    }
}
