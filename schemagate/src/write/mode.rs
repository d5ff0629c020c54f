use super::WriteKind;

/// Which derived view of a collection schema a check runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaView {
    /// Every required field must be present.
    Strict,
    /// Top-level fields optional, nested objects keep their requirements.
    Partial,
    /// Every field optional at every depth.
    DeepPartial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Inserts: the whole document is parsed in one pass.
    Document(SchemaView),
    /// Updates and upserts: each operator operand is checked on its own.
    Modifier {
        set: SchemaView,
        set_on_insert: SchemaView,
        /// Upserts may create a document, so required fields must be supplied.
        require_on_insert: bool,
    },
}

pub fn derive_mode(kind: WriteKind) -> ValidationMode {
    match kind {
        WriteKind::Insert => ValidationMode::Document(SchemaView::Strict),
        WriteKind::Update => ValidationMode::Modifier {
            set: SchemaView::DeepPartial,
            set_on_insert: SchemaView::Partial,
            require_on_insert: false,
        },
        WriteKind::Upsert => ValidationMode::Modifier {
            set: SchemaView::DeepPartial,
            set_on_insert: SchemaView::Partial,
            require_on_insert: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_mode() {
        assert_eq!(
            derive_mode(WriteKind::Insert),
            ValidationMode::Document(SchemaView::Strict)
        );
        assert!(matches!(
            derive_mode(WriteKind::Update),
            ValidationMode::Modifier { set: SchemaView::DeepPartial, require_on_insert: false, .. }
        ));
        assert!(matches!(
            derive_mode(WriteKind::Upsert),
            ValidationMode::Modifier { set_on_insert: SchemaView::Partial, require_on_insert: true, .. }
        ));
    }
}
