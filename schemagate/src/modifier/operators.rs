use std::fmt;

/// Update operators the translator knows how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Set,
    SetOnInsert,
    Push,
    AddToSet,
    Pop,
    /// Forwarded to the store without schema checks.
    PassThrough,
}

/// Operators that are forwarded unvalidated on purpose. Anything else that
/// starts with `$` is forwarded too, but logged as unrecognized.
const UNVALIDATED: &[&str] = &[
    "$unset",
    "$inc",
    "$mul",
    "$rename",
    "$min",
    "$max",
    "$currentDate",
    "$",
    "$[]",
    "$pull",
    "$pullAll",
    "$bit",
];

impl Operator {
    /// `None` for keys that are not operators at all.
    pub fn classify(key: &str) -> Option<Operator> {
        let operator = match key {
            "$set" => Operator::Set,
            "$setOnInsert" => Operator::SetOnInsert,
            "$push" => Operator::Push,
            "$addToSet" => Operator::AddToSet,
            "$pop" => Operator::Pop,
            other if other.starts_with('$') => {
                if !UNVALIDATED.contains(&other) {
                    log::debug!("Unrecognized update operator '{other}' passed through");
                }
                Operator::PassThrough
            }
            _ => return None,
        };
        Some(operator)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Set => "$set",
            Operator::SetOnInsert => "$setOnInsert",
            Operator::Push => "$push",
            Operator::AddToSet => "$addToSet",
            Operator::Pop => "$pop",
            Operator::PassThrough => "pass-through",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
