use crate::model::{FactKind, Operator};

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule set is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("unknown action {0}")]
    UnknownAction(String),
    #[error("{operator} cannot compare {name} ({found}) with a {expected} value")]
    TypeMismatch {
        name: String,
        operator: Operator,
        expected: FactKind,
        found: FactKind,
    },
    /// Stored data does not allow the action to proceed.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// The caller bound the engine to something the rule cannot act on.
    #[error("invalid rule context: {0}")]
    InvalidContext(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;
