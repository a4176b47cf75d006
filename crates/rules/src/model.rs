use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RuleError};

const NUMERIC_TOLERANCE: f64 = 1e-9;

/// A value produced by a variable or written as a literal in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fact {
    Boolean(bool),
    Numeric(f64),
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Self::Boolean(_) => FactKind::Boolean,
            Self::Numeric(_) => FactKind::Numeric,
        }
    }
}

impl From<bool> for Fact {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Fact {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactKind {
    Boolean,
    Numeric,
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Boolean => "boolean",
            Self::Numeric => "numeric",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EqualTo => "equal_to",
            Self::NotEqualTo => "not_equal_to",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqualTo => "greater_than_or_equal_to",
            Self::LessThan => "less_than",
            Self::LessThanOrEqualTo => "less_than_or_equal_to",
        }
    }

    /// Ordering operators only make sense for numbers.
    pub fn supports(&self, kind: FactKind) -> bool {
        match self {
            Self::EqualTo | Self::NotEqualTo => true,
            _ => kind == FactKind::Numeric,
        }
    }

    /// Compares a variable's value (`actual`) against a condition literal.
    pub fn compare(&self, name: &str, actual: &Fact, expected: &Fact) -> Result<bool> {
        let mismatch = || RuleError::TypeMismatch {
            name: name.to_string(),
            operator: *self,
            expected: expected.kind(),
            found: actual.kind(),
        };
        match (actual, expected) {
            (Fact::Boolean(lhs), Fact::Boolean(rhs)) => match self {
                Self::EqualTo => Ok(lhs == rhs),
                Self::NotEqualTo => Ok(lhs != rhs),
                _ => Err(mismatch()),
            },
            (Fact::Numeric(lhs), Fact::Numeric(rhs)) => {
                let equal = (lhs - rhs).abs() <= NUMERIC_TOLERANCE;
                Ok(match self {
                    Self::EqualTo => equal,
                    Self::NotEqualTo => !equal,
                    Self::GreaterThan => lhs > rhs && !equal,
                    Self::GreaterThanOrEqualTo => lhs > rhs || equal,
                    Self::LessThan => lhs < rhs && !equal,
                    Self::LessThanOrEqualTo => lhs < rhs || equal,
                })
            }
            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub operator: Operator,
    pub value: Fact,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub all: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

pub fn parse_rules(raw: &str) -> Result<Vec<Rule>> {
    Ok(serde_json::from_str(raw)?)
}
