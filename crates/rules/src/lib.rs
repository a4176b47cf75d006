//! Declarative rule evaluation over named facts.
//!
//! A rule is a conjunction of conditions (`variable operator literal`) and a
//! list of actions run when every condition holds. Variables and actions are
//! looked up by name in a [`Registry`], so new ones can be added without
//! touching the evaluation loop.

mod engine;
mod error;
mod model;
mod registry;

pub use engine::{Engine, EngineOptions, RuleOutcome};
pub use error::{Result, RuleError};
pub use model::{ActionSpec, Condition, Conditions, Fact, FactKind, Operator, Rule, parse_rules};
pub use registry::{Action, Registry, Variable};
