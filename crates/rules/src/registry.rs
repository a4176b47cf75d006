use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{Fact, FactKind};

/// A named fact computed from the evaluation context.
pub trait Variable<C>: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> FactKind;
    fn evaluate(&self, ctx: &C) -> Result<Fact>;
}

/// A named side effect run when a rule triggers.
pub trait Action<C>: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, ctx: &mut C, params: &Map<String, Value>) -> Result<()>;
}

pub struct Registry<C> {
    variables: HashMap<&'static str, Box<dyn Variable<C>>>,
    actions: HashMap<&'static str, Box<dyn Action<C>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            actions: HashMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a variable, replacing any previous one with the same name.
    pub fn register_variable(&mut self, variable: impl Variable<C> + 'static) -> &mut Self {
        self.variables.insert(variable.name(), Box::new(variable));
        self
    }

    pub fn register_action(&mut self, action: impl Action<C> + 'static) -> &mut Self {
        self.actions.insert(action.name(), Box::new(action));
        self
    }

    pub fn variable(&self, name: &str) -> Option<&dyn Variable<C>> {
        self.variables.get(name).map(|variable| variable.as_ref())
    }

    pub fn action(&self, name: &str) -> Option<&dyn Action<C>> {
        self.actions.get(name).map(|action| action.as_ref())
    }
}
