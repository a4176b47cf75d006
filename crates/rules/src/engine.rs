use serde::Serialize;
use tracing::debug;

use crate::error::{Result, RuleError};
use crate::model::{Condition, Rule};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Stop after the first rule whose conditions all hold.
    pub stop_on_first_trigger: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule_index: usize,
    pub triggered: bool,
    pub actions_run: Vec<String>,
}

pub struct Engine<'r, C> {
    registry: &'r Registry<C>,
    options: EngineOptions,
}

impl<'r, C> Engine<'r, C> {
    pub fn new(registry: &'r Registry<C>) -> Self {
        Self {
            registry,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks every name and literal against the registry without evaluating anything.
    pub fn validate(&self, rules: &[Rule]) -> Result<()> {
        for rule in rules {
            for condition in &rule.conditions.all {
                let variable = self
                    .registry
                    .variable(&condition.name)
                    .ok_or_else(|| RuleError::UnknownVariable(condition.name.clone()))?;
                let kind = variable.kind();
                if kind != condition.value.kind() || !condition.operator.supports(kind) {
                    return Err(RuleError::TypeMismatch {
                        name: condition.name.clone(),
                        operator: condition.operator,
                        expected: condition.value.kind(),
                        found: kind,
                    });
                }
            }
            for action in &rule.actions {
                if self.registry.action(&action.name).is_none() {
                    return Err(RuleError::UnknownAction(action.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Evaluates one rule; runs its actions in order when every condition holds.
    pub fn run(&self, rule: &Rule, ctx: &mut C) -> Result<Vec<String>> {
        if !self.conditions_hold(rule, ctx)? {
            return Ok(Vec::new());
        }
        self.run_actions(rule, ctx)
    }

    pub fn run_all(&self, rules: &[Rule], ctx: &mut C) -> Result<Vec<RuleOutcome>> {
        let mut outcomes = Vec::with_capacity(rules.len());
        for (rule_index, rule) in rules.iter().enumerate() {
            let triggered = self.conditions_hold(rule, ctx)?;
            let actions_run = if triggered {
                self.run_actions(rule, ctx)?
            } else {
                Vec::new()
            };
            debug!(rule = rule_index, triggered, "rule evaluated");
            outcomes.push(RuleOutcome {
                rule_index,
                triggered,
                actions_run,
            });
            if triggered && self.options.stop_on_first_trigger {
                break;
            }
        }
        Ok(outcomes)
    }

    fn run_actions(&self, rule: &Rule, ctx: &mut C) -> Result<Vec<String>> {
        let mut actions_run = Vec::with_capacity(rule.actions.len());
        for step in &rule.actions {
            let action = self
                .registry
                .action(&step.name)
                .ok_or_else(|| RuleError::UnknownAction(step.name.clone()))?;
            action.execute(ctx, &step.params)?;
            actions_run.push(step.name.clone());
        }
        Ok(actions_run)
    }

    fn conditions_hold(&self, rule: &Rule, ctx: &C) -> Result<bool> {
        for condition in &rule.conditions.all {
            if !self.holds(condition, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn holds(&self, condition: &Condition, ctx: &C) -> Result<bool> {
        let variable = self
            .registry
            .variable(&condition.name)
            .ok_or_else(|| RuleError::UnknownVariable(condition.name.clone()))?;
        let actual = variable.evaluate(ctx)?;
        condition
            .operator
            .compare(&condition.name, &actual, &condition.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fact, FactKind, parse_rules};
    use crate::registry::{Action, Variable};
    use serde_json::{Map, Value};

    #[derive(Default)]
    struct Counter {
        level: f64,
        enabled: bool,
        bumps: u32,
    }

    struct Level;

    impl Variable<Counter> for Level {
        fn name(&self) -> &'static str {
            "level"
        }
        fn kind(&self) -> FactKind {
            FactKind::Numeric
        }
        fn evaluate(&self, ctx: &Counter) -> Result<Fact> {
            Ok(ctx.level.into())
        }
    }

    struct Enabled;

    impl Variable<Counter> for Enabled {
        fn name(&self) -> &'static str {
            "enabled"
        }
        fn kind(&self) -> FactKind {
            FactKind::Boolean
        }
        fn evaluate(&self, ctx: &Counter) -> Result<Fact> {
            Ok(ctx.enabled.into())
        }
    }

    struct Bump;

    impl Action<Counter> for Bump {
        fn name(&self) -> &'static str {
            "bump"
        }
        fn execute(&self, ctx: &mut Counter, params: &Map<String, Value>) -> Result<()> {
            let by = params.get("by").and_then(Value::as_u64).unwrap_or(1);
            ctx.bumps += by as u32;
            Ok(())
        }
    }

    fn registry() -> Registry<Counter> {
        let mut registry = Registry::new();
        registry
            .register_variable(Level)
            .register_variable(Enabled)
            .register_action(Bump);
        registry
    }

    const RULES: &str = r#"[
        {"conditions": {"all": [
            {"name": "enabled", "operator": "equal_to", "value": true},
            {"name": "level", "operator": "greater_than_or_equal_to", "value": 10}
        ]}, "actions": [{"name": "bump"}]},
        {"conditions": {"all": [
            {"name": "level", "operator": "greater_than", "value": 20}
        ]}, "actions": [{"name": "bump", "params": {"by": 5}}]}
    ]"#;

    #[test]
    fn actions_run_only_when_all_conditions_hold() {
        let registry = registry();
        let rules = parse_rules(RULES).unwrap();
        let engine = Engine::new(&registry);
        engine.validate(&rules).unwrap();

        let mut ctx = Counter {
            level: 15.0,
            enabled: true,
            ..Counter::default()
        };
        let outcomes = engine.run_all(&rules, &mut ctx).unwrap();
        assert!(outcomes[0].triggered);
        assert_eq!(outcomes[0].actions_run, vec!["bump"]);
        assert!(!outcomes[1].triggered);
        assert_eq!(ctx.bumps, 1);

        ctx.enabled = false;
        ctx.bumps = 0;
        let outcomes = engine.run_all(&rules, &mut ctx).unwrap();
        assert!(!outcomes[0].triggered);
        assert_eq!(ctx.bumps, 0);
    }

    #[test]
    fn stop_on_first_trigger_skips_later_rules() {
        let registry = registry();
        let rules = parse_rules(RULES).unwrap();
        let mut ctx = Counter {
            level: 25.0,
            enabled: true,
            ..Counter::default()
        };

        let outcomes = Engine::new(&registry).run_all(&rules, &mut ctx).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(ctx.bumps, 6);

        ctx.bumps = 0;
        let outcomes = Engine::new(&registry)
            .with_options(EngineOptions {
                stop_on_first_trigger: true,
            })
            .run_all(&rules, &mut ctx)
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(ctx.bumps, 1);
    }

    #[test]
    fn validate_rejects_unknown_names_and_bad_literals() {
        let registry = registry();
        let engine = Engine::new(&registry);

        let unknown_variable = parse_rules(
            r#"[{"conditions": {"all": [{"name": "nope", "operator": "equal_to", "value": true}]}, "actions": []}]"#,
        )
        .unwrap();
        assert!(matches!(
            engine.validate(&unknown_variable),
            Err(RuleError::UnknownVariable(name)) if name == "nope"
        ));

        let unknown_action =
            parse_rules(r#"[{"conditions": {"all": []}, "actions": [{"name": "explode"}]}]"#)
                .unwrap();
        assert!(matches!(
            engine.validate(&unknown_action),
            Err(RuleError::UnknownAction(_))
        ));

        let wrong_type = parse_rules(
            r#"[{"conditions": {"all": [{"name": "enabled", "operator": "less_than", "value": 3}]}, "actions": []}]"#,
        )
        .unwrap();
        assert!(matches!(
            engine.validate(&wrong_type),
            Err(RuleError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn rule_without_conditions_always_triggers() {
        let registry = registry();
        let rules =
            parse_rules(r#"[{"conditions": {"all": []}, "actions": [{"name": "bump"}]}]"#).unwrap();
        let mut ctx = Counter::default();
        let fired = Engine::new(&registry).run(&rules[0], &mut ctx).unwrap();
        assert_eq!(fired, vec!["bump"]);
        assert_eq!(ctx.bumps, 1);
    }
}
