use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ledger_core::{AllocationSource, AllocationSourceSnapshot};
use ledger_db::Db;
use rules::{
    Action, Engine, EngineOptions, Fact, FactKind, Registry, Rule, RuleError, RuleOutcome,
    Variable,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, info_span, warn};

use crate::error::{AppError, Result};
use crate::renewal_rules::load_renewal_rules;
use crate::services::{SharedConfig, open_db};

/// Facts about one allocation source at one evaluation instant.
#[derive(Debug, Clone)]
pub struct RenewalContext {
    pub source: AllocationSource,
    pub snapshot: Option<AllocationSourceSnapshot>,
    pub now: DateTime<Utc>,
    pub renewal_period_days: i64,
    /// Renewals requested by actions, applied once evaluation finishes.
    pub renewals: Vec<DateTime<Utc>>,
}

pub struct IsValid;

impl Variable<RenewalContext> for IsValid {
    fn name(&self) -> &'static str {
        "is_valid"
    }

    fn kind(&self) -> FactKind {
        FactKind::Boolean
    }

    /// A source without an end date never expires.
    fn evaluate(&self, ctx: &RenewalContext) -> rules::Result<Fact> {
        Ok(ctx
            .source
            .end_date
            .is_none_or(|end_date| end_date > ctx.now)
            .into())
    }
}

pub struct IsPendingRenewal;

impl Variable<RenewalContext> for IsPendingRenewal {
    fn name(&self) -> &'static str {
        "is_pending_renewal"
    }

    fn kind(&self) -> FactKind {
        FactKind::Boolean
    }

    fn evaluate(&self, ctx: &RenewalContext) -> rules::Result<Fact> {
        let pending = ctx.snapshot.as_ref().is_some_and(|snapshot| {
            (ctx.now - snapshot.last_renewed).num_days() >= ctx.renewal_period_days
        });
        Ok(pending.into())
    }
}

pub struct RenewAllocationSource;

impl Action<RenewalContext> for RenewAllocationSource {
    fn name(&self) -> &'static str {
        "renew_allocation_source"
    }

    fn execute(&self, ctx: &mut RenewalContext, _params: &Map<String, Value>) -> rules::Result<()> {
        if ctx.snapshot.is_none() {
            return Err(RuleError::Precondition(format!(
                "allocation source {} cannot be renewed because no snapshot is available",
                ctx.source.name
            )));
        }
        ctx.renewals.push(ctx.now);
        Ok(())
    }
}

/// Variables and actions available to renewal rules.
pub fn renewal_registry() -> Registry<RenewalContext> {
    let mut registry = Registry::new();
    registry
        .register_variable(IsValid)
        .register_variable(IsPendingRenewal)
        .register_action(RenewAllocationSource);
    registry
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalOutcome {
    pub source_name: String,
    pub renewed: bool,
    pub rules: Vec<RuleOutcome>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenewalReport {
    pub evaluated: usize,
    pub renewed: Vec<String>,
    pub issues: Vec<RenewalIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalIssue {
    pub source_name: String,
    pub message: String,
}

#[derive(Clone)]
pub struct RenewalService {
    config: SharedConfig,
}

impl RenewalService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    fn rules_path(&self) -> Option<PathBuf> {
        self.config.rules_path.clone()
    }

    /// Evaluates the renewal rules for one source and applies any renewal.
    ///
    /// An unknown source name is a caller error.
    pub fn evaluate(&self, source_name: &str, now: DateTime<Utc>) -> Result<RenewalOutcome> {
        let rules = load_renewal_rules(self.rules_path().as_deref())?;
        let registry = renewal_registry();
        let engine = self.engine(&registry);
        engine.validate(&rules)?;
        let mut db = self.db()?;
        let source = db.allocation_source_by_name(source_name)?.ok_or_else(|| {
            RuleError::InvalidContext(format!("{} is not an allocation source", source_name))
        })?;
        self.evaluate_source(&mut db, &engine, &rules, source, now)
    }

    /// Evaluates every allocation source; failures are reported per source.
    pub fn evaluate_all(&self, now: DateTime<Utc>) -> Result<RenewalReport> {
        let span = info_span!("renewal_run", at = %now);
        let _guard = span.enter();

        let rules = load_renewal_rules(self.rules_path().as_deref())?;
        let registry = renewal_registry();
        let engine = self.engine(&registry);
        engine.validate(&rules)?;
        let mut db = self.db()?;

        let mut report = RenewalReport::default();
        for source in db.list_allocation_sources()? {
            report.evaluated += 1;
            let name = source.name.clone();
            match self.evaluate_source(&mut db, &engine, &rules, source, now) {
                Ok(outcome) if outcome.renewed => report.renewed.push(name),
                Ok(_) => {}
                Err(err) => {
                    warn!(source = %name, error = %err, "renewal evaluation failed");
                    report.issues.push(RenewalIssue {
                        source_name: name,
                        message: err.to_string(),
                    });
                }
            }
        }
        info!(
            evaluated = report.evaluated,
            renewed = report.renewed.len(),
            issues = report.issues.len(),
            "renewal run finished"
        );
        Ok(report)
    }

    fn engine<'r>(&self, registry: &'r Registry<RenewalContext>) -> Engine<'r, RenewalContext> {
        Engine::new(registry).with_options(EngineOptions {
            stop_on_first_trigger: self.config.settings.stop_on_first_trigger,
        })
    }

    fn evaluate_source(
        &self,
        db: &mut Db,
        engine: &Engine<'_, RenewalContext>,
        rules: &[Rule],
        source: AllocationSource,
        now: DateTime<Utc>,
    ) -> Result<RenewalOutcome> {
        let snapshot = db.source_snapshot(source.id)?;
        let mut ctx = RenewalContext {
            source,
            snapshot,
            now,
            renewal_period_days: self.config.settings.renewal_period_days,
            renewals: Vec::new(),
        };
        let outcomes = engine.run_all(rules, &mut ctx)?;
        // Several rules may ask for a renewal; the source is renewed once.
        let renewed = match ctx.renewals.first() {
            Some(renewed_at) => {
                db.renew_allocation_source(&ctx.source, *renewed_at)
                    .map_err(AppError::from)?;
                info!(source = %ctx.source.name, at = %renewed_at, "allocation source renewed");
                true
            }
            None => false,
        };
        Ok(RenewalOutcome {
            source_name: ctx.source.name,
            renewed,
            rules: outcomes,
        })
    }
}
