//! Precondition engine
//!
//! Applies a precondition's steps in order. The first failing step stops the
//! forward pass; every declared rollback step then runs on a best-effort
//! basis and the original failure is returned, wrapped with the precondition
//! name. Rollback is compensation, not a transaction: state established by
//! earlier successful steps is only undone by what the rollback steps do.

use super::catalog::{PreconditionCatalog, PreconditionDefinition, PreconditionStep, SlaPolicy, StepValue};
use crate::broker::InteractionBroker;
use crate::types::{ConfigError, Result, RollbackFailure, SignalValue, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a step handler gets to work with
pub struct StepContext<'a> {
    pub broker: &'a InteractionBroker,
    pub target: &'a str,
    pub value: Option<&'a StepValue>,
    pub sla: &'a SlaPolicy,
}

impl StepContext<'_> {
    /// The step's value as a single scalar
    pub fn scalar(&self, action: &str) -> Result<&SignalValue> {
        match self.value {
            Some(StepValue::Scalar(value)) => Ok(value),
            other => Err(ValidationError::InvalidValue(format!(
                "{} on {} requires a single value, got {}",
                action,
                self.target,
                describe(other)
            ))),
        }
    }
}

fn describe(value: Option<&StepValue>) -> String {
    value.map(ToString::to_string).unwrap_or_else(|| "nothing".to_string())
}

/// Handler executing one kind of step
pub type ActionHandler = Box<dyn Fn(&StepContext<'_>) -> Result<()> + Send + Sync>;

/// Action names handled out of the box; their targets are signal names
pub const BUILTIN_ACTIONS: [&str; 5] = [
    "set_signal",
    "wait_for_signal",
    "assert_signal",
    "assert_signal_in",
    "assert_signal_range",
];

/// Evaluate preconditions using broker interactions
pub struct PreconditionEngine {
    catalog: Arc<PreconditionCatalog>,
    broker: Arc<InteractionBroker>,
    actions: HashMap<String, ActionHandler>,
}

impl PreconditionEngine {
    /// Create an engine with the built-in actions registered
    pub fn new(catalog: Arc<PreconditionCatalog>, broker: Arc<InteractionBroker>) -> Self {
        let mut engine = Self {
            catalog,
            broker,
            actions: HashMap::new(),
        };
        engine.register_action("set_signal", set_signal);
        engine.register_action("wait_for_signal", wait_for_signal);
        engine.register_action("assert_signal", assert_signal);
        engine.register_action("assert_signal_in", assert_signal_in);
        engine.register_action("assert_signal_range", assert_signal_range);
        engine
    }

    /// Register (or replace) the handler for `name`
    pub fn register_action<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&StepContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.actions.insert(name.clone(), Box::new(handler)).is_some() {
            log::debug!("Replaced handler for precondition action {}", name);
        }
    }

    /// Registered action names, sorted
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn catalog(&self) -> &PreconditionCatalog {
        &self.catalog
    }

    /// Check every precondition against the registered actions and signals
    ///
    /// Catches unknown actions and built-in steps targeting undefined signals
    /// before anything is sent on a bus.
    pub fn validate(&self) -> Result<()> {
        for definition in self.catalog.iter() {
            for step in definition.all_steps() {
                if !self.actions.contains_key(&step.action) {
                    return Err(ConfigError::UnsupportedAction(format!(
                        "{} (in precondition {})",
                        step.action, definition.name
                    ))
                    .into());
                }
                if BUILTIN_ACTIONS.contains(&step.action.as_str()) && !self.broker.catalog().contains(&step.target) {
                    return Err(ConfigError::SignalNotFound(format!(
                        "{} (in precondition {})",
                        step.target, definition.name
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Apply the named precondition
    pub fn apply(&self, name: &str) -> Result<()> {
        let definition = self.catalog.get(name)?;
        log::info!("Applying precondition {}", name);

        for (index, step) in definition.steps.iter().enumerate() {
            if let Err(error) = self.dispatch(step, &definition.sla) {
                log::error!("Precondition {} failed at step {} ({}): {}", name, index + 1, step, error);
                let rollback_failures = self.rollback(definition);
                return Err(ValidationError::PreconditionFailed {
                    name: name.to_string(),
                    step: index + 1,
                    action: step.action.clone(),
                    source: Box::new(error),
                    rollback_failures,
                });
            }
        }

        log::info!("Precondition {} applied", name);
        Ok(())
    }

    fn dispatch(&self, step: &PreconditionStep, sla: &SlaPolicy) -> Result<()> {
        let handler = self
            .actions
            .get(&step.action)
            .ok_or_else(|| ConfigError::UnsupportedAction(step.action.clone()))?;

        log::debug!("Executing step {}", step);
        handler(&StepContext {
            broker: &self.broker,
            target: &step.target,
            value: step.value.as_ref(),
            sla,
        })
    }

    /// Run every rollback step, collecting failures instead of stopping
    fn rollback(&self, definition: &PreconditionDefinition) -> Vec<RollbackFailure> {
        if definition.rollback.is_empty() {
            return Vec::new();
        }

        log::info!("Rolling back precondition {}", definition.name);
        let mut failures = Vec::new();
        for step in &definition.rollback {
            if let Err(error) = self.dispatch(step, &definition.sla) {
                log::error!("Rollback step {} failed: {}", step, error);
                failures.push(RollbackFailure {
                    action: step.action.clone(),
                    target: step.target.clone(),
                    message: error.to_string(),
                });
            }
        }
        failures
    }
}

fn set_signal(ctx: &StepContext<'_>) -> Result<()> {
    let value = ctx.scalar("set_signal")?;
    ctx.broker.set_signal(ctx.target, value.clone()).map(|_| ())
}

fn wait_for_signal(ctx: &StepContext<'_>) -> Result<()> {
    let value = ctx.scalar("wait_for_signal")?;
    ctx.broker.wait_for_signal(
        ctx.target,
        value.clone(),
        Some(ctx.sla.timeout()),
        ctx.sla.polling_interval(),
    )
}

fn assert_signal(ctx: &StepContext<'_>) -> Result<()> {
    let value = ctx.scalar("assert_signal")?;
    ctx.broker.assert_signal_equal(ctx.target, value.clone(), ctx.sla.timeout())
}

fn assert_signal_in(ctx: &StepContext<'_>) -> Result<()> {
    let expected = match ctx.value {
        Some(StepValue::List(values)) => values.clone(),
        Some(StepValue::Scalar(value)) => vec![value.clone()],
        other => {
            return Err(ValidationError::InvalidValue(format!(
                "assert_signal_in on {} requires a list of values, got {}",
                ctx.target,
                describe(other)
            )))
        }
    };
    ctx.broker.assert_signal_in(ctx.target, &expected, ctx.sla.timeout())
}

fn assert_signal_range(ctx: &StepContext<'_>) -> Result<()> {
    match ctx.value {
        Some(StepValue::Range { min, max }) => {
            ctx.broker.assert_signal_in_range(ctx.target, *min, *max, ctx.sla.timeout())
        }
        other => Err(ValidationError::InvalidValue(format!(
            "assert_signal_range on {} requires a mapping with 'min' and 'max', got {}",
            ctx.target,
            describe(other)
        ))),
    }
}
