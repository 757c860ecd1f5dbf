//! Declarative precondition definitions
//!
//! A precondition is an ordered list of steps establishing an environment
//! state, plus the rollback steps to run if any of them fails.

use crate::types::{ConfigError, SignalValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Value attached to a step
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StepValue {
    /// `{ min: .., max: .. }` for range assertions
    Range { min: f64, max: f64 },
    /// Several acceptable values
    List(Vec<SignalValue>),
    /// A single value
    Scalar(SignalValue),
}

impl fmt::Display for StepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepValue::Range { min, max } => write!(f, "{}..={}", min, max),
            StepValue::List(values) => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", values.join(", "))
            }
            StepValue::Scalar(value) => write!(f, "{}", value),
        }
    }
}

/// A single declarative step within a precondition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PreconditionStep {
    pub action: String,
    pub target: String,
    #[serde(default)]
    pub value: Option<StepValue>,
}

impl PreconditionStep {
    pub fn new(action: impl Into<String>, target: impl Into<String>, value: Option<StepValue>) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            value,
        }
    }
}

impl fmt::Display for PreconditionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {}={}", self.action, self.target, value),
            None => write!(f, "{} {}", self.action, self.target),
        }
    }
}

/// Time budget applied to the wait and assert steps of a precondition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SlaPolicy {
    /// Seconds each wait/assert step may take
    #[serde(default = "default_sla_timeout")]
    pub timeout: f64,
    /// Seconds between sub-polls while waiting
    #[serde(default = "default_polling_interval")]
    pub polling_interval: f64,
}

fn default_sla_timeout() -> f64 {
    30.0
}

fn default_polling_interval() -> f64 {
    1.0
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            timeout: default_sla_timeout(),
            polling_interval: default_polling_interval(),
        }
    }
}

impl SlaPolicy {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout)
    }

    pub fn polling_interval(&self) -> Duration {
        seconds(self.polling_interval)
    }

    /// Both values must be non-negative seconds representable as a `Duration`
    pub fn validate(&self, precondition: &str) -> Result<(), ConfigError> {
        for (field, value) in [("timeout", self.timeout), ("polling_interval", self.polling_interval)] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidStep(format!(
                    "precondition {} has an invalid sla.{}: {}",
                    precondition, field, value
                )));
            }
        }
        Ok(())
    }
}

/// Saturating conversion; negative and NaN become zero
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SafetyPolicy {
    #[serde(default = "default_true")]
    pub abort_on_fault: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self { abort_on_fault: true }
    }
}

/// Complete description of a precondition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PreconditionDefinition {
    /// Filled from the catalog key when loaded from YAML
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sla: SlaPolicy,
    #[serde(default)]
    pub safety: SafetyPolicy,
    #[serde(default)]
    pub steps: Vec<PreconditionStep>,
    #[serde(default)]
    pub rollback: Vec<PreconditionStep>,
}

impl PreconditionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            sla: SlaPolicy::default(),
            safety: SafetyPolicy::default(),
            steps: Vec::new(),
            rollback: Vec::new(),
        }
    }

    /// Builder method: append a step
    pub fn step(mut self, step: PreconditionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Builder method: append a rollback step
    pub fn rollback_step(mut self, step: PreconditionStep) -> Self {
        self.rollback.push(step);
        self
    }

    /// Builder method: set the SLA
    pub fn with_sla(mut self, timeout: Duration, polling_interval: Duration) -> Self {
        self.sla = SlaPolicy {
            timeout: timeout.as_secs_f64(),
            polling_interval: polling_interval.as_secs_f64(),
        };
        self
    }

    /// Steps followed by rollback steps
    pub fn all_steps(&self) -> impl Iterator<Item = &PreconditionStep> {
        self.steps.iter().chain(self.rollback.iter())
    }
}

#[derive(Debug, Deserialize)]
struct RawPreconditionFile {
    #[serde(default)]
    preconditions: IndexMap<String, PreconditionDefinition>,
}

/// Container for all configured preconditions
#[derive(Debug, Clone, Default)]
pub struct PreconditionCatalog {
    preconditions: BTreeMap<String, PreconditionDefinition>,
}

impl PreconditionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the `preconditions:` mapping from a YAML file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading precondition catalog: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &format!("{:?}", path))
    }

    /// Load the `preconditions:` mapping from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "precondition catalog")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: RawPreconditionFile = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

        let mut catalog = Self::new();
        for (name, mut definition) in raw.preconditions {
            definition.name = name;
            catalog.insert(definition)?;
        }
        Ok(catalog)
    }

    /// Add a definition; names must be unique and steps well formed
    pub fn insert(&mut self, definition: PreconditionDefinition) -> Result<(), ConfigError> {
        definition.sla.validate(&definition.name)?;

        if let Some(step) = definition
            .all_steps()
            .find(|step| step.action.trim().is_empty() || step.target.trim().is_empty())
        {
            return Err(ConfigError::InvalidStep(format!(
                "precondition {} has a step without action or target: {:?}",
                definition.name, step
            )));
        }

        if self.preconditions.contains_key(&definition.name) {
            return Err(ConfigError::InvalidStep(format!(
                "precondition {} is defined twice",
                definition.name
            )));
        }

        self.preconditions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Builder method: add a definition
    pub fn with_precondition(mut self, definition: PreconditionDefinition) -> Result<Self, ConfigError> {
        self.insert(definition)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&PreconditionDefinition, ConfigError> {
        self.preconditions
            .get(name)
            .ok_or_else(|| ConfigError::PreconditionNotFound(name.to_string()))
    }

    /// All definitions, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &PreconditionDefinition> {
        self.preconditions.values()
    }

    pub fn len(&self) -> usize {
        self.preconditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty()
    }
}
