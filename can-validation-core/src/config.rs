//! Framework configuration types
//!
//! The framework file selects the execution mode and carries per-bus
//! connection parameters. Profiles (bench- or vehicle-specific overlays) are
//! deep-merged over the base file before deserialization.

use crate::types::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How ports are backed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Hardware-in-the-loop: real CAN interfaces
    Hardware,
    /// In-memory ports
    Simulated,
    /// Software-in-the-loop, also served by in-memory ports
    SoftwareInLoop,
}

impl ExecutionMode {
    pub fn uses_hardware(self) -> bool {
        matches!(self, ExecutionMode::Hardware)
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIL" | "HARDWARE" => Ok(ExecutionMode::Hardware),
            "MOCK" | "SIMULATED" => Ok(ExecutionMode::Simulated),
            "SIL" => Ok(ExecutionMode::SoftwareInLoop),
            _ => Err(ConfigError::UnsupportedMode(s.to_string())),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Hardware => write!(f, "HIL"),
            ExecutionMode::Simulated => write!(f, "MOCK"),
            ExecutionMode::SoftwareInLoop => write!(f, "SIL"),
        }
    }
}

/// Free-form key/value connection parameters for one bus
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BusParameters(BTreeMap<String, Value>);

impl BusParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set a parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Scalar parameter rendered as text (numbers and booleans included)
    pub fn get(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Interface section of the framework file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InterfacesConfig {
    /// CAN bus name -> connection parameters
    #[serde(default)]
    pub can: HashMap<String, BusParameters>,
}

/// Main framework configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrameworkConfig {
    /// Execution mode string (`hil`, `hardware`, `mock`, `simulated`, `sil`)
    pub mode: String,

    /// Named timeouts in seconds
    #[serde(default)]
    pub timeouts: HashMap<String, f64>,

    /// Logging options (`level` is honoured by the CLI)
    #[serde(default)]
    pub logging: HashMap<String, Option<String>>,

    #[serde(default)]
    pub interfaces: InterfacesConfig,
}

impl FrameworkConfig {
    /// Configuration for the given mode with no interfaces
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            timeouts: HashMap::new(),
            logging: HashMap::new(),
            interfaces: InterfacesConfig::default(),
        }
    }

    /// Builder method: add connection parameters for a bus
    pub fn with_bus(mut self, bus: impl Into<String>, parameters: BusParameters) -> Self {
        self.interfaces.can.insert(bus.into(), parameters);
        self
    }

    /// Load a single framework file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::merge(path, &[])
    }

    /// Load `base` and deep-merge each existing profile over it, in order
    pub fn merge(base: &Path, profiles: &[PathBuf]) -> Result<Self, ConfigError> {
        log::info!("Loading framework configuration: {:?}", base);
        let mut merged = read_yaml(base)?;

        for profile in profiles {
            if !profile.exists() {
                log::warn!("Skipping missing configuration profile: {:?}", profile);
                continue;
            }
            log::debug!("Merging configuration profile: {:?}", profile);
            let overlay = read_yaml(profile)?;
            merged = deep_merge(merged, overlay);
        }

        serde_yaml::from_value(merged).map_err(|e| ConfigError::Parse {
            origin: format!("{:?}", base),
            message: e.to_string(),
        })
    }

    /// Parse a framework document held in memory
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            origin: "framework configuration".to_string(),
            message: e.to_string(),
        })
    }

    /// Resolve the mode string
    pub fn execution_mode(&self) -> Result<ExecutionMode, ConfigError> {
        self.mode.parse()
    }

    /// Connection parameters for `bus` (empty when not configured)
    pub fn bus_parameters(&self, bus: &str) -> BusParameters {
        self.interfaces.can.get(bus).cloned().unwrap_or_default()
    }

    /// Named timeout, ignoring negative or non-finite values
    pub fn timeout(&self, key: &str) -> Option<Duration> {
        self.timeouts
            .get(key)
            .copied()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Configured log level, if any
    pub fn log_level(&self) -> Option<&str> {
        self.logging.get("level").and_then(|level| level.as_deref())
    }
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        origin: format!("{:?}", path),
        message: e.to_string(),
    })
}

/// Recursively merge `overlay` into `base`
///
/// Nested mappings merge key by key; any other value in the overlay replaces
/// the base value outright.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_execution_mode_parsing() {
        assert_eq!("hil".parse::<ExecutionMode>().unwrap(), ExecutionMode::Hardware);
        assert_eq!("Mock".parse::<ExecutionMode>().unwrap(), ExecutionMode::Simulated);
        assert_eq!("SIL".parse::<ExecutionMode>().unwrap(), ExecutionMode::SoftwareInLoop);
        assert!(matches!(
            "replay".parse::<ExecutionMode>(),
            Err(ConfigError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_deep_merge() {
        let base: Value = serde_yaml::from_str(
            "mode: mock\ninterfaces:\n  can:\n    body: { channel: vcan0, bitrate: 500000 }\n",
        )
        .unwrap();
        let overlay: Value = serde_yaml::from_str(
            "mode: hil\ninterfaces:\n  can:\n    body: { channel: can1 }\n    chassis: { channel: can2 }\n",
        )
        .unwrap();

        let config: FrameworkConfig = serde_yaml::from_value(deep_merge(base, overlay)).unwrap();
        assert_eq!(config.mode, "hil");

        let body = config.bus_parameters("body");
        assert_eq!(body.get("channel").as_deref(), Some("can1"));
        assert_eq!(body.get("bitrate").as_deref(), Some("500000"));
        assert_eq!(config.bus_parameters("chassis").get("channel").as_deref(), Some("can2"));
        assert!(config.bus_parameters("powertrain").is_empty());
    }

    #[test]
    fn test_merge_skips_missing_profiles() {
        let mut base = tempfile::NamedTempFile::new().unwrap();
        writeln!(base, "mode: sil\ntimeouts:\n  default_read: 0.5\nlogging:\n  level: debug").unwrap();

        let missing = PathBuf::from("/nonexistent/profile.yaml");
        let config = FrameworkConfig::merge(base.path(), &[missing]).unwrap();

        assert_eq!(config.execution_mode().unwrap(), ExecutionMode::SoftwareInLoop);
        assert_eq!(config.timeout("default_read"), Some(Duration::from_millis(500)));
        assert_eq!(config.timeout("unknown"), None);
        assert_eq!(config.log_level(), Some("debug"));
    }

    #[test]
    fn test_missing_base_file_is_io_error() {
        let result = FrameworkConfig::from_path(Path::new("/nonexistent/framework.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
