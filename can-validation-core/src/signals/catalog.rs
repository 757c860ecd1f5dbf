//! Signal catalog
//!
//! Maps every signal name to the bus it lives on, its CAN id and the payload
//! codec. Loaded once and read-only afterwards.

use crate::types::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// Payload encoding of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PayloadKind {
    /// Symbolic values mapped to bytes
    #[serde(rename = "enum")]
    Enum,
    /// Unsigned integer in 0..=255
    #[serde(rename = "uint", alias = "unsigned")]
    Unsigned,
    /// Signed integer in -128..=127
    #[serde(rename = "int", alias = "signed")]
    Signed,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Enum => write!(f, "enum"),
            PayloadKind::Unsigned => write!(f, "uint"),
            PayloadKind::Signed => write!(f, "int"),
        }
    }
}

/// Payload codec rule for a signal
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PayloadDefinition {
    #[serde(rename = "type")]
    pub kind: PayloadKind,

    /// Symbol -> byte, in declaration order (enum only)
    #[serde(default)]
    pub mapping: IndexMap<String, u8>,
}

impl PayloadDefinition {
    pub fn unsigned() -> Self {
        Self {
            kind: PayloadKind::Unsigned,
            mapping: IndexMap::new(),
        }
    }

    pub fn signed() -> Self {
        Self {
            kind: PayloadKind::Signed,
            mapping: IndexMap::new(),
        }
    }

    /// Enum payload from `(symbol, byte)` pairs, keeping their order
    pub fn enumeration<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        Self {
            kind: PayloadKind::Enum,
            mapping: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Unique signal name
    pub name: String,
    /// Name of the bus (port) carrying the signal
    pub bus: String,
    /// CAN frame id, unique per bus
    pub can_id: u32,
    pub payload: PayloadDefinition,
}

impl SignalDefinition {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, can_id: u32, payload: PayloadDefinition) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            can_id,
            payload,
        }
    }
}

/// CAN id as written in YAML: a number or a `0x` prefixed string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCanId {
    Number(u32),
    Text(String),
}

impl RawCanId {
    fn resolve(&self, signal: &str) -> Result<u32, ConfigError> {
        match self {
            RawCanId::Number(id) => Ok(*id),
            RawCanId::Text(text) => {
                let text = text.trim();
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => text.parse::<u32>(),
                };
                parsed.map_err(|_| {
                    ConfigError::InvalidSignalDefinition(format!(
                        "signal {} has an invalid can_id {:?}",
                        signal, text
                    ))
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSignal {
    bus: String,
    #[serde(alias = "frame_id")]
    can_id: RawCanId,
    payload: PayloadDefinition,
}

#[derive(Debug, Deserialize)]
struct RawSignalFile {
    #[serde(default)]
    signals: IndexMap<String, RawSignal>,
}

/// Container for all configured signals
#[derive(Debug, Clone, Default)]
pub struct SignalCatalog {
    signals: BTreeMap<String, SignalDefinition>,
    /// (bus, can_id) -> signal name
    frame_index: HashMap<(String, u32), String>,
}

impl SignalCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the `signals:` mapping from a YAML file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading signal catalog: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse(&content, &format!("{:?}", path))?;
        log::info!("Loaded {} signals from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Load the `signals:` mapping from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "signal catalog")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: RawSignalFile = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

        let mut catalog = Self::new();
        for (name, signal) in raw.signals {
            let can_id = signal.can_id.resolve(&name)?;
            catalog.insert(SignalDefinition::new(name, signal.bus, can_id, signal.payload))?;
        }
        Ok(catalog)
    }

    /// Add a definition, enforcing the catalog invariants
    pub fn insert(&mut self, definition: SignalDefinition) -> Result<(), ConfigError> {
        validate_definition(&definition)?;

        if self.signals.contains_key(&definition.name) {
            return Err(ConfigError::InvalidSignalDefinition(format!(
                "signal {} is defined twice",
                definition.name
            )));
        }

        let frame_key = (definition.bus.clone(), definition.can_id);
        if let Some(existing) = self.frame_index.get(&frame_key) {
            return Err(ConfigError::InvalidSignalDefinition(format!(
                "signals {} and {} share CAN id 0x{:X} on bus {}",
                existing, definition.name, definition.can_id, definition.bus
            )));
        }

        self.frame_index.insert(frame_key, definition.name.clone());
        self.signals.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Builder method: add a definition
    pub fn with_signal(mut self, definition: SignalDefinition) -> Result<Self, ConfigError> {
        self.insert(definition)?;
        Ok(self)
    }

    /// Look up a signal by name
    pub fn get(&self, name: &str) -> Result<&SignalDefinition, ConfigError> {
        self.signals
            .get(name)
            .ok_or_else(|| ConfigError::SignalNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    /// Signal bound to `can_id` on `bus`, if any
    pub fn find_by_frame(&self, bus: &str, can_id: u32) -> Option<&SignalDefinition> {
        self.frame_index
            .get(&(bus.to_string(), can_id))
            .and_then(|name| self.signals.get(name))
    }

    /// All definitions, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &SignalDefinition> {
        self.signals.values()
    }

    /// Distinct bus names referenced by the catalog
    pub fn buses(&self) -> BTreeSet<&str> {
        self.signals.values().map(|s| s.bus.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

fn validate_definition(definition: &SignalDefinition) -> Result<(), ConfigError> {
    if definition.bus.trim().is_empty() {
        return Err(ConfigError::InvalidSignalDefinition(format!(
            "signal {} has no bus",
            definition.name
        )));
    }

    match definition.payload.kind {
        PayloadKind::Enum if definition.payload.mapping.is_empty() => {
            Err(ConfigError::InvalidSignalDefinition(format!(
                "enum signal {} has an empty mapping",
                definition.name
            )))
        }
        PayloadKind::Unsigned | PayloadKind::Signed if !definition.payload.mapping.is_empty() => {
            log::warn!(
                "Ignoring mapping of {} signal {}",
                definition.payload.kind,
                definition.name
            );
            Ok(())
        }
        _ => Ok(()),
    }
}
