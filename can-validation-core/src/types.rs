//! Core types for the CAN validation library
//!
//! This module defines the values that flow between the broker and the ports
//! (frames, transmission results, signal values) and the error taxonomy every
//! operation reports through.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for validation operations
pub type Result<T> = std::result::Result<T, ValidationError>;

/// A CAN frame as sent to or received from a port
///
/// Only the first data byte is interpreted by the signal codec; the remaining
/// bytes are carried along untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct CanMessage {
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Frame data bytes
    pub data: Vec<u8>,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// Capture time, assigned once when the frame is received
    pub timestamp: Option<Timestamp>,
}

impl CanMessage {
    /// Create a standard-id frame without a timestamp
    pub fn new(can_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            can_id,
            data: data.into(),
            is_extended: false,
            timestamp: None,
        }
    }

    /// Builder method: mark the frame as using an extended (29-bit) id
    pub fn with_extended_id(mut self, extended: bool) -> Self {
        self.is_extended = extended;
        self
    }

    /// Stamp the frame with the current time unless it already carries one
    pub fn with_timestamp(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }

    /// First payload byte, the only one the codec looks at
    pub fn first_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

impl fmt::Display for CanMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X} [", self.can_id)?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}

/// Outcome of attempting to send a CAN frame
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: Timestamp,
}

impl TransmissionResult {
    /// A successful transmission stamped now
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed transmission stamped now
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Logical value of a signal, as passed in by callers and produced by decoding
///
/// Enum signals decode to `Symbol` (or to `Integer` when the byte has no
/// mapping entry); integer signals decode to `Integer`.
///
/// When read from configuration, booleans become `0`/`1` and whole floats
/// become integers; other floats are kept as their text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SignalValue {
    Integer(i64),
    Symbol(String),
}

impl SignalValue {
    /// Loose equality used by every wait and assert primitive
    ///
    /// Symbols compare case-insensitively; an integer equals a symbol that
    /// parses to the same number.
    pub fn matches(&self, other: &SignalValue) -> bool {
        match (self, other) {
            (SignalValue::Integer(a), SignalValue::Integer(b)) => a == b,
            (SignalValue::Symbol(a), SignalValue::Symbol(b)) => a.eq_ignore_ascii_case(b),
            (SignalValue::Integer(i), SignalValue::Symbol(s))
            | (SignalValue::Symbol(s), SignalValue::Integer(i)) => {
                s.trim().parse::<i64>().map(|parsed| parsed == *i).unwrap_or(false)
            }
        }
    }

    /// Integer view of the value, parsing symbols when they are numeric
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SignalValue::Integer(v) => Some(*v),
            SignalValue::Symbol(s) => s.trim().parse().ok(),
        }
    }

    /// Convert signal value to f64 for range checks
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Integer(v) => Some(*v as f64),
            SignalValue::Symbol(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            SignalValue::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl<'de> Deserialize<'de> for SignalValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SignalValueVisitor)
    }
}

struct SignalValueVisitor;

impl<'de> Visitor<'de> for SignalValueVisitor {
    type Value = SignalValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an integer, a symbol, a boolean or a number")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<SignalValue, E> {
        Ok(SignalValue::Integer(value as i64))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<SignalValue, E> {
        Ok(SignalValue::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<SignalValue, E> {
        i64::try_from(value)
            .map(SignalValue::Integer)
            .map_err(|_| E::custom(format!("integer {} is out of range", value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<SignalValue, E> {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Ok(SignalValue::Integer(value as i64))
        } else {
            Ok(SignalValue::Symbol(value.to_string()))
        }
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<SignalValue, E> {
        Ok(SignalValue::Symbol(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<SignalValue, E> {
        Ok(SignalValue::Symbol(value))
    }
}

/// Parses command-line style input: integers become `Integer`, anything else a `Symbol`
impl FromStr for SignalValue {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(v) => SignalValue::Integer(v),
            Err(_) => SignalValue::Symbol(s.to_string()),
        })
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Symbol(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::Symbol(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        SignalValue::Integer(value)
    }
}

impl From<i32> for SignalValue {
    fn from(value: i32) -> Self {
        SignalValue::Integer(value as i64)
    }
}

impl From<u8> for SignalValue {
    fn from(value: u8) -> Self {
        SignalValue::Integer(value as i64)
    }
}

/// Failures raised while loading or resolving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Unsupported execution mode: {0}")]
    UnsupportedMode(String),

    #[error("Signal {0:?} is not defined in the configuration")]
    SignalNotFound(String),

    #[error("Precondition {0:?} is not defined in the configuration")]
    PreconditionNotFound(String),

    #[error("Unsupported precondition action: {0}")]
    UnsupportedAction(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Invalid precondition step: {0}")]
    InvalidStep(String),
}

/// Port-level failures (hardware abstraction layer)
#[derive(Debug, Clone, thiserror::Error)]
pub enum HalError {
    /// Non-recoverable CAN interface error
    #[error("CAN error on bus {bus}: {message}")]
    Can { bus: String, message: String },

    /// No frame arrived within the receive window
    #[error("Timeout on bus {bus} after {timeout:?}")]
    Timeout { bus: String, timeout: Duration },
}

impl HalError {
    pub fn can(bus: impl Into<String>, message: impl Into<String>) -> Self {
        HalError::Can {
            bus: bus.into(),
            message: message.into(),
        }
    }

    /// True when the receive window simply expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, HalError::Timeout { .. })
    }
}

/// A rollback step that failed while recovering from a precondition failure
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackFailure {
    pub action: String,
    pub target: String,
    pub message: String,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.target, self.message)
    }
}

/// Who is to blame for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Bad configuration, detected at load or construction time
    Configuration,
    /// Raw port failure that was not reclassified
    Port,
    /// A caller-supplied value could not be encoded or interpreted
    InvalidValue,
    /// Test tooling or environment misbehaved
    Environment,
    /// The system under test did not reach the expected state
    Sut,
}

/// Errors surfaced by the broker, the precondition engine and the registry
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Environment fault: {message}")]
    EnvironmentFault {
        message: String,
        #[source]
        source: Option<Box<ValidationError>>,
    },

    #[error("SUT fault: {0}")]
    SutFault(String),

    #[error("Precondition {name} failed at step {step} ({action}): {source}")]
    PreconditionFailed {
        name: String,
        /// 1-based index of the failing step
        step: usize,
        action: String,
        #[source]
        source: Box<ValidationError>,
        /// Rollback steps that failed too, in execution order
        rollback_failures: Vec<RollbackFailure>,
    },
}

impl ValidationError {
    /// Environment fault without an underlying cause
    pub fn environment(message: impl Into<String>) -> Self {
        ValidationError::EnvironmentFault {
            message: message.into(),
            source: None,
        }
    }

    /// Environment fault wrapping the error that caused it
    pub fn environment_caused_by(message: impl Into<String>, cause: impl Into<ValidationError>) -> Self {
        ValidationError::EnvironmentFault {
            message: message.into(),
            source: Some(Box::new(cause.into())),
        }
    }

    pub fn sut(message: impl Into<String>) -> Self {
        ValidationError::SutFault(message.into())
    }

    /// Classify the error by the party responsible for it
    pub fn kind(&self) -> FaultKind {
        match self {
            ValidationError::Config(_) => FaultKind::Configuration,
            ValidationError::Hal(_) => FaultKind::Port,
            ValidationError::InvalidValue(_) => FaultKind::InvalidValue,
            ValidationError::EnvironmentFault { .. } => FaultKind::Environment,
            ValidationError::PreconditionFailed { .. } => FaultKind::Environment,
            ValidationError::SutFault(_) => FaultKind::Sut,
        }
    }

    pub fn is_environment_fault(&self) -> bool {
        self.kind() == FaultKind::Environment
    }

    pub fn is_sut_fault(&self) -> bool {
        self.kind() == FaultKind::Sut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_value_matching() {
        assert!(SignalValue::from("open").matches(&SignalValue::from("OPEN")));
        assert!(SignalValue::Integer(5).matches(&SignalValue::from("5")));
        assert!(SignalValue::from(" 5").matches(&SignalValue::Integer(5)));
        assert!(!SignalValue::Integer(5).matches(&SignalValue::Integer(6)));
        assert!(!SignalValue::from("OPEN").matches(&SignalValue::Integer(1)));
    }

    #[test]
    fn test_signal_value_parsing() {
        assert_eq!("42".parse::<SignalValue>().unwrap(), SignalValue::Integer(42));
        assert_eq!("-3".parse::<SignalValue>().unwrap(), SignalValue::Integer(-3));
        assert_eq!(
            "CLOSED".parse::<SignalValue>().unwrap(),
            SignalValue::Symbol("CLOSED".to_string())
        );
        assert_eq!(SignalValue::from("12.5").as_f64(), Some(12.5));
        assert_eq!(SignalValue::from("OPEN").as_f64(), None);
    }

    #[test]
    fn test_signal_value_from_yaml_scalars() {
        let parse = |text: &str| serde_yaml::from_str::<SignalValue>(text).unwrap();
        assert_eq!(parse("3"), SignalValue::Integer(3));
        assert_eq!(parse("-3"), SignalValue::Integer(-3));
        assert_eq!(parse("OPEN"), SignalValue::from("OPEN"));
        assert_eq!(parse("\"ON\""), SignalValue::from("ON"));
        assert_eq!(parse("true"), SignalValue::Integer(1));
        assert_eq!(parse("false"), SignalValue::Integer(0));
        assert_eq!(parse("2.0"), SignalValue::Integer(2));
        assert_eq!(parse("1.5"), SignalValue::from("1.5"));
        assert_eq!(parse("1.5").as_f64(), Some(1.5));
    }

    #[test]
    fn test_message_stamping_is_idempotent() {
        let stamped = CanMessage::new(0x100, vec![0x01]).with_timestamp();
        let first = stamped.timestamp;
        assert!(first.is_some());
        assert_eq!(stamped.with_timestamp().timestamp, first);
    }

    #[test]
    fn test_message_display() {
        let message = CanMessage::new(0x1A0, vec![0x01, 0xFF]);
        assert_eq!(message.to_string(), "0x1A0 [01 FF]");
    }

    #[test]
    fn test_error_classification() {
        let timeout = HalError::Timeout {
            bus: "body".to_string(),
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.is_timeout());
        assert!(!HalError::can("body", "bus off").is_timeout());

        let failed = ValidationError::PreconditionFailed {
            name: "ParkedState".to_string(),
            step: 2,
            action: "assert_signal".to_string(),
            source: Box::new(ValidationError::sut("never closed")),
            rollback_failures: Vec::new(),
        };
        assert!(failed.is_environment_fault());
        assert!(failed.to_string().contains("ParkedState"));
        assert!(ValidationError::sut("late").is_sut_fault());
        assert_eq!(ValidationError::from(timeout).kind(), FaultKind::Port);
    }
}
