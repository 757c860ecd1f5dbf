//! Interaction broker
//!
//! Translates signal-level interactions into port calls. The broker holds no
//! state of its own beyond shared references to the signal catalog and the
//! port registry, and reclassifies port failures by meaning:
//! a failed transmission is an environment fault, a signal that never shows
//! up (or never reaches its expected value) is a SUT fault.

use crate::hal::{CanPort, HalManager};
use crate::message_codec::SignalCodec;
use crate::signals::{SignalCatalog, SignalDefinition};
use crate::types::{CanMessage, Result, SignalValue, TransmissionResult, ValidationError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time budget for reads and assertions
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default sub-poll used by `wait_for_signal`
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound of a single port read inside `get_signal`
pub const MAX_SUB_POLL: Duration = Duration::from_millis(100);

/// Fault indicator values considered healthy (symbols compare case-insensitively)
pub const HEALTHY_FAULT_STATES: [&str; 4] = ["0", "NONE", "INACTIVE", "OK"];

/// What a polling read is waiting for
enum Expectation<'a> {
    /// The first decodable frame of the signal
    AnyValue,
    /// A frame decoding to this value
    Value(&'a SignalValue),
}

/// Translate domain level interactions into HAL calls
pub struct InteractionBroker {
    catalog: Arc<SignalCatalog>,
    hal: Arc<HalManager>,
    max_sub_poll: Duration,
}

impl InteractionBroker {
    pub fn new(catalog: Arc<SignalCatalog>, hal: Arc<HalManager>) -> Self {
        Self {
            catalog,
            hal,
            max_sub_poll: MAX_SUB_POLL,
        }
    }

    /// Builder method: override the sub-poll bound used by `get_signal`
    pub fn with_max_sub_poll(mut self, max_sub_poll: Duration) -> Self {
        self.max_sub_poll = max_sub_poll;
        self
    }

    pub fn catalog(&self) -> &SignalCatalog {
        &self.catalog
    }

    pub fn hal(&self) -> &HalManager {
        &self.hal
    }

    /// Encode `value` and transmit it on the signal's bus
    pub fn set_signal(&self, signal_name: &str, value: impl Into<SignalValue>) -> Result<TransmissionResult> {
        let value = value.into();
        let signal = self.catalog.get(signal_name)?;
        let message = SignalCodec::encode(signal, &value)?;
        let port = self.port(signal, "sending")?;

        let result = port.send(&message).map_err(|e| {
            ValidationError::environment_caused_by(
                format!("HAL failure while sending {}", signal_name),
                e,
            )
        })?;

        if !result.success {
            return Err(ValidationError::environment(format!(
                "Transmission of {}={} on bus {} failed: {}",
                signal_name,
                value,
                signal.bus,
                result.error_message.as_deref().unwrap_or("unknown error")
            )));
        }

        log::debug!("Set {}={} ({})", signal_name, value, message);
        Ok(result)
    }

    /// Read the next value of `signal_name` within `timeout`
    ///
    /// Frames of other signals arriving meanwhile are consumed and discarded.
    pub fn get_signal(&self, signal_name: &str, timeout: Duration) -> Result<SignalValue> {
        let signal = self.catalog.get(signal_name)?;
        let port = self.port(signal, "reading")?;
        let deadline = Instant::now().checked_add(timeout);

        self.poll(signal, port.as_ref(), deadline, self.max_sub_poll, Expectation::AnyValue)?
            .ok_or_else(|| {
                ValidationError::sut(format!(
                    "Did not observe signal {} on bus {} within {:?}",
                    signal_name, signal.bus, timeout
                ))
            })
    }

    /// Block until `signal_name` decodes to `expected_value`
    ///
    /// `timeout == None` waits forever; only use it when an outer bound exists.
    pub fn wait_for_signal(
        &self,
        signal_name: &str,
        expected_value: impl Into<SignalValue>,
        timeout: Option<Duration>,
        polling_interval: Duration,
    ) -> Result<()> {
        let expected = expected_value.into();
        let signal = self.catalog.get(signal_name)?;
        let port = self.port(signal, "waiting")?;
        // A timeout too large to represent as an instant means no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        match self.poll(signal, port.as_ref(), deadline, polling_interval, Expectation::Value(&expected))? {
            Some(_) => {
                log::debug!("{} satisfied with value {}", signal_name, expected);
                Ok(())
            }
            None => Err(ValidationError::sut(format!(
                "Timeout waiting for {}={} on bus {} after {:?}",
                signal_name,
                expected,
                signal.bus,
                timeout.unwrap_or_default()
            ))),
        }
    }

    /// Assert that the next value of `signal_name` equals `expected_value`
    pub fn assert_signal_equal(
        &self,
        signal_name: &str,
        expected_value: impl Into<SignalValue>,
        timeout: Duration,
    ) -> Result<()> {
        let expected = expected_value.into();
        let observed = self.get_signal(signal_name, timeout)?;
        if !observed.matches(&expected) {
            return Err(ValidationError::sut(format!(
                "Signal {} expected {:?} but observed {:?}",
                signal_name,
                expected.to_string(),
                observed.to_string()
            )));
        }
        Ok(())
    }

    /// Assert that the next value of `signal_name` is one of `expected_values`
    pub fn assert_signal_in(
        &self,
        signal_name: &str,
        expected_values: &[SignalValue],
        timeout: Duration,
    ) -> Result<()> {
        let observed = self.get_signal(signal_name, timeout)?;
        if !expected_values.iter().any(|expected| observed.matches(expected)) {
            let formatted: Vec<String> = expected_values.iter().map(|v| format!("{:?}", v.to_string())).collect();
            return Err(ValidationError::sut(format!(
                "Signal {} expected to be in {{{}}} but was {:?}",
                signal_name,
                formatted.join(", "),
                observed.to_string()
            )));
        }
        Ok(())
    }

    /// Assert that the next value of `signal_name` lies in `minimum..=maximum`
    pub fn assert_signal_in_range(
        &self,
        signal_name: &str,
        minimum: f64,
        maximum: f64,
        timeout: Duration,
    ) -> Result<()> {
        let observed = self.get_signal(signal_name, timeout)?;
        match observed.as_f64() {
            Some(value) if minimum <= value && value <= maximum => Ok(()),
            Some(_) => Err(ValidationError::sut(format!(
                "Signal {} expected between {} and {} but was {}",
                signal_name, minimum, maximum, observed
            ))),
            None => Err(ValidationError::sut(format!(
                "Signal {} expected between {} and {} but was non-numeric {:?}",
                signal_name,
                minimum,
                maximum,
                observed.to_string()
            ))),
        }
    }

    /// Assert that all `signal_names` converge to the same value
    ///
    /// Signals are read one after another, each under its own `timeout`;
    /// this is not an atomic snapshot.
    pub fn assert_consistent_signals<I, S>(&self, signal_names: I, timeout: Duration) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut observed: Vec<(String, SignalValue)> = Vec::new();
        for name in signal_names {
            let name = name.as_ref();
            let value = self.get_signal(name, timeout)?;
            observed.push((name.to_string(), value));
        }

        let mut distinct: Vec<&SignalValue> = Vec::new();
        for (_, value) in &observed {
            if !distinct.iter().any(|seen| seen.matches(value)) {
                distinct.push(value);
            }
        }

        if distinct.len() > 1 {
            let pairs: Vec<String> = observed
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            return Err(ValidationError::sut(format!(
                "Signals are inconsistent: {}",
                pairs.join(", ")
            )));
        }
        Ok(())
    }

    /// Ensure that every fault indicator resolves to a healthy state
    pub fn assert_no_faults<I, S>(&self, fault_signal_names: I, timeout: Duration) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in fault_signal_names {
            let name = name.as_ref();
            let observed = self.get_signal(name, timeout)?;
            if !is_healthy(&observed) {
                return Err(ValidationError::environment(format!(
                    "Fault indicator {} reported unhealthy state {:?}",
                    name,
                    observed.to_string()
                )));
            }
        }
        Ok(())
    }

    fn port(&self, signal: &SignalDefinition, activity: &str) -> Result<Arc<dyn CanPort>> {
        self.hal.get_port(&signal.bus).map_err(|e| {
            ValidationError::environment_caused_by(
                format!("HAL failure while {} {}", activity, signal.name),
                e,
            )
        })
    }

    /// Sub-poll `port` until a frame of `signal` satisfies `expectation`
    ///
    /// Returns `Ok(None)` once `deadline` passes. Each port read is bounded by
    /// `sub_poll` and by the time left, and every read timeout re-checks the
    /// deadline before retrying.
    fn poll(
        &self,
        signal: &SignalDefinition,
        port: &dyn CanPort,
        deadline: Option<Instant>,
        sub_poll: Duration,
        expectation: Expectation<'_>,
    ) -> Result<Option<SignalValue>> {
        loop {
            let window = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    remaining.min(sub_poll)
                }
                None => sub_poll,
            };

            let message = match port.receive(window) {
                Ok(message) => message,
                Err(e) if e.is_timeout() => continue,
                Err(e) => {
                    return Err(ValidationError::environment_caused_by(
                        format!("HAL failure while polling {}", signal.name),
                        e,
                    ))
                }
            };

            if let Some(value) = self.accept(signal, &message, &expectation) {
                return Ok(Some(value));
            }
        }
    }

    /// Decode `message` if it belongs to `signal` and meets the expectation
    fn accept(
        &self,
        signal: &SignalDefinition,
        message: &CanMessage,
        expectation: &Expectation<'_>,
    ) -> Option<SignalValue> {
        if message.can_id != signal.can_id {
            log::debug!("Ignoring CAN id 0x{:X} while polling {}", message.can_id, signal.name);
            return None;
        }

        let value = match SignalCodec::decode(signal, message) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Skipping undecodable frame {}: {}", message, e);
                return None;
            }
        };

        match expectation {
            Expectation::AnyValue => {
                log::debug!("Read {}={}", signal.name, value);
                Some(value)
            }
            Expectation::Value(expected) if value.matches(expected) => Some(value),
            Expectation::Value(expected) => {
                log::debug!("{} is {}, still waiting for {}", signal.name, value, expected);
                None
            }
        }
    }
}

/// True when a fault indicator value is in the healthy set
pub fn is_healthy(value: &SignalValue) -> bool {
    HEALTHY_FAULT_STATES
        .iter()
        .any(|healthy| value.matches(&SignalValue::from(*healthy)))
}
