//! Hardware backed CAN port intended for use on HIL benches

use super::CanPort;
use crate::config::BusParameters;
use crate::types::{CanMessage, HalError, TransmissionResult};
use parking_lot::Mutex;
use std::io;
use std::time::Duration;

/// Shortest read window handed to a driver
///
/// Socket read timeouts below the OS resolution round down to zero, which
/// means "block forever".
pub const MIN_DRIVER_TIMEOUT: Duration = Duration::from_millis(1);

/// Physical bus handle wrapped by [`HilCanPort`]
pub trait BusDriver: Send {
    /// Write one frame to the bus
    fn transmit(&mut self, message: &CanMessage) -> io::Result<()>;

    /// Read one frame, or `None` if nothing arrived within `timeout`
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<CanMessage>>;
}

/// Adapter around a [`BusDriver`] providing the port contract
pub struct HilCanPort {
    bus_name: String,
    driver: Mutex<Box<dyn BusDriver>>,
}

impl HilCanPort {
    /// Open the interface described by `parameters`
    ///
    /// `interface` selects the driver (default `socketcan`) and `channel` the
    /// device (default: the bus name).
    pub fn open(bus_name: &str, parameters: &BusParameters) -> Result<Self, HalError> {
        let driver = open_driver(bus_name, parameters)?;
        Ok(Self::with_driver(bus_name, driver))
    }

    /// Wrap an already opened driver
    pub fn with_driver(bus_name: impl Into<String>, driver: Box<dyn BusDriver>) -> Self {
        Self {
            bus_name: bus_name.into(),
            driver: Mutex::new(driver),
        }
    }
}

impl CanPort for HilCanPort {
    fn bus_name(&self) -> &str {
        &self.bus_name
    }

    fn send(&self, message: &CanMessage) -> Result<TransmissionResult, HalError> {
        match self.driver.lock().transmit(message) {
            Ok(()) => {
                log::debug!("[{}] HIL SEND {}", self.bus_name, message);
                Ok(TransmissionResult::ok())
            }
            Err(e) => {
                log::error!("[{}] HIL SEND failed: {}", self.bus_name, e);
                Ok(TransmissionResult::failed(e.to_string()))
            }
        }
    }

    fn receive(&self, timeout: Duration) -> Result<CanMessage, HalError> {
        let timed_out = || HalError::Timeout {
            bus: self.bus_name.clone(),
            timeout,
        };

        match self.driver.lock().recv(timeout.max(MIN_DRIVER_TIMEOUT)) {
            Ok(Some(message)) => {
                let message = message.with_timestamp();
                log::debug!("[{}] HIL RECEIVE {}", self.bus_name, message);
                Ok(message)
            }
            Ok(None) => Err(timed_out()),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(timed_out())
            }
            Err(e) => Err(HalError::can(&self.bus_name, format!("receive failed: {}", e))),
        }
    }
}

/// Open the driver requested by the bus parameters
pub fn open_driver(bus_name: &str, parameters: &BusParameters) -> Result<Box<dyn BusDriver>, HalError> {
    let interface = parameters.get("interface").unwrap_or_else(|| "socketcan".to_string());
    let channel = parameters.get("channel").unwrap_or_else(|| bus_name.to_string());
    log::debug!("Opening {} interface {} for bus {}", interface, channel, bus_name);

    match interface.as_str() {
        "socketcan" => open_socketcan(bus_name, &channel),
        other => Err(HalError::can(
            bus_name,
            format!("unsupported CAN interface {:?}", other),
        )),
    }
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn open_socketcan(bus_name: &str, channel: &str) -> Result<Box<dyn BusDriver>, HalError> {
    let driver = super::socketcan_driver::SocketCanDriver::open(channel).map_err(|e| {
        HalError::can(bus_name, format!("failed to initialise channel {}: {}", channel, e))
    })?;
    Ok(Box::new(driver))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn open_socketcan(bus_name: &str, channel: &str) -> Result<Box<dyn BusDriver>, HalError> {
    Err(HalError::can(
        bus_name,
        format!(
            "cannot open channel {}: built without the `socketcan` feature",
            channel
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted driver: replays queued receive outcomes and records sends
    struct ScriptedDriver {
        sent: Arc<Mutex<Vec<CanMessage>>>,
        fail_sends: bool,
        inbound: VecDeque<io::Result<Option<CanMessage>>>,
        windows: Arc<Mutex<Vec<Duration>>>,
    }

    impl BusDriver for ScriptedDriver {
        fn transmit(&mut self, message: &CanMessage) -> io::Result<()> {
            if self.fail_sends {
                return Err(io::Error::new(io::ErrorKind::Other, "bus off"));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }

        fn recv(&mut self, timeout: Duration) -> io::Result<Option<CanMessage>> {
            self.windows.lock().push(timeout);
            self.inbound.pop_front().unwrap_or(Ok(None))
        }
    }

    fn port(fail_sends: bool, inbound: Vec<io::Result<Option<CanMessage>>>) -> (HilCanPort, Arc<Mutex<Vec<CanMessage>>>) {
        let (port, sent, _) = recording_port(fail_sends, inbound);
        (port, sent)
    }

    fn recording_port(
        fail_sends: bool,
        inbound: Vec<io::Result<Option<CanMessage>>>,
    ) -> (HilCanPort, Arc<Mutex<Vec<CanMessage>>>, Arc<Mutex<Vec<Duration>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let windows = Arc::new(Mutex::new(Vec::new()));
        let driver = ScriptedDriver {
            sent: Arc::clone(&sent),
            fail_sends,
            inbound: inbound.into(),
            windows: Arc::clone(&windows),
        };
        (HilCanPort::with_driver("body", Box::new(driver)), sent, windows)
    }

    #[test]
    fn test_send_success() {
        let (port, sent) = port(false, Vec::new());
        let result = port.send(&CanMessage::new(0x100, vec![1])).unwrap();
        assert!(result.success);
        assert_eq!(sent.lock().len(), 1);
    }

    #[test]
    fn test_send_failure_is_reported_not_raised() {
        let (port, _) = port(true, Vec::new());
        let result = port.send(&CanMessage::new(0x100, vec![1])).unwrap();
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("bus off"));
    }

    #[test]
    fn test_receive_outcomes() {
        let (port, _) = port(
            false,
            vec![
                Ok(Some(CanMessage::new(0x100, vec![1]))),
                Ok(None),
                Err(io::Error::new(io::ErrorKind::WouldBlock, "no data")),
                Err(io::Error::new(io::ErrorKind::Other, "controller fault")),
            ],
        );
        let timeout = Duration::from_millis(10);

        let message = port.receive(timeout).unwrap();
        assert_eq!(message.can_id, 0x100);
        assert!(message.timestamp.is_some());

        assert!(port.receive(timeout).unwrap_err().is_timeout());
        assert!(port.receive(timeout).unwrap_err().is_timeout());

        let err = port.receive(timeout).unwrap_err();
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("controller fault"));
    }

    #[test]
    fn test_tiny_receive_windows_are_clamped() {
        let (port, _, windows) = recording_port(false, Vec::new());
        for timeout in [Duration::ZERO, Duration::from_nanos(500), Duration::from_millis(20)] {
            assert!(port.receive(timeout).unwrap_err().is_timeout());
        }
        assert_eq!(
            *windows.lock(),
            vec![MIN_DRIVER_TIMEOUT, MIN_DRIVER_TIMEOUT, Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_unknown_interface_fails_construction() {
        let parameters = BusParameters::new().with("interface", "pcan");
        let err = HilCanPort::open("body", &parameters).err().unwrap();
        assert!(err.to_string().contains("pcan"));
    }
}
