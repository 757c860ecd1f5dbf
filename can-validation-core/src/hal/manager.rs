//! Factory and lifecycle manager for CAN port instances

use super::hil::{self, BusDriver, HilCanPort};
use super::mock::MockCanPort;
use super::CanPort;
use crate::config::{BusParameters, ExecutionMode, FrameworkConfig};
use crate::types::{ConfigError, HalError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Opens the driver for a hardware bus from its connection parameters
pub type DriverFactory =
    Box<dyn Fn(&str, &BusParameters) -> Result<Box<dyn BusDriver>, HalError> + Send + Sync>;

/// A cached port, tagged with its variant
#[derive(Clone)]
enum PortEntry {
    Simulated(Arc<MockCanPort>),
    Hardware(Arc<HilCanPort>),
}

impl PortEntry {
    fn as_port(&self) -> Arc<dyn CanPort> {
        match self {
            PortEntry::Simulated(port) => Arc::clone(port) as Arc<dyn CanPort>,
            PortEntry::Hardware(port) => Arc::clone(port) as Arc<dyn CanPort>,
        }
    }
}

/// Provide access to CAN ports across execution modes
///
/// Ports are created lazily, one per bus name, and cached until [`clear`]
/// is called. Creation happens while the cache lock is held, so a hardware
/// channel is never opened twice even under concurrent first access.
///
/// [`clear`]: HalManager::clear
pub struct HalManager {
    mode: ExecutionMode,
    interfaces: HashMap<String, BusParameters>,
    driver_factory: DriverFactory,
    ports: Mutex<HashMap<String, PortEntry>>,
}

impl HalManager {
    /// Create a manager for the given mode string
    ///
    /// Unknown modes fail here rather than on first port access.
    pub fn new(mode: &str, interfaces: HashMap<String, BusParameters>) -> Result<Self, ConfigError> {
        Ok(Self::with_mode(mode.parse()?, interfaces))
    }

    pub fn with_mode(mode: ExecutionMode, interfaces: HashMap<String, BusParameters>) -> Self {
        Self {
            mode,
            interfaces,
            driver_factory: Box::new(hil::open_driver),
            ports: Mutex::new(HashMap::new()),
        }
    }

    /// Build from the framework configuration
    pub fn from_config(config: &FrameworkConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_mode(
            config.execution_mode()?,
            config.interfaces.can.clone(),
        ))
    }

    /// Manager serving in-memory ports only
    pub fn simulated() -> Self {
        Self::with_mode(ExecutionMode::Simulated, HashMap::new())
    }

    /// Hardware manager that opens drivers through `factory`
    pub fn with_driver_factory<F>(interfaces: HashMap<String, BusParameters>, factory: F) -> Self
    where
        F: Fn(&str, &BusParameters) -> Result<Box<dyn BusDriver>, HalError> + Send + Sync + 'static,
    {
        Self {
            mode: ExecutionMode::Hardware,
            interfaces,
            driver_factory: Box::new(factory),
            ports: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Port for `bus_name`, created on first request
    pub fn get_port(&self, bus_name: &str) -> Result<Arc<dyn CanPort>, HalError> {
        Ok(self.entry(bus_name)?.as_port())
    }

    /// Typed in-memory port for `bus_name` (for frame injection)
    ///
    /// Fails in hardware mode.
    pub fn simulated_port(&self, bus_name: &str) -> Result<Arc<MockCanPort>, HalError> {
        match self.entry(bus_name)? {
            PortEntry::Simulated(port) => Ok(port),
            PortEntry::Hardware(_) => Err(HalError::can(
                bus_name,
                format!("no simulated port in {} mode", self.mode),
            )),
        }
    }

    /// Drop every cached port; the next request builds a fresh one
    pub fn clear(&self) {
        let mut ports = self.ports.lock();
        log::debug!("Dropping {} cached CAN port(s)", ports.len());
        ports.clear();
    }

    /// Bus names with a live port, sorted
    pub fn cached_buses(&self) -> Vec<String> {
        let mut buses: Vec<String> = self.ports.lock().keys().cloned().collect();
        buses.sort_unstable();
        buses
    }

    fn entry(&self, bus_name: &str) -> Result<PortEntry, HalError> {
        let mut ports = self.ports.lock();
        if let Some(entry) = ports.get(bus_name) {
            return Ok(entry.clone());
        }

        log::debug!("Creating CAN port for {} in {} mode", bus_name, self.mode);
        let entry = if self.mode.uses_hardware() {
            let parameters = self.interfaces.get(bus_name).cloned().unwrap_or_default();
            let driver = (self.driver_factory)(bus_name, &parameters)?;
            PortEntry::Hardware(Arc::new(HilCanPort::with_driver(bus_name, driver)))
        } else {
            PortEntry::Simulated(Arc::new(MockCanPort::new(bus_name)))
        };

        ports.insert(bus_name.to_string(), entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanMessage;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullDriver;

    impl BusDriver for NullDriver {
        fn transmit(&mut self, _message: &CanMessage) -> io::Result<()> {
            Ok(())
        }

        fn recv(&mut self, _timeout: Duration) -> io::Result<Option<CanMessage>> {
            Ok(None)
        }
    }

    #[test]
    fn test_unknown_mode_fails_fast() {
        assert!(matches!(
            HalManager::new("replay", HashMap::new()),
            Err(ConfigError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_ports_are_cached_per_bus() {
        let manager = HalManager::new("sil", HashMap::new()).unwrap();
        let first = manager.simulated_port("body").unwrap();
        let again = manager.simulated_port("body").unwrap();
        let other = manager.simulated_port("chassis").unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(manager.get_port("body").unwrap().bus_name(), "body");
        assert_eq!(manager.cached_buses(), vec!["body", "chassis"]);
    }

    #[test]
    fn test_clear_builds_fresh_ports() {
        let manager = HalManager::simulated();
        let port = manager.simulated_port("body").unwrap();
        port.inject_message(CanMessage::new(0x100, vec![1]));

        manager.clear();
        assert!(manager.cached_buses().is_empty());
        assert_eq!(manager.simulated_port("body").unwrap().pending(), 0);
    }

    #[test]
    fn test_hardware_port_opened_once_under_concurrency() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let manager = Arc::new(HalManager::with_driver_factory(HashMap::new(), move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(Box::new(NullDriver) as Box<dyn BusDriver>)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.get_port("body").map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(manager.simulated_port("body").is_err());
    }

    #[test]
    fn test_hardware_construction_failure_is_not_cached() {
        let mut interfaces = HashMap::new();
        interfaces.insert("body".to_string(), BusParameters::new().with("channel", "can9"));
        let manager = HalManager::with_driver_factory(interfaces, |bus, parameters| {
            Err(HalError::can(
                bus,
                format!("cannot open {}", parameters.get("channel").unwrap_or_default()),
            ))
        });

        let err = manager.get_port("body").err().unwrap();
        assert!(err.to_string().contains("can9"));
        assert!(manager.cached_buses().is_empty());
    }
}
