//! Hardware abstraction layer: CAN ports and the registry that owns them
//!
//! Every bus is reached through a [`CanPort`]. Two implementations exist:
//! an in-memory port for MOCK/SIL runs and a hardware port for HIL benches.
//! The [`HalManager`] picks the variant once, from the execution mode, and
//! hands out one cached port per bus name.

use crate::types::{CanMessage, HalError, TransmissionResult};
use std::time::Duration;

pub mod hil;
pub mod manager;
pub mod mock;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod socketcan_driver;

// Re-export port types
pub use hil::{BusDriver, HilCanPort};
pub use manager::{DriverFactory, HalManager};
pub use mock::MockCanPort;

/// Bidirectional interface for communicating with a CAN bus
///
/// Ports are shared behind `Arc`, so both operations take `&self` and
/// implementations guard their I/O resource internally.
pub trait CanPort: Send + Sync {
    /// Name of the bus this port is attached to
    fn bus_name(&self) -> &str;

    /// Send a frame on the bus
    ///
    /// A transmission the bus rejected is reported as `success == false`;
    /// `Err` is reserved for port-level failures.
    fn send(&self, message: &CanMessage) -> Result<TransmissionResult, HalError>;

    /// Receive the next frame, waiting at most `timeout`
    ///
    /// Implementations MUST return [`HalError::Timeout`] when no frame is
    /// available before `timeout` expires.
    fn receive(&self, timeout: Duration) -> Result<CanMessage, HalError>;
}
