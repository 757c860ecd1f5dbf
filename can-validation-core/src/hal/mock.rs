//! In-memory CAN port for MOCK and SIL execution modes

use super::CanPort;
use crate::types::{CanMessage, HalError, TransmissionResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Interval at which `receive` re-checks the queue
pub const MOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Port that keeps inbound frames in a FIFO queue
///
/// Sending always succeeds; every sent frame is kept in a transmit log so
/// tests can inspect what went on the simulated wire.
pub struct MockCanPort {
    bus_name: String,
    rx_queue: Mutex<VecDeque<CanMessage>>,
    tx_log: Mutex<Vec<CanMessage>>,
}

impl MockCanPort {
    pub fn new(bus_name: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            rx_queue: Mutex::new(VecDeque::new()),
            tx_log: Mutex::new(Vec::new()),
        }
    }

    /// Inject a message as if it was received from the bus
    pub fn inject_message(&self, message: CanMessage) {
        let message = message.with_timestamp();
        log::debug!("[{}] MOCK INJECT {}", self.bus_name, message);
        self.rx_queue.lock().push_back(message);
    }

    /// Frames sent so far, oldest first
    pub fn sent_messages(&self) -> Vec<CanMessage> {
        self.tx_log.lock().clone()
    }

    /// Number of injected frames not yet received
    pub fn pending(&self) -> usize {
        self.rx_queue.lock().len()
    }

    /// Drop queued inbound frames and the transmit log
    pub fn clear(&self) {
        self.rx_queue.lock().clear();
        self.tx_log.lock().clear();
    }
}

impl CanPort for MockCanPort {
    fn bus_name(&self) -> &str {
        &self.bus_name
    }

    fn send(&self, message: &CanMessage) -> Result<TransmissionResult, HalError> {
        log::debug!("[{}] MOCK SEND {}", self.bus_name, message);
        self.tx_log.lock().push(message.clone().with_timestamp());
        Ok(TransmissionResult::ok())
    }

    fn receive(&self, timeout: Duration) -> Result<CanMessage, HalError> {
        // None when the timeout overflows an instant: wait until a frame arrives
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if let Some(message) = self.rx_queue.lock().pop_front() {
                log::debug!("[{}] MOCK RECEIVE {}", self.bus_name, message);
                return Ok(message);
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(HalError::Timeout {
                            bus: self.bus_name.clone(),
                            timeout,
                        });
                    }
                    MOCK_POLL_INTERVAL.min(deadline - now)
                }
                None => MOCK_POLL_INTERVAL,
            };
            std::thread::sleep(pause);
        }
    }
}
