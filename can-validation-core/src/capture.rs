//! Named wall-clock timers for measuring reaction times on the bus

use crate::types::{Result, ValidationError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Elapsed-time measurement per named channel
///
/// Only start instants are kept; no frame data is recorded.
#[derive(Debug, Default)]
pub struct CaptureTimer {
    captures: Mutex<HashMap<String, Instant>>,
}

impl CaptureTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `channel`
    pub fn start(&self, channel: &str) -> Result<()> {
        let mut captures = self.captures.lock();
        if captures.contains_key(channel) {
            return Err(ValidationError::environment(format!(
                "Capture {} is already running",
                channel
            )));
        }
        captures.insert(channel.to_string(), Instant::now());
        log::debug!("Capture {} started", channel);
        Ok(())
    }

    /// Stop timing `channel` and return the elapsed time
    pub fn stop(&self, channel: &str) -> Result<Duration> {
        let started = self.captures.lock().remove(channel).ok_or_else(|| {
            ValidationError::environment(format!("Capture {} was never started", channel))
        })?;
        let elapsed = started.elapsed();
        log::debug!("Capture {} stopped after {:?}", channel, elapsed);
        Ok(elapsed)
    }

    pub fn is_running(&self, channel: &str) -> bool {
        self.captures.lock().contains_key(channel)
    }
}
