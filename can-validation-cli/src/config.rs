//! Loading of the framework configuration and both catalogs

use anyhow::{Context, Result};
use can_validation_core::broker::DEFAULT_READ_TIMEOUT;
use can_validation_core::{
    FrameworkConfig, HalManager, InteractionBroker, PreconditionCatalog, PreconditionEngine, SignalCatalog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Timeout key consulted when a command gets no `--timeout`
pub const DEFAULT_READ_KEY: &str = "default_read";

/// Everything loaded from disk for one run
#[derive(Debug)]
pub struct Environment {
    pub framework: FrameworkConfig,
    pub signals: Arc<SignalCatalog>,
    pub preconditions: Arc<PreconditionCatalog>,
}

/// Load the base configuration with its profiles merged over it
pub fn load_framework(config: &Path, profiles: &[PathBuf]) -> Result<FrameworkConfig> {
    FrameworkConfig::merge(config, profiles)
        .with_context(|| format!("Failed to load framework configuration: {:?}", config))
}

/// Load both catalogs next to an already loaded configuration
pub fn load_environment(
    framework: FrameworkConfig,
    signals: &Path,
    preconditions: Option<&Path>,
) -> Result<Environment> {
    let signals = SignalCatalog::from_path(signals)
        .with_context(|| format!("Failed to load signal catalog: {:?}", signals))?;

    let preconditions = match preconditions {
        Some(path) => PreconditionCatalog::from_path(path)
            .with_context(|| format!("Failed to load precondition catalog: {:?}", path))?,
        None => PreconditionCatalog::new(),
    };

    Ok(Environment {
        framework,
        signals: Arc::new(signals),
        preconditions: Arc::new(preconditions),
    })
}

impl Environment {
    /// Build the port registry and the broker on top of it
    pub fn broker(&self) -> Result<Arc<InteractionBroker>> {
        let hal = HalManager::from_config(&self.framework).context("Failed to create the port registry")?;
        log::info!("Execution mode: {}", hal.mode());
        Ok(Arc::new(InteractionBroker::new(Arc::clone(&self.signals), Arc::new(hal))))
    }

    pub fn engine(&self, broker: Arc<InteractionBroker>) -> PreconditionEngine {
        PreconditionEngine::new(Arc::clone(&self.preconditions), broker)
    }

    /// `--timeout` if given, else `timeouts.default_read`, else one second
    pub fn read_timeout(&self, seconds: Option<f64>) -> Result<Duration> {
        match seconds {
            Some(seconds) => Duration::try_from_secs_f64(seconds)
                .with_context(|| format!("Invalid timeout: {}", seconds)),
            None => Ok(self
                .framework
                .timeout(DEFAULT_READ_KEY)
                .unwrap_or(DEFAULT_READ_TIMEOUT)),
        }
    }
}
