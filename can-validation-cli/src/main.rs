//! CAN Validation CLI Application
//!
//! Command-line front end for the can-validation-core library. It loads the
//! framework configuration and catalogs, wires up the broker and the
//! precondition engine, and runs one operation against the configured buses:
//! - Validate catalogs against each other
//! - Apply a named precondition
//! - Send, read, and wait for signal values
//! - Check fault indicators and signal consistency

use anyhow::{Context, Result};
use can_validation_core::broker::DEFAULT_POLLING_INTERVAL;
use can_validation_core::{PreconditionDefinition, SignalValue};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod config;

/// CAN Validation - Drive and observe ECUs by signal name
#[derive(Parser, Debug)]
#[command(name = "can-validation-cli")]
#[command(about = "Validate vehicle CAN behaviour from signal and precondition catalogs", long_about = None)]
#[command(version)]
struct Args {
    /// Framework configuration (mode, timeouts, interfaces)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Configuration profile merged over --config (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    profile: Vec<PathBuf>,

    /// Signal catalog
    #[arg(short, long, value_name = "FILE")]
    signals: PathBuf,

    /// Precondition catalog
    #[arg(long, value_name = "FILE")]
    preconditions: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load everything and check preconditions against the signal catalog
    Validate,

    /// Apply a precondition
    Apply { name: String },

    /// Transmit a signal value
    Set { signal: String, value: String },

    /// Read the next value of a signal
    Get {
        signal: String,
        /// Seconds to wait (default: timeouts.default_read)
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Wait until a signal reports a value
    Wait {
        signal: String,
        value: String,
        /// Seconds to wait (default: timeouts.default_read)
        #[arg(long)]
        timeout: Option<f64>,
        /// Seconds per sub-poll
        #[arg(long)]
        poll: Option<f64>,
    },

    /// Check that fault indicators report a healthy state
    CheckFaults {
        #[arg(required = true)]
        signals: Vec<String>,
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Check that several signals report the same value
    Consistent {
        #[arg(required = true)]
        signals: Vec<String>,
        #[arg(long)]
        timeout: Option<f64>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // The configured log level only applies without -v/-q
    let framework = config::load_framework(&args.config, &args.profile)?;
    init_logging(args.verbose, args.quiet, framework.log_level());

    log::info!("CAN Validation CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using validation core v{}", can_validation_core::VERSION);

    let env = config::load_environment(framework, &args.signals, args.preconditions.as_deref())?;
    let broker = env.broker()?;

    match &args.command {
        Command::Validate => {
            let engine = env.engine(broker);
            engine.validate()?;
            println!("✓ Configuration valid");
            println!("  Mode:          {}", env.framework.mode);
            println!("  Signals:       {}", env.signals.len());
            println!("  Buses:         {}", env.signals.buses().into_iter().collect::<Vec<_>>().join(", "));
            println!("  Preconditions: {}", env.preconditions.len());
            for definition in env.preconditions.iter() {
                println!("    {}", precondition_summary(definition));
            }
            println!("  Actions:       {}", engine.actions().join(", "));
        }
        Command::Apply { name } => {
            let engine = env.engine(broker);
            engine.validate()?;
            engine
                .apply(name)
                .with_context(|| format!("Precondition {} not established", name))?;
            println!("✓ Precondition {} applied", name);
        }
        Command::Set { signal, value } => {
            let value = parse_value(value);
            let result = broker.set_signal(signal, value.clone())?;
            println!("✓ {}={} sent at {}", signal, value, result.timestamp.format("%H:%M:%S%.3f"));
        }
        Command::Get { signal, timeout } => {
            let value = broker.get_signal(signal, env.read_timeout(*timeout)?)?;
            println!("{}={}", signal, value);
        }
        Command::Wait {
            signal,
            value,
            timeout,
            poll,
        } => {
            let value = parse_value(value);
            let polling_interval = match poll {
                Some(seconds) => Duration::try_from_secs_f64(*seconds)
                    .with_context(|| format!("Invalid polling interval: {}", seconds))?,
                None => DEFAULT_POLLING_INTERVAL,
            };
            broker.wait_for_signal(
                signal,
                value.clone(),
                Some(env.read_timeout(*timeout)?),
                polling_interval,
            )?;
            println!("✓ {}={} observed", signal, value);
        }
        Command::CheckFaults { signals, timeout } => {
            broker.assert_no_faults(signals, env.read_timeout(*timeout)?)?;
            println!("✓ No active faults ({} indicator(s))", signals.len());
        }
        Command::Consistent { signals, timeout } => {
            broker.assert_consistent_signals(signals, env.read_timeout(*timeout)?)?;
            println!("✓ {} consistent", signals.join(", "));
        }
    }

    Ok(())
}

/// One-line description of a precondition for the `validate` report
fn precondition_summary(definition: &PreconditionDefinition) -> String {
    format!(
        "{}: {} step(s), {} rollback step(s), timeout {:?}, abort_on_fault={}",
        definition.name,
        definition.steps.len(),
        definition.rollback.len(),
        definition.sla.timeout(),
        definition.safety.abort_on_fault
    )
}

/// Integers stay integers, everything else is a symbol
fn parse_value(text: &str) -> SignalValue {
    match text.parse::<SignalValue>() {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// Initialize logging based on verbosity level and the configured level
fn init_logging(verbose: u8, quiet: bool, configured: Option<&str>) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => configured
                .and_then(|level| level.parse().ok())
                .unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
