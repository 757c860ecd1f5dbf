//! Simulated bench walkthrough
//!
//! Plays the role of an ECU on an in-memory bus: a responder thread answers
//! door commands with a matching status frame while the broker and the
//! precondition engine drive the scenario.
//!
//! Usage:
//!   cargo run --example simulated_bench

use can_validation_core::{
    CanMessage, CanPort, CaptureTimer, HalManager, InteractionBroker, PayloadDefinition, PreconditionCatalog,
    PreconditionDefinition, PreconditionEngine, PreconditionStep, SignalCatalog, SignalDefinition, StepValue,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const COMMAND_ID: u32 = 0x100;
const STATUS_ID: u32 = 0x180;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let door = || PayloadDefinition::enumeration([("CLOSED", 0), ("OPEN", 1)]);
    let signals = SignalCatalog::new()
        .with_signal(SignalDefinition::new("DoorCommand", "body", COMMAND_ID, door()))?
        .with_signal(SignalDefinition::new("DoorStatus", "body", STATUS_ID, door()))?;

    let preconditions = PreconditionCatalog::new().with_precondition(
        PreconditionDefinition::new("DoorOpen")
            .with_sla(Duration::from_secs(1), Duration::from_millis(50))
            .step(PreconditionStep::new("set_signal", "DoorCommand", Some(StepValue::Scalar("OPEN".into()))))
            .step(PreconditionStep::new("wait_for_signal", "DoorStatus", Some(StepValue::Scalar("OPEN".into()))))
            .rollback_step(PreconditionStep::new(
                "set_signal",
                "DoorCommand",
                Some(StepValue::Scalar("CLOSED".into())),
            )),
    )?;

    let hal = Arc::new(HalManager::new("sil", Default::default())?);
    let broker = Arc::new(InteractionBroker::new(Arc::new(signals), Arc::clone(&hal)));
    let engine = PreconditionEngine::new(Arc::new(preconditions), Arc::clone(&broker));
    engine.validate()?;

    // Fake door ECU: mirror every command as a status frame after 50 ms
    let port = hal.simulated_port("body")?;
    let running = Arc::new(AtomicBool::new(true));
    let responder = {
        let running = Arc::clone(&running);
        let port = Arc::clone(&port);
        thread::spawn(move || {
            let mut answered = 0;
            while running.load(Ordering::Relaxed) {
                let sent = port.sent_messages();
                for command in sent.iter().skip(answered) {
                    thread::sleep(Duration::from_millis(50));
                    port.inject_message(CanMessage::new(STATUS_ID, command.data.clone()));
                }
                answered = sent.len();
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let timer = CaptureTimer::new();
    timer.start("door_open")?;
    engine.apply("DoorOpen")?;
    let reaction = timer.stop("door_open")?;

    println!("\n=== SIMULATED BENCH ===");
    println!("Bus: {}", port.bus_name());
    println!("DoorOpen established in {:?}", reaction);
    for message in port.sent_messages() {
        println!("  sent {}", message);
    }

    running.store(false, Ordering::Relaxed);
    responder.join().map_err(|_| "responder thread panicked")?;
    Ok(())
}
