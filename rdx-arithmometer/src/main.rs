use anyhow::{Context, Result};
use arithmometer::prelude::*;
use arithmometer::{ENGINE_NAME, VERSION};
use colored::Colorize;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Multiplies 123 by 45: five turns in the units place, then four with the
/// carriage shifted one place.
const DEMO_PROGRAM: &str = "\
# dial 123 into the setting register
set 0 3
set 1 2
set 2 1
turn
turn
turn
turn
turn
shift 1
turn
turn
turn
turn
";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the machine configuration, from a file if one was named.
    let path = env::args().nth(1);
    let config = MachineConfig::load(path.as_deref())
        .with_context(|| format!("loading configuration from {path:?}"))?;

    // 3. Build the machine and decode the demo program.
    let engine = ArithmometerEngine::new(config)?;
    let program = parse_program(DEMO_PROGRAM)?;
    info!(
        "{} v{} running {} instructions at {:?}",
        ENGINE_NAME,
        VERSION,
        program.len(),
        engine.config().resolution
    );

    // 4. Drive the machine one instruction at a time, waiting for it to
    //    settle in between.
    let mut clock = FrameClock::new(&engine.config().resolution);
    for instruction in &program {
        engine.execute(instruction)?;
        while engine.is_busy() {
            let delta = clock.next_frame().await;
            engine.advance(delta)?;
        }
        print_registers(&engine);
    }

    info!(frames = clock.frames(), "demo finished");
    Ok(())
}

fn print_registers(engine: &ArithmometerEngine) {
    println!(
        "{} {}  {} {}  {} {}",
        "setting".dimmed(),
        engine.setting().to_string().cyan(),
        "result".dimmed(),
        engine.result().to_string().yellow().bold(),
        "counter".dimmed(),
        engine.counter().to_string().green(),
    );
}
