use anyhow::{Context, Result};
use arithmometer::prelude::*;
use arithmometer::{ENGINE_NAME, VERSION as LIB_VERSION};
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::env;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

const OPCODES: &[&str] = &["set", "rotate", "turn", "shift", "mode", "clear"];
const SHELL_COMMANDS: &[&str] = &["run", "show", "help", "exit", "quit"];

/// A rustyline helper that colors known commands and flags unknown ones.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let known = OPCODES.contains(&command) || SHELL_COMMANDS.contains(&command);
        let command = if known {
            command.yellow().bold()
        } else {
            command.red()
        };
        if rest.is_empty() && !line.ends_with(' ') {
            Cow::Owned(command.to_string())
        } else {
            Cow::Owned(format!("{} {}", command, rest.yellow()))
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let rule = "-".repeat(72);
    println!("{}", rule.dimmed());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";
    println!("{}", license_blurb.dimmed());
    println!("{}", rule.dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  set <I> <V>           - Dials setting digit I to V.");
    println!("  rotate <I> <N>        - Turns setting digit I by N steps.");
    println!("  turn                  - Runs one cycle of the operation handle.");
    println!("  shift <N>             - Moves the carriage N places.");
    println!("  mode add|sub          - Chooses what a turn does to the result.");
    println!("  clear setting|result|counter");
    println!("                        - Clears a register (levers for result/counter).");
    println!("  run <FILE>            - Queues every instruction in FILE.");
    println!("  show                  - Prints the registers and machine state.");
    println!("  exit                  - Quits the shell.");
}

fn print_registers(engine: &ArithmometerEngine) {
    println!(
        "<-- {} {}  {} {}  {} {}",
        "setting".dimmed(),
        engine.setting().to_string().cyan(),
        "result".dimmed(),
        engine.result().to_string().yellow().bold(),
        "counter".dimmed(),
        engine.counter().to_string().green(),
    );
}

fn print_state(engine: &ArithmometerEngine, pending: usize) {
    print_registers(engine);
    println!(
        "    offset {}/{}  mode {:?}  handle {:?}  levers {:?}/{:?}  queued {}",
        engine.offset(),
        engine.max_offset(),
        engine.mode(),
        engine.handle().phase(),
        engine.result_lever().state(),
        engine.counter_lever().state(),
        pending,
    );
}

/// Reads lines on a dedicated thread so the frame loop never blocks on input.
///
/// Dropping the sender (on EOF, Ctrl+C or `exit`) tells the frame loop to stop.
fn spawn_reader(lines: mpsc::UnboundedSender<String>) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("arithmoshell-input".into())
        .spawn(move || {
            let mut rl = match Editor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    error!("could not open the line editor: {}", e);
                    return;
                }
            };
            rl.set_helper(Some(CommandHighlighter));

            let prompt = format!("{}", ">> ".cyan().bold());
            while let Ok(line) = rl.readline(&prompt) {
                rl.add_history_entry(line.as_str()).ok();
                let quit = matches!(line.trim(), "exit" | "quit");
                if lines.send(line).is_err() || quit {
                    break;
                }
            }
        })?;
    Ok(handle)
}

enum Flow {
    Continue,
    Exit,
}

fn handle_line(
    line: &str,
    engine: &ArithmometerEngine,
    pending: &mut VecDeque<Instruction>,
) -> Flow {
    let args: Vec<&str> = line.split_whitespace().collect();
    match args.as_slice() {
        [] => {}
        ["exit" | "quit"] => return Flow::Exit,
        ["help"] => print_help(),
        ["show"] => print_state(engine, pending.len()),
        ["run", path] => match std::fs::read_to_string(path)
            .with_context(|| format!("reading {path}"))
            .and_then(|source| Ok(parse_program(&source)?))
        {
            Ok(program) => {
                println!("--> Queued {} instructions from {}", program.len(), path);
                pending.extend(program);
            }
            Err(e) => println!("{} {:#}", "Error:".red(), e),
        },
        ["run"] => println!("Usage: run <FILE>"),
        _ => match line.trim().parse::<Instruction>() {
            Ok(instruction) => pending.push_back(instruction),
            Err(e) => println!("{} {}. Type 'help'.", "Error:".red(), e),
        },
    }
    Flow::Continue
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let path = env::args().nth(1);
    let config = MachineConfig::load(path.as_deref())
        .with_context(|| format!("loading configuration from {path:?}"))?;
    let engine = ArithmometerEngine::new(config)?;
    let mut clock = FrameClock::new(&engine.config().resolution);

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let _reader = spawn_reader(line_tx)?;

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    let mut pending: VecDeque<Instruction> = VecDeque::new();
    let mut working = false;
    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else {
                    println!("Exiting arithmoshell...");
                    break;
                };
                if let Flow::Exit = handle_line(&line, &engine, &mut pending) {
                    println!("Exiting arithmoshell...");
                    break;
                }
            }
            delta = clock.next_frame() => {
                if !engine.is_busy() {
                    if let Some(instruction) = pending.pop_front() {
                        if let Err(e) = engine.execute(&instruction) {
                            error!("'{}' failed: {}", instruction, e);
                            pending.clear();
                        }
                        working = true;
                    }
                }
                engine.advance(delta)?;
                if working && !engine.is_busy() && pending.is_empty() {
                    working = false;
                    print_registers(&engine);
                }
            }
        }
    }

    info!(frames = clock.frames(), "shell closed");
    Ok(())
}
