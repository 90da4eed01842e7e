//! Command-line host for the zone-scheduler core.
//!
//! Creates a single zone backed by the reference engine (see
//! `vmzone_runtime`; this binary never embeds a real JavaScript engine) and
//! either runs one `call`/`broadcast` and exits, or drops into a REPL.

use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use vmzone_core::{FunctionSpec, ResultCode, TaskResult, ZoneHandle, ZoneSettings};
use vmzone_host::engine::Isolate;
use vmzone_runtime::ReferenceIsolate;

#[derive(Parser)]
#[command(name = "vmzone", version, about = "Zone-scheduler host", long_about = None)]
struct Cli {
    /// Number of workers in the zone.
    #[arg(long, default_value_t = 4)]
    workers: u32,

    /// Default call timeout in milliseconds; 0 disables it.
    #[arg(long, default_value_t = 0)]
    timeout_ms: u32,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the result as JSON instead of plain text.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Routes one call to a single worker.
    Call {
        module: String,
        function: String,
        #[arg(long)]
        arg: Option<String>,
    },
    /// Sends one call to every worker; reports the last settlement.
    Broadcast {
        module: String,
        function: String,
        #[arg(long)]
        arg: Option<String>,
    },
}

fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .expect("logger installed exactly once");

    let settings = ZoneSettings::new("cli")
        .with_workers(cli.workers)
        .with_default_timeout_ms(cli.timeout_ms);
    let factory = Arc::new(|_id| Box::new(ReferenceIsolate::new()) as Box<dyn Isolate>);
    let zone = ZoneHandle::create(settings, factory, None)?;

    let json = cli.json;
    match cli.command {
        Some(Command::Call { module, function, arg }) => {
            let result = blocking_call(&zone, module, function, arg, false);
            print_result(&result, json);
            Ok(exit_code_for(result.code))
        }
        Some(Command::Broadcast { module, function, arg }) => {
            let result = blocking_call(&zone, module, function, arg, true);
            print_result(&result, json);
            Ok(exit_code_for(result.code))
        }
        None => repl(&zone, json),
    }
}

fn blocking_call(
    zone: &ZoneHandle,
    module: String,
    function: String,
    arg: Option<String>,
    broadcast: bool,
) -> TaskResult {
    let mut spec = FunctionSpec::new(module, function);
    if let Some(arg) = arg {
        spec = spec.with_arguments(arg.into_bytes());
    }

    let (tx, rx) = mpsc::channel();
    let callback = move |result| {
        let _ = tx.send(result);
    };
    let submitted = if broadcast {
        zone.broadcast(spec, callback)
    } else {
        zone.execute(spec, callback)
    };
    if let Err(err) = submitted {
        eprintln!("submission failed: {err}");
        return TaskResult::error(ResultCode::InternalError, err.to_string());
    }

    rx.recv()
        .unwrap_or_else(|_| TaskResult::error(ResultCode::InternalError, "callback channel closed"))
}

fn print_result(result: &TaskResult, json: bool) {
    if json {
        let value = serde_json::json!({
            "code": format!("{:?}", result.code),
            "success": result.code.is_success(),
            "payload": String::from_utf8_lossy(&result.payload),
        });
        println!("{}", serde_json::to_string_pretty(&value).expect("json values never fail to serialize"));
    } else if result.code.is_success() {
        println!("ok: {}", String::from_utf8_lossy(&result.payload));
    } else {
        println!("{:?}: {}", result.code, result.message());
    }
}

fn exit_code_for(code: ResultCode) -> ExitCode {
    match code {
        ResultCode::Success => ExitCode::from(0),
        ResultCode::ExecutionError => ExitCode::from(1),
        ResultCode::ModuleNotFound | ResultCode::FunctionNotFound | ResultCode::NotFound => {
            ExitCode::from(2)
        }
        ResultCode::Timeout => ExitCode::from(3),
        ResultCode::Terminated => ExitCode::from(4),
        ResultCode::AlreadyExists => ExitCode::from(5),
        ResultCode::InternalError => ExitCode::from(70),
    }
}

/// Reads `module.function [argument]` lines until EOF or `exit`.
fn repl(zone: &ZoneHandle, json: bool) -> color_eyre::Result<ExitCode> {
    let mut editor = DefaultEditor::new()?;
    println!("vmzone REPL — zone '{}'. Type module.function [arg], or 'exit'.", zone.id());

    loop {
        match editor.readline("vmzone> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                if line == "exit" || line == "quit" {
                    break;
                }
                match parse_repl_line(line) {
                    Some((module, function, arg)) => {
                        let result = blocking_call(zone, module, function, arg, false);
                        print_result(&result, json);
                    }
                    None => println!("expected: module.function [argument]"),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_repl_line(line: &str) -> Option<(String, String, Option<String>)> {
    let mut parts = line.splitn(2, ' ');
    let call = parts.next()?;
    let arg = parts.next().map(str::to_string);
    let (module, function) = call.split_once('.')?;
    Some((module.to_string(), function.to_string(), arg))
}
