use std::{
    io::{self, IsTerminal as _},
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};

use anyhow::Context as _;
use konsol::{NullHost, environment_profile};
use konsol_server::{
    protocol::{SERVER_NAME, SERVER_VERSION},
    server::Server,
};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: konsol-server [OPTIONS]

Options:
  --stdio      Serve the protocol on stdin/stdout
  --version    Print the version and exit
  --help       Print this help and exit

The working directory at launch is treated as the host application root.
KONSOL_ENV selects the host environment profile (default: development).
RUST_LOG controls diagnostic logging on stderr.";

enum CliAction {
    Stdio,
    Version,
    Help,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let action = match parse_args(&args) {
        Ok(action) => action,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match action {
        CliAction::Version => {
            println!("{SERVER_NAME} {SERVER_VERSION}");
            ExitCode::SUCCESS
        }
        CliAction::Help => {
            println!("{USAGE}");
            ExitCode::SUCCESS
        }
        CliAction::Stdio => match serve_stdio() {
            Ok(code) => ExitCode::from(code),
            Err(err) => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn parse_args(args: &[String]) -> Result<CliAction, String> {
    let mut action = None;
    for arg in args {
        match arg.as_str() {
            "--stdio" => action = Some(CliAction::Stdio),
            "--version" => return Ok(CliAction::Version),
            "--help" => return Ok(CliAction::Help),
            other => return Err(format!("unknown option '{other}'")),
        }
    }
    action.ok_or_else(|| "no transport selected".to_owned())
}

/// Runs the server over stdin/stdout, returning the process exit code.
fn serve_stdio() -> anyhow::Result<u8> {
    // Logging must stay off stdout; frames own that stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("failed to register SIGTERM handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("failed to register SIGINT handler")?;

    tracing::info!(
        version = SERVER_VERSION,
        profile = %environment_profile(),
        "konsol-server listening on stdio"
    );

    let mut server = Server::with_signal_flag(Box::new(NullHost), shutdown);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let code = server.run(&mut stdin.lock(), &mut stdout.lock());
    tracing::info!(code, "server loop finished");
    Ok(u8::try_from(code).unwrap_or(1))
}
