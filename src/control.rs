// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Operator commands, parsed from console lines and executed against the supervisor

use std::io::{self, Write};
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::error::ErrorKind;
use crate::procs::{StopOutcome, Supervisor};
use crate::registry::Registry;
use crate::Error;

pub const HELP: &str = "\
Commands:
  list              - show all configured programs
  running           - show the programs that are running
  start <program>   - start a program
  stop <program>    - stop a program
  restart <program> - restart a program
  stopall           - stop all programs
  exit              - stop all programs and quit
  help              - show this help";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List,
    Running,
    Start(String),
    Stop(String),
    Restart(String),
    StopAll,
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = Error;

    /// The keyword is case-insensitive, the rest of the line is the argument
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (keyword, argument) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], line[idx..].trim()),
            None => (line, ""),
        };

        let required = |example: &'static str| -> Result<String, Error> {
            if argument.is_empty() {
                Err(ErrorKind::MissingArgument(example).into())
            } else {
                Ok(argument.to_string())
            }
        };

        let command = match keyword.to_lowercase().as_str() {
            "list" => Command::List,
            "running" => Command::Running,
            "start" => Command::Start(required("start Sleep")?),
            "stop" => Command::Stop(required("stop Sleep")?),
            "restart" => Command::Restart(required("restart Sleep")?),
            "stopall" => Command::StopAll,
            "help" => Command::Help,
            "exit" => Command::Exit,
            _ => return Err(ErrorKind::UnknownCommand(keyword.to_string()).into()),
        };

        Ok(command)
    }
}

/// Whether the console keeps reading after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reads and executes lines from `input` until `exit` or end of input
///
/// Lines are decoded lossily, so bytes that are not UTF-8 only produce an unknown
/// command. If reading or writing fails the tracked programs are stopped before
/// the error is returned.
pub async fn run<R, W>(
    mut input: R,
    registry: &Registry,
    supervisor: &mut Supervisor,
    out: &mut W,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let result = read_commands(&mut input, registry, supervisor, out).await;

    if let Err(err) = &result {
        warn!(error = %err, "console failed, stopping all programs");
        // stop first, the output may be what failed
        for (name, stopped) in supervisor.stop_all().await {
            print_stop(&name, stopped, out).ok();
        }
    }

    result
}

async fn read_commands<R, W>(
    input: &mut R,
    registry: &Registry,
    supervisor: &mut Supervisor,
    out: &mut W,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{}", HELP)?;

    let mut buf = Vec::new();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            // end of input, same as exit
            writeln!(out)?;
            execute(Command::Exit, registry, supervisor, out).await?;
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        if execute_line(&line, registry, supervisor, out).await? == Flow::Exit {
            return Ok(());
        }
    }
}

/// Parses and executes one console line
///
/// Every failure of the command is written to `out`; only failing to write is an error.
pub async fn execute_line<W: Write>(
    line: &str,
    registry: &Registry,
    supervisor: &mut Supervisor,
    out: &mut W,
) -> io::Result<Flow> {
    if line.trim().is_empty() {
        return Ok(Flow::Continue);
    }

    match line.parse::<Command>() {
        Ok(command) => execute(command, registry, supervisor, out).await,
        Err(err) => {
            writeln!(out, "{}", err)?;
            Ok(Flow::Continue)
        }
    }
}

pub async fn execute<W: Write>(
    command: Command,
    registry: &Registry,
    supervisor: &mut Supervisor,
    out: &mut W,
) -> io::Result<Flow> {
    match command {
        Command::List => print_configured(registry, supervisor, out)?,
        Command::Running => print_running(supervisor, out)?,
        Command::Start(name) => match registry.lookup(&name) {
            Some(def) => match supervisor.start(def) {
                Ok(pid) => writeln!(out, "started: {} (PID: {})", def.name(), pid)?,
                Err(err) => writeln!(out, "{}", err)?,
            },
            None => writeln!(out, "{}", Error::from(ErrorKind::UnknownApplication(name)))?,
        },
        Command::Stop(name) => {
            // prefer the configured spelling, the live map is keyed by it
            let name = registry
                .lookup(&name)
                .map(|def| def.name().to_string())
                .unwrap_or(name);

            let result = supervisor.stop(&name).await;
            print_stop(&name, result, out)?;
        }
        Command::Restart(name) => match registry.lookup(&name) {
            Some(def) => {
                let restarted = supervisor.restart(def).await;
                if let Some(outcome) = restarted.stopped {
                    print_stop(def.name(), Ok(outcome), out)?;
                }

                match restarted.started {
                    Ok(pid) => writeln!(out, "started: {} (PID: {})", def.name(), pid)?,
                    Err(err) => writeln!(out, "{}", err)?,
                }
            }
            None => writeln!(out, "{}", Error::from(ErrorKind::UnknownApplication(name)))?,
        },
        Command::StopAll => stop_all(supervisor, out).await?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Exit => {
            stop_all(supervisor, out).await?;
            return Ok(Flow::Exit);
        }
    }

    Ok(Flow::Continue)
}

async fn stop_all<W: Write>(supervisor: &mut Supervisor, out: &mut W) -> io::Result<()> {
    writeln!(out, "stopping all programs...")?;
    for (name, result) in supervisor.stop_all().await {
        print_stop(&name, result, out)?;
    }

    Ok(())
}

fn print_stop<W: Write>(
    name: &str,
    result: Result<StopOutcome, Error>,
    out: &mut W,
) -> io::Result<()> {
    match result {
        Ok(StopOutcome::Graceful) => writeln!(out, "stopped gracefully: {}", name),
        Ok(StopOutcome::Forced) => writeln!(out, "force-stopped: {}", name),
        Ok(StopOutcome::AlreadyExited) => writeln!(out, "already exited: {}", name),
        Err(err) => writeln!(out, "{}", err),
    }
}

fn print_configured<W: Write>(
    registry: &Registry,
    supervisor: &Supervisor,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "configured programs:")?;
    for status in supervisor.list_configured(registry) {
        let state = match status.pid {
            Some(pid) => format!("running (PID: {})", pid),
            None => "not running".to_string(),
        };

        writeln!(
            out,
            "  {}: {} [{}]",
            status.definition.name(),
            status.definition.path(),
            state
        )?;
    }

    Ok(())
}

fn print_running<W: Write>(supervisor: &mut Supervisor, out: &mut W) -> io::Result<()> {
    writeln!(out, "running programs:")?;

    let running = supervisor.list_running();
    if running.is_empty() {
        return writeln!(out, "  no program running");
    }

    for status in running {
        let exited = if status.exited { " (exited)" } else { "" };
        writeln!(out, "  {}: PID {}{}", status.name, status.pid, exited)?;
    }

    Ok(())
}
