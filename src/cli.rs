//! Command-line interface and REPL
//!
//! Remotes are addressed by their 1-based position in the `list` output.

use anyhow::{anyhow, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Handle;

use crate::manager::{ManagerHandle, ManagerSnapshot};
use crate::midi::MidiMessage;
use crate::remote::{RemoteDetails, RemoteState};

const HELP: &str = "\
Commands:
  scan | stop                   start or stop discovery
  refresh                       re-read host MIDI devices
  list                          show known remotes
  connect N | disconnect N      open or close remote N
  cancel N                      cancel the wireless session of remote N
  select N | select none        choose the output destination
  note-on CH KEY VEL            send a note on (channel 1-16)
  note-off CH KEY VEL           send a note off
  cc CH CONTROL VALUE           send a control change
  program CH PROGRAM            send a program change
  bend CH VALUE                 send a pitch bend (0-16383)
  last                          show the most recent inbound messages
  help | quit";

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Scan,
    Stop,
    Refresh,
    List,
    Connect(usize),
    Disconnect(usize),
    Cancel(usize),
    Select(Option<usize>),
    Send(MidiMessage),
    Last,
    Help,
    Quit,
}

/// Parse one line of user input
///
/// Remote indices and channels are 1-based as typed; returned indices are
/// 0-based, channels inside [`MidiMessage`] are 0-based.
pub fn parse_command(line: &str) -> Result<ReplCommand> {
    let mut words = line.split_whitespace();
    let verb = words
        .next()
        .ok_or_else(|| anyhow!("empty command"))?
        .to_lowercase();
    let args: Vec<&str> = words.collect();

    let command = match verb.as_str() {
        "scan" => ReplCommand::Scan,
        "stop" => ReplCommand::Stop,
        "refresh" => ReplCommand::Refresh,
        "list" | "ls" => ReplCommand::List,
        "connect" => ReplCommand::Connect(index_arg(&args)?),
        "disconnect" => ReplCommand::Disconnect(index_arg(&args)?),
        "cancel" => ReplCommand::Cancel(index_arg(&args)?),
        "select" => match args.first() {
            Some(&"none") => ReplCommand::Select(None),
            _ => ReplCommand::Select(Some(index_arg(&args)?)),
        },
        "note-on" | "note-off" => {
            let [channel, note, velocity] = three_args(&args)?;
            let channel = channel_arg(channel)?;
            let note = data_arg(note)?;
            let velocity = data_arg(velocity)?;
            if verb == "note-on" {
                ReplCommand::Send(MidiMessage::NoteOn { channel, note, velocity })
            } else {
                ReplCommand::Send(MidiMessage::NoteOff { channel, note, velocity })
            }
        }
        "cc" => {
            let [channel, cc, value] = three_args(&args)?;
            ReplCommand::Send(MidiMessage::ControlChange {
                channel: channel_arg(channel)?,
                cc: data_arg(cc)?,
                value: data_arg(value)?,
            })
        }
        "program" => {
            let [channel, program] = two_args(&args)?;
            ReplCommand::Send(MidiMessage::ProgramChange {
                channel: channel_arg(channel)?,
                program: data_arg(program)?,
            })
        }
        "bend" => {
            let [channel, value] = two_args(&args)?;
            let value: u16 = value
                .parse()
                .map_err(|_| anyhow!("invalid bend value '{}'", value))?;
            if value > 0x3FFF {
                return Err(anyhow!("bend value must be 0-16383"));
            }
            ReplCommand::Send(MidiMessage::PitchBend {
                channel: channel_arg(channel)?,
                value,
            })
        }
        "last" => ReplCommand::Last,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(anyhow!("unknown command '{}', try 'help'", other)),
    };

    Ok(command)
}

fn index_arg(args: &[&str]) -> Result<usize> {
    let raw = args.first().ok_or_else(|| anyhow!("missing remote number"))?;
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(anyhow!("invalid remote number '{}'", raw)),
    }
}

fn channel_arg(raw: &str) -> Result<u8> {
    match raw.parse::<u8>() {
        Ok(n @ 1..=16) => Ok(n - 1),
        _ => Err(anyhow!("channel must be 1-16, got '{}'", raw)),
    }
}

fn data_arg(raw: &str) -> Result<u8> {
    match raw.parse::<u8>() {
        Ok(n) if n <= 0x7F => Ok(n),
        _ => Err(anyhow!("value must be 0-127, got '{}'", raw)),
    }
}

fn two_args<'a>(args: &[&'a str]) -> Result<[&'a str; 2]> {
    match args {
        [a, b] => Ok([*a, *b]),
        _ => Err(anyhow!("expected 2 arguments, got {}", args.len())),
    }
}

fn three_args<'a>(args: &[&'a str]) -> Result<[&'a str; 3]> {
    match args {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(anyhow!("expected 3 arguments, got {}", args.len())),
    }
}

/// Render the remote table shown by `list` and `--list`
pub fn format_remotes(snapshot: &ManagerSnapshot) -> Vec<String> {
    if snapshot.remotes.is_empty() {
        return vec![format!("  {}", "No remotes known".dimmed())];
    }

    snapshot
        .remotes
        .iter()
        .enumerate()
        .map(|(index, remote)| {
            let selected = if snapshot.selected_destination == Some(remote.id) {
                "*".bright_green().to_string()
            } else {
                " ".to_string()
            };
            format!(
                "{} {:>2}. {} [{}]{}",
                selected,
                index + 1,
                remote.description().bright_white(),
                state_label(remote),
                endpoint_summary(remote)
            )
        })
        .collect()
}

fn state_label(remote: &RemoteDetails) -> ColoredString {
    match remote.state {
        RemoteState::Connected => "connected".green(),
        RemoteState::Disconnected => "disconnected".yellow(),
        RemoteState::Offline => "offline".dimmed(),
    }
}

fn endpoint_summary(remote: &RemoteDetails) -> String {
    let mut parts = Vec::new();
    if let Some(source) = remote.source {
        parts.push(format!("in {}", source));
    }
    if let Some(destination) = remote.destination {
        parts.push(format!("out {}", destination));
    }
    if let Some(session) = remote.session {
        parts.push(session.to_string());
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

/// Echo line for a message handed to the manager
pub fn format_sent(message: &MidiMessage) -> String {
    format!("-> {} [{}]", message, crate::midi::format_hex(&message.encode()))
}

/// Run the interactive prompt until `quit` or end of input
pub async fn run_repl(manager: ManagerHandle) -> Result<()> {
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || repl_loop(manager, runtime)).await?
}

fn repl_loop(manager: ManagerHandle, runtime: Handle) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", "Type 'help' for commands".dimmed());

    loop {
        let line = match rl.readline("midi> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e.to_string().red());
                continue;
            }
        };

        if command == ReplCommand::Quit {
            break;
        }
        if !manager.is_alive() {
            println!("{}", "Manager stopped".red());
            break;
        }
        execute(&manager, &runtime, command);
    }

    Ok(())
}

fn execute(manager: &ManagerHandle, runtime: &Handle, command: ReplCommand) {
    let snapshot = || runtime.block_on(manager.snapshot());

    match command {
        ReplCommand::Scan => manager.start_scanning(),
        ReplCommand::Stop => manager.stop_scanning(),
        ReplCommand::Refresh => manager.refresh(),
        ReplCommand::List => {
            if let Some(snapshot) = snapshot() {
                let scanning = if snapshot.is_scanning { ", scanning" } else { "" };
                println!("{} ({}{})", "Remotes".bold().cyan(), snapshot.transport, scanning);
                for line in format_remotes(&snapshot) {
                    println!("{}", line);
                }
            }
        }
        ReplCommand::Connect(index)
        | ReplCommand::Disconnect(index)
        | ReplCommand::Cancel(index)
        | ReplCommand::Select(Some(index)) => {
            let Some(id) = snapshot().and_then(|s| s.remotes.get(index).map(|r| r.id)) else {
                println!("{}", format!("No remote number {}", index + 1).red());
                return;
            };
            match command {
                ReplCommand::Connect(_) => manager.connect(id),
                ReplCommand::Disconnect(_) => manager.disconnect(id),
                ReplCommand::Cancel(_) => manager.cancel_session(id),
                _ => manager.select_destination(Some(id)),
            }
        }
        ReplCommand::Select(None) => manager.select_destination(None),
        ReplCommand::Send(message) => match message.to_packed(0) {
            Some(word) => {
                manager.send(vec![word]);
                println!("{}", format_sent(&message).dimmed());
            }
            None => println!("{}", "Message cannot be packed".red()),
        },
        ReplCommand::Last => {
            if let Some(snapshot) = snapshot() {
                match snapshot.last_source {
                    Some(source) => {
                        println!("{}", source.bold());
                        for message in snapshot.last_messages {
                            println!("  {}", message);
                        }
                    }
                    None => println!("{}", "Nothing received yet".dimmed()),
                }
            }
        }
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Quit => {}
    }
}
