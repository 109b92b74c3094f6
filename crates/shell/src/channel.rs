//! JSON-lines command channel over stdin/stdout

use crate::ShellEvent;
use crossbeam_channel::Sender;
use overlay_shell_core::command::{Command, Reply};
use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use winit::event_loop::EventLoopProxy;

/// What the reader thread hands to the event loop
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    /// A line that is not a valid command; answered with an error reply
    Malformed(String),
    /// stdin reached EOF
    Closed,
}

/// Read commands from stdin on a background thread, waking the event loop
/// after each one
pub fn spawn_stdin_reader(
    commands: Sender<Inbound>,
    proxy: EventLoopProxy<ShellEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("command-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            read_commands(stdin.lock(), &commands, || {
                let _ = proxy.send_event(ShellEvent::Wake);
            });
        })
}

pub fn read_commands<R: BufRead>(reader: R, commands: &Sender<Inbound>, wake: impl Fn()) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read command channel: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let inbound = match Command::parse(&line) {
            Ok(command) => Inbound::Command(command),
            Err(e) => Inbound::Malformed(format!("invalid command: {}", e)),
        };
        if commands.send(inbound).is_err() {
            return;
        }
        wake();
    }

    debug!("Command channel closed");
    let _ = commands.send(Inbound::Closed);
    wake();
}

/// Writes one reply per line
pub struct ReplyWriter<W: Write> {
    out: W,
}

impl<W: Write> ReplyWriter<W> {
    pub fn new(out: W) -> Self {
        ReplyWriter { out }
    }

    pub fn send(&mut self, reply: &Reply) {
        let written = writeln!(self.out, "{}", reply.to_line()).and_then(|_| self.out.flush());
        if let Err(e) = written {
            warn!("Failed to write reply: {}", e);
        }
    }
}
