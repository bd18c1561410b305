use std::io::BufRead;
use std::thread;
use std::thread::JoinHandle;

use failure::Fail;
use log::{info, warn};

use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Fail)]
pub enum CommandsError {
  #[fail(display = "Failed to create the console thread: {}", cause)]
  Start { cause: String },
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Command {
  Play,
  Pause,
  Rewind,
  Seek(f64),
  Measure(u32),
  Velocity(f64),
  Repeat(i32),
  Resize,
  Quit,
}

impl Command {
  pub fn parse(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    let argument = words.next();
    match (name, argument) {
      ("play", None) => Some(Command::Play),
      ("pause", None) => Some(Command::Pause),
      ("rewind", None) => Some(Command::Rewind),
      ("resize", None) => Some(Command::Resize),
      ("quit", None) | ("q", None) => Some(Command::Quit),
      ("seek", Some(value)) => value.parse().ok().map(Command::Seek),
      ("measure", Some(value)) => value.parse().ok().map(Command::Measure),
      ("velocity", Some(value)) => value.parse().ok().map(Command::Velocity),
      ("repeat", Some(value)) => value.parse().ok().map(Command::Repeat),
      _ => None,
    }
  }
}

/// Reads commands from the standard input on its own thread
pub struct Commands {
  _handler: JoinHandle<()>,
  rx: Receiver<Command>,
}

impl Commands {
  pub fn spawn() -> Result<Commands, CommandsError> {
    let (tx, rx) = crossbeam_channel::unbounded::<Command>();

    thread::Builder::new()
      .name("console".into())
      .spawn(move || Self::read_lines(tx))
      .map_err(|err| CommandsError::Start {
        cause: err.to_string(),
      })
      .map(|handler| Commands {
        _handler: handler,
        rx,
      })
  }

  fn read_lines(tx: Sender<Command>) {
    info!("Commands: play, pause, rewind, seek <ms>, measure <n>, velocity <v>, repeat <n>, quit");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let line = match line {
        Ok(line) => line,
        Err(_) => break,
      };
      match Command::parse(&line) {
        Some(command) => {
          if tx.send(command).is_err() || command == Command::Quit {
            break;
          }
        }
        None if line.trim().is_empty() => {}
        None => warn!("Unknown command: {}", line.trim()),
      }
    }
  }

  pub fn receiver(&self) -> &Receiver<Command> {
    &self.rx
  }
}
