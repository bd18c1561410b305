use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn, LevelFilter};

use failure;
use failure::{Error, Fail};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};

use score_follower_core::collaborators::{MidiFileConverter, SeekRequest, SeekRequests};
use score_follower_core::config::Config;
use score_follower_core::output::MidiOutputDispatcher;
use score_follower_core::scheduler::NoteScheduler;
use score_follower_core::time::SystemClock;
use score_follower_core::transport::ClockEvent;
use score_follower_core::Player;

mod commands;
use crate::commands::{Command, Commands};

mod console;
use crate::console::{ConsoleRenderer, LoggingOutput, LoggingSynth};

const SCORE_FOLLOWER_CONFIG: &str = "SCORE_FOLLOWER_CONFIG";
const DEFAULT_SCORE_FOLLOWER_CONFIG: &str = "player.toml";

const SCORE_FOLLOWER_LOG_CONFIG: &str = "SCORE_FOLLOWER_LOG_CONFIG";
const DEFAULT_SCORE_FOLLOWER_LOG_CONFIG: &str = "log4rs.yaml";

#[derive(Debug, Fail)]
enum MainError {
  #[fail(display = "Failed to init logging: {}", cause)]
  LoggingInit { cause: String },

  #[fail(display = "Usage: app-player <score.mid>")]
  Usage,

  #[fail(display = "Failed to read the score {}: {}", path, cause)]
  ReadScore { path: String, cause: String },
}

fn main() -> Result<(), Error> {
  init_logging()?;

  let config = init_config()?;

  let score = read_score()?;

  let clock = Arc::new(SystemClock::new());

  let (seeks_tx, seeks_rx) = crossbeam_channel::bounded::<SeekRequests>(1);

  let mut player = init_player(&config, clock, seeks_tx)?;

  player.load(&score)?;

  let seek_requests = seeks_rx.try_recv().ok();

  let commands = Commands::spawn()?;

  player.play()?;

  run(&mut player, &config, &commands, seek_requests.as_ref());

  player.rewind();

  info!("Bye");

  Ok(())
}

fn init_logging() -> Result<(), Error> {
  let log_config_path = std::env::var(SCORE_FOLLOWER_LOG_CONFIG)
    .unwrap_or_else(|_| DEFAULT_SCORE_FOLLOWER_LOG_CONFIG.to_string());

  if log4rs::init_file(log_config_path.as_str(), Default::default()).is_ok() {
    return Ok(());
  }

  let stdout = ConsoleAppender::builder().build();
  let log_config = LogConfig::builder()
    .appender(Appender::builder().build("stdout", Box::new(stdout)))
    .build(Root::builder().appender("stdout").build(LevelFilter::Info))
    .map_err(|err| MainError::LoggingInit {
      cause: err.to_string(),
    })?;

  log4rs::init_config(log_config).map_err(|err| MainError::LoggingInit {
    cause: err.to_string(),
  })?;

  warn!(
    "Couldn't load the logging configuration from {}, logging to the console",
    log_config_path
  );

  Ok(())
}

fn init_config() -> Result<Config, Error> {
  let config_path = std::env::var(SCORE_FOLLOWER_CONFIG)
    .unwrap_or_else(|_| DEFAULT_SCORE_FOLLOWER_CONFIG.to_string());

  info!("Loading player configuration from {} ...", config_path);
  let config = Config::from_file_or_default(config_path.as_str())?;
  debug!("{:#?}", config);

  Ok(config)
}

fn read_score() -> Result<Vec<u8>, Error> {
  let path = std::env::args().nth(1).ok_or(MainError::Usage)?;

  info!("Reading score from {} ...", path);
  let score = std::fs::read(&path).map_err(|err| MainError::ReadScore {
    path: path.clone(),
    cause: err.to_string(),
  })?;

  Ok(score)
}

fn init_player(
  config: &Config,
  clock: Arc<SystemClock>,
  seeks_tx: crossbeam_channel::Sender<SeekRequests>,
) -> Result<Player, Error> {
  info!("Initialising the player ...");

  let mut player = Player::new(
    config,
    Box::new(MidiFileConverter),
    Box::new(ConsoleRenderer::new(seeks_tx)),
    clock.clone(),
    clock.clone(),
  );

  let scheduler = NoteScheduler::new(LoggingSynth::new(), clock, &config.scheduler)?;
  player.add_sink(Box::new(scheduler));
  player.add_sink(Box::new(MidiOutputDispatcher::new(LoggingOutput)));

  Ok(player)
}

fn run(
  player: &mut Player,
  config: &Config,
  commands: &Commands,
  seek_requests: Option<&SeekRequests>,
) {
  let interval = Duration::from_millis(config.playback.tick_interval_ms.max(1));

  loop {
    for command in commands.receiver().try_iter() {
      if command == Command::Quit {
        return;
      }
      handle_command(player, command, seek_requests);
    }

    if player.tick() == ClockEvent::Ended {
      info!("Type play to start again or quit to exit");
    }

    thread::sleep(interval);
  }
}

fn handle_command(player: &mut Player, command: Command, seek_requests: Option<&SeekRequests>) {
  let result = match command {
    Command::Play => player.play(),
    Command::Pause => player.pause(),
    Command::Rewind => {
      player.rewind();
      Ok(())
    }
    Command::Seek(position_ms) => request_seek(
      player,
      seek_requests,
      SeekRequest::Position { position_ms },
    ),
    Command::Measure(measure) => request_seek(
      player,
      seek_requests,
      SeekRequest::Measure {
        measure,
        offset_ms: 0.0,
      },
    ),
    Command::Velocity(velocity) => player.set_velocity(velocity),
    Command::Repeat(repeat) => {
      player.set_repeat(repeat);
      Ok(())
    }
    Command::Resize => {
      player.resize();
      Ok(())
    }
    Command::Quit => Ok(()),
  };

  if let Err(err) = result {
    warn!("{:?}: {}", command, err);
  }
}

/// Seeks go through the renderer channel, as a click on the score would
fn request_seek(
  player: &mut Player,
  seek_requests: Option<&SeekRequests>,
  request: SeekRequest,
) -> Result<(), score_follower_core::PlayerError> {
  match seek_requests {
    Some(requests) if requests.request(request) => Ok(()),
    _ => match request {
      SeekRequest::Position { position_ms } => player.seek(position_ms).map(|_| ()),
      SeekRequest::Measure { measure, offset_ms } => {
        player.seek_measure(measure, offset_ms).map(|_| ())
      }
    },
  }
}
