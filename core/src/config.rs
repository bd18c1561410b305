use failure;
use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::info;

use crate::midi::types::{U4, U7};

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Playback {
  /// Period of the tick loop driving the clock and the cursor
  pub tick_interval_ms: u64,
  /// How far ahead of the clock events are handed to the outputs
  pub lookahead_ms: f64,
  pub velocity: f64,
  /// Number of restarts once the end is reached, -1 loops forever
  pub repeat: i32,
}

impl Default for Playback {
  fn default() -> Playback {
    Playback {
      tick_interval_ms: 20,
      lookahead_ms: 100.0,
      velocity: 1.0,
      repeat: 0,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Scheduler {
  /// Period of the thread retiring finished notes. With 0 there is no thread
  /// and the notes are retired on every player tick.
  pub reaper_interval_ms: u64,
  pub drum_channel: U4,
  pub default_program: U7,
}

impl Default for Scheduler {
  fn default() -> Scheduler {
    Scheduler {
      reaper_interval_ms: 25,
      drum_channel: 9,
      default_program: 1,
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
  pub playback: Playback,
  pub scheduler: Scheduler,
}

impl Config {
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    let mut content = String::new();
    let mut file = File::open(path)?;
    file.read_to_string(&mut content)?;
    Self::from_str(content.as_str())
  }

  /// Same as `from_file` but a missing file gives the defaults
  pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    if path.as_ref().exists() {
      Self::from_file(path)
    } else {
      info!(
        "Configuration file {} not found, using defaults",
        path.as_ref().display()
      );
      Ok(Config::default())
    }
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  pub fn empty_config_has_defaults() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.playback.tick_interval_ms, 20);
    assert_eq!(config.playback.lookahead_ms, 100.0);
    assert_eq!(config.playback.velocity, 1.0);
    assert_eq!(config.playback.repeat, 0);
    assert_eq!(config.scheduler.reaper_interval_ms, 25);
    assert_eq!(config.scheduler.drum_channel, 9);
    assert_eq!(config.scheduler.default_program, 1);
  }

  #[test]
  pub fn partial_sections() {
    let config = Config::from_str(
      r#"
      [playback]
      velocity = 0.5
      repeat = -1

      [scheduler]
      drum_channel = 10
      "#,
    )
    .unwrap();
    assert_eq!(config.playback.velocity, 0.5);
    assert_eq!(config.playback.repeat, -1);
    assert_eq!(config.playback.tick_interval_ms, 20);
    assert_eq!(config.scheduler.drum_channel, 10);
    assert_eq!(config.scheduler.default_program, 1);
  }

  #[test]
  pub fn invalid_config() {
    assert!(Config::from_str("[playback]\nvelocity = \"fast\"").is_err());
  }

  #[test]
  pub fn missing_file_gives_defaults() {
    let config = Config::from_file_or_default("/nonexistent/player.toml").unwrap();
    assert_eq!(config.playback.tick_interval_ms, 20);
  }
}
