use std::sync::Arc;

use failure::Fail;
use log::{debug, info, warn};

use crate::collaborators::{Converter, PendingSeeks, Renderer, SeekRequest, SeekRequests};
use crate::config::Config;
use crate::midi::{CodecError, MidiFile, Sequence};
use crate::scheduler::{DispatchTime, EventSink};
use crate::sync::SyncCoordinator;
use crate::time::{AudioClock, WallClock};
use crate::timemap::{PlaybackPosition, Timemap, TimemapBuilder, TimemapError};
use crate::transport::{ClockEvent, ClockMisuse, PlaybackClock, TransportState};

#[derive(Debug, Fail)]
pub enum PlayerError {
  #[fail(display = "No score loaded")]
  NotLoaded,

  #[fail(display = "Failed to convert the score: {}", cause)]
  Conversion { cause: String },

  #[fail(display = "Failed to decode the MIDI data: {}", cause)]
  Decode {
    #[cause]
    cause: CodecError,
  },

  #[fail(display = "Failed to build the timemap: {}", cause)]
  Timemap {
    #[cause]
    cause: TimemapError,
  },

  #[fail(display = "Failed to initialise the renderer: {}", cause)]
  Renderer { cause: String },

  #[fail(display = "{}", cause)]
  Clock {
    #[cause]
    cause: ClockMisuse,
  },

  #[fail(display = "Measure {} is not in the timemap", measure)]
  UnknownMeasure { measure: u32 },
}

impl From<ClockMisuse> for PlayerError {
  fn from(cause: ClockMisuse) -> Self {
    debug!("Ignored transport request: {}", cause);
    PlayerError::Clock { cause }
  }
}

struct Score {
  sequence: Sequence,
  timemap: Arc<Timemap>,
  version: String,
}

/// Plays one score at a time, keeping the outputs and the cursor in sync.
///
/// Everything runs on the caller thread: `tick` has to be called
/// periodically (see `Playback::tick_interval_ms`) to advance playback.
pub struct Player {
  lookahead_ms: f64,
  converter: Box<dyn Converter>,
  wall_clock: Arc<dyn WallClock>,
  audio_clock: Arc<dyn AudioClock>,
  transport: PlaybackClock,
  coordinator: SyncCoordinator,
  sinks: Vec<Box<dyn EventSink>>,
  score: Option<Score>,
  seek_requests: SeekRequests,
  pending_seeks: PendingSeeks,
  dispatched_until: f64,
}

impl Player {
  pub fn new(
    config: &Config,
    converter: Box<dyn Converter>,
    renderer: Box<dyn Renderer>,
    wall_clock: Arc<dyn WallClock>,
    audio_clock: Arc<dyn AudioClock>,
  ) -> Player {
    let mut transport = PlaybackClock::new(None);
    transport.set_repeat(config.playback.repeat);
    if let Err(err) = transport.set_velocity(config.playback.velocity, 0.0) {
      warn!("Ignoring the configured velocity: {}", err);
    }

    let (seek_requests, pending_seeks) = SeekRequests::channel();

    Player {
      lookahead_ms: config.playback.lookahead_ms.max(0.0),
      converter,
      wall_clock,
      audio_clock,
      transport,
      coordinator: SyncCoordinator::new(Arc::new(Timemap::default()), renderer),
      sinks: Vec::new(),
      score: None,
      seek_requests,
      pending_seeks,
      dispatched_until: 0.0,
    }
  }

  pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
    self.sinks.push(sink);
  }

  /// Converts, decodes and maps the score. On failure the previous score stays loaded.
  pub fn load(&mut self, score: &[u8]) -> Result<(), PlayerError> {
    info!("Loading score ({} bytes) ...", score.len());

    let conversion = self
      .converter
      .initialize(score)
      .map_err(|err| PlayerError::Conversion {
        cause: err.to_string(),
      })?;

    let file = MidiFile::decode(&conversion.midi).map_err(|cause| PlayerError::Decode { cause })?;
    let sequence = Sequence::from_file(&file);

    let builder = match conversion.timemap {
      Some(entries) => {
        TimemapBuilder::from_external(entries).map_err(|cause| PlayerError::Timemap { cause })?
      }
      None => TimemapBuilder::from_markers(&file),
    };
    let total_duration = conversion.duration_ms.or_else(|| Some(sequence.duration_ms()));
    let timemap = Arc::new(builder.close(total_duration));

    self
      .coordinator
      .renderer_mut()
      .initialize(score, self.seek_requests.clone())
      .map_err(|err| PlayerError::Renderer {
        cause: err.to_string(),
      })?;

    info!(
      "Loaded {} events, {} measures, {:?} ms (converter {})",
      sequence.events().len(),
      timemap.len(),
      total_duration,
      conversion.version
    );

    if self.score.is_some() {
      self.flush_sinks();
    }
    self.transport.rewind();
    self.transport.set_total_duration(total_duration);
    self.coordinator.set_timemap(timemap.clone());
    self.dispatched_until = 0.0;
    self.score = Some(Score {
      sequence,
      timemap,
      version: conversion.version,
    });
    self.coordinator.move_to(0.0, true);
    Ok(())
  }

  pub fn is_loaded(&self) -> bool {
    self.score.is_some()
  }

  pub fn version(&self) -> Option<&str> {
    self.score.as_ref().map(|score| score.version.as_str())
  }

  pub fn timemap(&self) -> Option<&Timemap> {
    self.score.as_ref().map(|score| score.timemap.as_ref())
  }

  pub fn state(&self) -> TransportState {
    self.transport.state()
  }

  pub fn position(&self) -> f64 {
    self.transport.position(self.wall_clock.now_ms())
  }

  pub fn playback_position(&self) -> PlaybackPosition {
    self.coordinator.position_at(self.position())
  }

  pub fn play(&mut self) -> Result<(), PlayerError> {
    self.loaded()?;
    let now = self.wall_clock.now_ms();
    self.transport.play(now)?;
    let position = self.transport.position(now);
    info!("Playing from {:.1} ms", position);
    self.resync(position, now);
    Ok(())
  }

  pub fn pause(&mut self) -> Result<(), PlayerError> {
    let now = self.wall_clock.now_ms();
    self.transport.pause(now)?;
    let position = self.transport.position(now);
    info!("Paused at {:.1} ms", position);
    self.flush_sinks();
    self.dispatched_until = position;
    self.coordinator.move_to(position, true);
    Ok(())
  }

  pub fn rewind(&mut self) {
    info!("Rewind");
    self.transport.rewind();
    self.flush_sinks();
    self.dispatched_until = 0.0;
    self.coordinator.move_to(0.0, true);
  }

  /// The one entry point for every discontinuity of the position
  pub fn seek(&mut self, position_ms: f64) -> Result<PlaybackPosition, PlayerError> {
    self.loaded()?;
    let now = self.wall_clock.now_ms();
    self.transport.seek(position_ms, now);
    let position = self.transport.position(now);
    debug!("Seek to {:.1} ms", position);
    self.flush_sinks();
    Ok(self.resync(position, now))
  }

  pub fn seek_measure(
    &mut self,
    measure: u32,
    offset_ms: f64,
  ) -> Result<PlaybackPosition, PlayerError> {
    let timestamp = self
      .timemap()
      .ok_or(PlayerError::NotLoaded)?
      .timestamp_of(measure, offset_ms)
      .ok_or(PlayerError::UnknownMeasure { measure })?;
    self.seek(timestamp)
  }

  /// Takes effect on the next dispatched window, what is already scheduled keeps its timing
  pub fn set_velocity(&mut self, velocity: f64) -> Result<(), PlayerError> {
    let now = self.wall_clock.now_ms();
    self.transport.set_velocity(velocity, now)?;
    Ok(())
  }

  pub fn velocity(&self) -> f64 {
    self.transport.velocity()
  }

  pub fn set_repeat(&mut self, repeat: i32) {
    self.transport.set_repeat(repeat);
  }

  pub fn resize(&mut self) {
    self.coordinator.resize();
  }

  /// Handles the pending seek requests, advances the clock, feeds the
  /// upcoming events to the sinks and moves the cursor.
  pub fn tick(&mut self) -> ClockEvent {
    self.handle_seek_requests();

    if !self.transport.is_playing() {
      return ClockEvent::None;
    }

    let now = self.wall_clock.now_ms();
    let event = self.transport.tick(now);
    match event {
      ClockEvent::Ended => {
        info!("Playback ended");
        self.flush_sinks();
        self.dispatched_until = 0.0;
        self.coordinator.move_to(0.0, true);
        return event;
      }
      ClockEvent::Looped => {
        debug!("Playback looped");
        self.flush_sinks();
        self.resync(0.0, now);
      }
      ClockEvent::None => {}
    }

    let position = self.transport.position(now);
    self.dispatch_window(position, now);
    let at = self.dispatch_time(position, now);
    for sink in self.sinks.iter_mut() {
      sink.advance(&at);
    }
    self.coordinator.move_to(position, false);
    event
  }

  fn handle_seek_requests(&mut self) {
    let requests: Vec<SeekRequest> = self.pending_seeks.try_iter().collect();
    for request in requests {
      let result = match request {
        SeekRequest::Position { position_ms } => self.seek(position_ms),
        SeekRequest::Measure { measure, offset_ms } => self.seek_measure(measure, offset_ms),
      };
      if let Err(err) = result {
        warn!("Ignoring seek request {:?}: {}", request, err);
      }
    }
  }

  fn dispatch_window(&mut self, position: f64, now: f64) {
    let score = match self.score.as_ref() {
      Some(score) => score,
      None => return,
    };

    let end = position + self.lookahead_ms * self.transport.velocity();
    let end = match self.transport.total_duration() {
      // the events sitting on the very end go out with the last window
      Some(total) if end >= total => std::f64::INFINITY,
      _ => end,
    };
    if end <= self.dispatched_until {
      return;
    }

    let events = score.sequence.window(self.dispatched_until, end);
    if !events.is_empty() {
      let at = self.dispatch_time(position, now);
      for sink in self.sinks.iter_mut() {
        sink.dispatch(events, &at);
      }
    }
    self.dispatched_until = end;
  }

  /// Restarts dispatching from `position` and forces the cursor there
  fn resync(&mut self, position: f64, now: f64) -> PlaybackPosition {
    self.dispatched_until = position;
    if let Some(score) = self.score.as_ref() {
      let at = self.dispatch_time(position, now);
      let preceding = score.sequence.before(position);
      for sink in self.sinks.iter_mut() {
        sink.restore(preceding, &at);
      }
    }
    let forwarded = self.coordinator.move_to(position, true);
    forwarded.unwrap_or_else(|| self.coordinator.position_at(position))
  }

  fn dispatch_time(&self, position: f64, now: f64) -> DispatchTime {
    DispatchTime {
      position_ms: position,
      wall_ms: now,
      audio_time: self.audio_clock.now(),
      velocity: self.transport.velocity(),
    }
  }

  fn flush_sinks(&mut self) {
    for sink in self.sinks.iter_mut() {
      sink.flush();
    }
  }

  fn loaded(&self) -> Result<(), PlayerError> {
    if self.score.is_some() {
      Ok(())
    } else {
      Err(PlayerError::NotLoaded)
    }
  }
}
