pub mod reaper;
pub mod synth;

pub use self::reaper::{Reaper, ReaperError};
pub use self::synth::{Instrument, Synthesizer, VoiceHandle, VoicePool, VoiceRequest};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, trace};

use crate::config::Scheduler as SchedulerConfig;
use crate::midi::types::{U14, U4, U7, PITCH_BEND_CENTER};
use crate::midi::{Message, TimedEvent};
use crate::time::AudioClock;

/// Reference point used to project event timestamps onto the output clocks
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct DispatchTime {
  /// Playback position the other fields correspond to
  pub position_ms: f64,
  pub wall_ms: f64,
  /// Audio clock time, in seconds
  pub audio_time: f64,
  pub velocity: f64,
}

impl DispatchTime {
  pub fn audio_time_of(&self, timestamp_ms: f64) -> f64 {
    self.audio_time + (timestamp_ms - self.position_ms) / self.velocity / 1000.0
  }

  pub fn wall_time_of(&self, timestamp_ms: f64) -> f64 {
    self.wall_ms + (timestamp_ms - self.position_ms) / self.velocity
  }
}

/// A consumer of the timed events of the piece
pub trait EventSink {
  /// Schedules events that are about to be played
  fn dispatch(&mut self, events: &[TimedEvent], at: &DispatchTime);

  /// Drops everything scheduled so far
  fn flush(&mut self);

  /// Called after a discontinuity with the events preceding the new position
  fn restore(&mut self, _preceding: &[TimedEvent], _at: &DispatchTime) {}

  /// Called on every tick while playing, whether or not there are events
  fn advance(&mut self, _at: &DispatchTime) {}
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ScheduledNote {
  pub channel: U4,
  pub key: U7,
  pub velocity: U7,
  pub onset_audio_time: f64,
  pub off_audio_time: Option<f64>,
  pub handle: VoiceHandle,
}

struct State<S> {
  synth: S,
  drum_channel: U4,
  default_program: U7,
  open: Vec<ScheduledNote>,
  pitch_bends: HashMap<U4, Vec<(f64, U14)>>,
  programs: HashMap<U4, U7>,
}

impl<S: Synthesizer> State<S> {
  fn instrument(&self, channel: U4) -> Instrument {
    if channel == self.drum_channel {
      Instrument::DrumKit
    } else {
      let program = self
        .programs
        .get(&channel)
        .cloned()
        .unwrap_or(self.default_program);
      Instrument::Program(program)
    }
  }

  fn pitch_bend(&self, channel: U4, audio_time: f64) -> U14 {
    self
      .pitch_bends
      .get(&channel)
      .and_then(|history| {
        history
          .iter()
          .rev()
          .find(|(time, _)| *time <= audio_time)
          .map(|(_, value)| *value)
      })
      .unwrap_or(PITCH_BEND_CENTER)
  }

  fn note_on(&mut self, channel: U4, key: U7, velocity: U7, audio_time: f64) {
    let request = VoiceRequest {
      channel,
      key,
      velocity,
      instrument: self.instrument(channel),
      pitch_bend: self.pitch_bend(channel, audio_time),
      onset: audio_time,
    };
    let handle = self.synth.enqueue(&request);
    trace!(
      "Scheduled note {} on channel {} at {:.4} s ({:?})",
      key,
      channel,
      audio_time,
      request.instrument
    );
    self.open.push(ScheduledNote {
      channel,
      key,
      velocity,
      onset_audio_time: audio_time,
      off_audio_time: None,
      handle,
    });
  }

  fn note_off(&mut self, channel: U4, key: U7, audio_time: f64) {
    let open = self
      .open
      .iter_mut()
      .find(|note| note.channel == channel && note.key == key && note.off_audio_time.is_none());
    match open {
      Some(note) => note.off_audio_time = Some(audio_time),
      None => trace!("Ignoring note off {} on channel {} without a note on", key, channel),
    }
  }

  fn reap(&mut self, audio_now: f64) -> usize {
    let synth = &mut self.synth;
    let before = self.open.len();
    self.open.retain(|note| match note.off_audio_time {
      Some(off) if off <= audio_now => {
        if synth.is_live(note.handle) {
          synth.cancel(note.handle, off);
        } else {
          trace!("Voice {:?} was already recycled", note.handle);
        }
        false
      }
      _ => true,
    });

    // only the latest bend already in effect is needed by future notes
    for history in self.pitch_bends.values_mut() {
      let in_effect = history.iter().filter(|(time, _)| *time <= audio_now).count();
      if in_effect > 1 {
        history.drain(..in_effect - 1);
      }
    }

    before - self.open.len()
  }

  fn flush(&mut self, audio_now: f64) {
    for note in self.open.drain(..) {
      if self.synth.is_live(note.handle) {
        self.synth.cancel(note.handle, audio_now);
      }
    }
    self.pitch_bends.clear();
  }
}

/// Turns timed MIDI events into voices of a `Synthesizer`.
///
/// Open notes live behind a single mutex shared with the reaper thread,
/// which retires them once their note off time has passed.
pub struct NoteScheduler<S: Synthesizer + 'static> {
  state: Arc<Mutex<State<S>>>,
  clock: Arc<dyn AudioClock>,
  reaper: Option<Reaper>,
}

impl<S: Synthesizer + 'static> NoteScheduler<S> {
  pub fn new(
    synth: S,
    clock: Arc<dyn AudioClock>,
    config: &SchedulerConfig,
  ) -> Result<NoteScheduler<S>, ReaperError> {
    let state = Arc::new(Mutex::new(State {
      synth,
      drum_channel: config.drum_channel,
      default_program: config.default_program,
      open: Vec::new(),
      pitch_bends: HashMap::new(),
      programs: HashMap::new(),
    }));

    let reaper = if config.reaper_interval_ms > 0 {
      let reaper_state = state.clone();
      let reaper_clock = clock.clone();
      let interval = Duration::from_millis(config.reaper_interval_ms);
      Some(Reaper::spawn(interval, move || {
        Self::lock_state(&reaper_state).reap(reaper_clock.now());
      })?)
    } else {
      None
    };

    Ok(NoteScheduler {
      state,
      clock,
      reaper,
    })
  }

  fn lock_state(state: &Mutex<State<S>>) -> MutexGuard<State<S>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn state(&self) -> MutexGuard<State<S>> {
    Self::lock_state(&self.state)
  }

  pub fn has_reaper(&self) -> bool {
    self.reaper.is_some()
  }

  /// Retires the notes whose note off time is not after `audio_now`
  pub fn reap(&self, audio_now: f64) -> usize {
    self.state().reap(audio_now)
  }

  pub fn open_notes(&self) -> Vec<ScheduledNote> {
    self.state().open.clone()
  }

  pub fn program(&self, channel: U4) -> Instrument {
    self.state().instrument(channel)
  }

  /// Runs `f` with the synthesizer, for backends that need to be driven
  pub fn with_synth<R, F: FnOnce(&mut S) -> R>(&self, f: F) -> R {
    f(&mut self.state().synth)
  }
}

impl<S: Synthesizer + 'static> EventSink for NoteScheduler<S> {
  fn dispatch(&mut self, events: &[TimedEvent], at: &DispatchTime) {
    let mut state = self.state();
    for event in events.iter() {
      let audio_time = at.audio_time_of(event.timestamp_ms);
      match event.message {
        Message::NoteOn {
          channel,
          key,
          velocity,
        } => state.note_on(channel, key, velocity, audio_time),
        Message::NoteOff { channel, key, .. } => state.note_off(channel, key, audio_time),
        Message::PitchBend { channel, value } => {
          state
            .pitch_bends
            .entry(channel)
            .or_insert_with(Vec::new)
            .push((audio_time, value));
        }
        Message::ProgramChange { channel, value } => {
          state.programs.insert(channel, value);
        }
        _ => {}
      }
    }
  }

  fn flush(&mut self) {
    let audio_now = self.clock.now();
    let mut state = self.state();
    debug!("Flushing {} open notes", state.open.len());
    state.flush(audio_now);
  }

  fn restore(&mut self, preceding: &[TimedEvent], _at: &DispatchTime) {
    let mut state = self.state();
    state.programs.clear();
    for event in preceding.iter() {
      if let Message::ProgramChange { channel, value } = event.message {
        state.programs.insert(channel, value);
      }
    }
  }

  /// Without a reaper thread the notes are retired from the player ticks
  fn advance(&mut self, at: &DispatchTime) {
    if self.reaper.is_none() {
      let reaped = self.reap(at.audio_time);
      if reaped > 0 {
        trace!("Retired {} notes", reaped);
      }
    }
  }
}
