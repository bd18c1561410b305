use std::collections::BTreeMap;

use log::{debug, trace};

use crate::midi::types::{U4, U7};
use crate::midi::{Encoder, Message, TimedEvent};
use crate::scheduler::{DispatchTime, EventSink};

/// A device accepting raw MIDI messages, such as a hardware port or a web synth
pub trait AudioOutput {
  /// Sends one encoded message to be played at the wall-clock `timestamp_ms`
  fn send(&mut self, data: &[u8], timestamp_ms: f64);

  /// Drops every message not played yet
  fn clear(&mut self);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
  fn send(&mut self, data: &[u8], timestamp_ms: f64) {
    (**self).send(data, timestamp_ms)
  }

  fn clear(&mut self) {
    (**self).clear()
  }
}

/// Forwards the channel messages of the piece to an `AudioOutput`
pub struct MidiOutputDispatcher<O: AudioOutput> {
  output: O,
  buffer: Vec<u8>,
}

impl<O: AudioOutput> MidiOutputDispatcher<O> {
  pub fn new(output: O) -> MidiOutputDispatcher<O> {
    MidiOutputDispatcher {
      output,
      buffer: Vec::with_capacity(3),
    }
  }

  pub fn output(&self) -> &O {
    &self.output
  }

  fn send(&mut self, message: &Message, timestamp_ms: f64) {
    self.buffer.clear();
    Encoder::encode_message(message, &mut self.buffer);
    trace!("MIDI out {:02x?} at {:.3} ms", self.buffer, timestamp_ms);
    self.output.send(&self.buffer, timestamp_ms);
  }
}

impl<O: AudioOutput> EventSink for MidiOutputDispatcher<O> {
  fn dispatch(&mut self, events: &[TimedEvent], at: &DispatchTime) {
    for event in events.iter().filter(|event| event.message.is_channel_message()) {
      self.send(&event.message, at.wall_time_of(event.timestamp_ms));
    }
  }

  fn flush(&mut self) {
    debug!("Clearing the MIDI output");
    self.output.clear();
  }

  /// Resends the programs in effect at the new position
  fn restore(&mut self, preceding: &[TimedEvent], at: &DispatchTime) {
    let mut programs: BTreeMap<U4, U7> = BTreeMap::new();
    for event in preceding.iter() {
      if let Message::ProgramChange { channel, value } = event.message {
        programs.insert(channel, value);
      }
    }
    for (channel, value) in programs {
      self.send(&Message::ProgramChange { channel, value }, at.wall_ms);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  use crate::midi::MetaEvent;

  #[derive(Default)]
  pub struct RecordingOutput {
    sent: Vec<(Vec<u8>, f64)>,
    clears: usize,
  }

  impl AudioOutput for RecordingOutput {
    fn send(&mut self, data: &[u8], timestamp_ms: f64) {
      self.sent.push((data.to_vec(), timestamp_ms));
    }

    fn clear(&mut self) {
      self.clears += 1;
    }
  }

  fn event(timestamp_ms: f64, message: Message) -> TimedEvent {
    TimedEvent {
      timestamp_ms,
      track: 0,
      message,
    }
  }

  fn at(position_ms: f64, wall_ms: f64, velocity: f64) -> DispatchTime {
    DispatchTime {
      position_ms,
      wall_ms,
      audio_time: 0.0,
      velocity,
    }
  }

  #[test]
  pub fn sends_channel_messages_with_wall_time() {
    let mut dispatcher = MidiOutputDispatcher::new(RecordingOutput::default());
    dispatcher.dispatch(
      &[
        event(
          1000.0,
          Message::NoteOn {
            channel: 0,
            key: 0x3c,
            velocity: 0x64,
          },
        ),
        event(1000.0, Message::Meta(MetaEvent::Marker("Measure:1".into()))),
        event(
          1200.0,
          Message::NoteOff {
            channel: 0,
            key: 0x3c,
            velocity: 0x40,
          },
        ),
      ],
      &at(1000.0, 5000.0, 2.0),
    );
    assert_eq!(
      dispatcher.output().sent,
      vec![
        (vec![0x90, 0x3c, 0x64], 5000.0),
        (vec![0x80, 0x3c, 0x40], 5100.0)
      ]
    );
  }

  #[test]
  pub fn flush_clears_output() {
    let mut dispatcher = MidiOutputDispatcher::new(RecordingOutput::default());
    dispatcher.flush();
    assert_eq!(dispatcher.output().clears, 1);
  }

  #[test]
  pub fn restore_sends_latest_programs() {
    let mut dispatcher = MidiOutputDispatcher::new(RecordingOutput::default());
    dispatcher.restore(
      &[
        event(
          0.0,
          Message::ProgramChange {
            channel: 1,
            value: 5,
          },
        ),
        event(
          0.0,
          Message::ProgramChange {
            channel: 0,
            value: 3,
          },
        ),
        event(
          10.0,
          Message::ProgramChange {
            channel: 1,
            value: 6,
          },
        ),
      ],
      &at(500.0, 42.0, 1.0),
    );
    assert_eq!(
      dispatcher.output().sent,
      vec![(vec![0xc0, 3], 42.0), (vec![0xc1, 6], 42.0)]
    );
  }
}
