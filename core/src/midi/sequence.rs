use crate::midi::file::MidiFile;
use crate::midi::messages::{Message, MetaEvent};
use crate::time::Tempo;

/// A message placed on the absolute timeline of the whole file
#[derive(Debug, PartialEq, Clone)]
pub struct TimedEvent {
  pub timestamp_ms: f64,
  pub track: usize,
  pub message: Message,
}

/// All the events of a MIDI file merged into a single list ordered by timestamp.
pub struct Sequence {
  events: Vec<TimedEvent>,
  duration_ms: f64,
}

struct TickEvent<'a> {
  ticks: u64,
  track: usize,
  message: &'a Message,
}

impl Sequence {
  pub fn from_file(file: &MidiFile) -> Sequence {
    let mut tick_events = Vec::new();
    for (track, events) in file.tracks().iter().enumerate() {
      let mut ticks = 0u64;
      for event in events.iter() {
        ticks += u64::from(event.delta);
        tick_events.push(TickEvent {
          ticks,
          track,
          message: &event.message,
        });
      }
    }
    // stable, so the order inside a track and between tracks at the same tick is kept
    tick_events.sort_by_key(|event| event.ticks);

    let division = file.division();
    let mut tempo = Tempo::default();
    let mut last_ticks = 0u64;
    let mut micros = 0f64;
    let mut events = Vec::with_capacity(tick_events.len());
    for event in tick_events {
      micros += division.ticks_to_micros(event.ticks - last_ticks, tempo.micros_per_quarter());
      last_ticks = event.ticks;

      if let Message::Meta(MetaEvent::SetTempo { micros_per_quarter }) = event.message {
        tempo = Tempo::new(*micros_per_quarter);
      }

      events.push(TimedEvent {
        timestamp_ms: micros.round() / 1000.0,
        track: event.track,
        message: event.message.clone(),
      });
    }

    let duration_ms = events.last().map_or(0.0, |event| event.timestamp_ms);

    Sequence {
      events,
      duration_ms,
    }
  }

  pub fn events(&self) -> &[TimedEvent] {
    self.events.as_slice()
  }

  /// Time of the last event, usually the latest end of track
  pub fn duration_ms(&self) -> f64 {
    self.duration_ms
  }

  /// Events with `from_ms <= timestamp < to_ms`
  pub fn window(&self, from_ms: f64, to_ms: f64) -> &[TimedEvent] {
    let start = self.index_at(from_ms);
    let end = self.index_at(to_ms).max(start);
    &self.events[start..end]
  }

  /// Events strictly before `position_ms`
  pub fn before(&self, position_ms: f64) -> &[TimedEvent] {
    &self.events[..self.index_at(position_ms)]
  }

  fn index_at(&self, timestamp_ms: f64) -> usize {
    self
      .events
      .partition_point(|event| event.timestamp_ms < timestamp_ms)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::midi::file::{Division, Format};
  use crate::midi::messages::Event;

  fn note_on(key: u8) -> Message {
    Message::NoteOn {
      channel: 0,
      key,
      velocity: 100,
    }
  }

  #[test]
  pub fn ticks_to_milliseconds() {
    let track = vec![
      Event::new(0, note_on(0x3c)),
      Event::new(
        500,
        Message::NoteOff {
          channel: 0,
          key: 0x3c,
          velocity: 0x40,
        },
      ),
    ];
    let file = MidiFile::new(Format::SingleTrack, Division::TicksPerQuarter(480), vec![track]);
    let sequence = Sequence::from_file(&file);
    let events = sequence.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].timestamp_ms, 0.0);
    assert_eq!(events[1].timestamp_ms - events[0].timestamp_ms, 520.833);
    assert_eq!(sequence.duration_ms(), 520.833);
  }

  #[test]
  pub fn tempo_changes_apply_from_their_position() {
    let conductor = vec![
      Event::new(
        480,
        Message::Meta(MetaEvent::SetTempo {
          micros_per_quarter: 250_000,
        }),
      ),
      Event::new(0, Message::Meta(MetaEvent::EndOfTrack)),
    ];
    let notes = vec![Event::new(480, note_on(60)), Event::new(480, note_on(62))];
    let file = MidiFile::new(
      Format::Simultaneous,
      Division::TicksPerQuarter(480),
      vec![conductor, notes],
    );
    let sequence = Sequence::from_file(&file);
    let timestamps: Vec<(f64, usize)> = sequence
      .events()
      .iter()
      .map(|event| (event.timestamp_ms, event.track))
      .collect();
    assert_eq!(
      timestamps,
      vec![(500.0, 0), (500.0, 0), (500.0, 1), (750.0, 1)]
    );
  }

  #[test]
  pub fn window_and_before() {
    let track = vec![
      Event::new(0, note_on(60)),
      Event::new(480, note_on(62)),
      Event::new(480, note_on(64)),
    ];
    let file = MidiFile::new(Format::SingleTrack, Division::TicksPerQuarter(480), vec![track]);
    let sequence = Sequence::from_file(&file);
    assert_eq!(sequence.window(0.0, 500.0).len(), 1);
    assert_eq!(sequence.window(500.0, 1000.0 + 1.0).len(), 2);
    assert_eq!(sequence.window(2000.0, 100.0).len(), 0);
    assert_eq!(sequence.before(500.0).len(), 1);
    assert_eq!(sequence.before(500.1).len(), 2);
  }
}
