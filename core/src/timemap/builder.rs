use log::{debug, warn};

use crate::midi::{MetaEvent, Message, MidiFile};
use crate::time::Tempo;
use crate::timemap::{Timemap, TimemapEntry, TimemapError};

const MEASURE_MARKER_PREFIX: &str = "measure:";

/// Collects timemap entries from a converter or from MIDI markers.
///
/// `close` is the only way to obtain a `Timemap`, so every timemap went
/// through the monotonicity check and got its closing duration.
#[derive(Debug)]
pub struct TimemapBuilder {
  entries: Vec<TimemapEntry>,
}

impl TimemapBuilder {
  /// Takes the measure onsets computed by a converter. Durations always follow
  /// the next onset, so only the last measure keeps a supplied one.
  pub fn from_external(entries: Vec<TimemapEntry>) -> Result<TimemapBuilder, TimemapError> {
    for (index, pair) in entries.windows(2).enumerate() {
      if pair[1].timestamp < pair[0].timestamp {
        return Err(TimemapError::NonMonotonic {
          index: index + 1,
          previous: pair[0].timestamp,
          timestamp: pair[1].timestamp,
        });
      }
    }
    let mut builder = TimemapBuilder { entries };
    builder.backfill_durations();
    Ok(builder)
  }

  /// Parses the `[{"measure": 0, "timestamp": 0}, ...]` exchange format
  pub fn from_json(json: &str) -> Result<TimemapBuilder, TimemapError> {
    let entries: Vec<TimemapEntry> =
      serde_json::from_str(json).map_err(|err| TimemapError::InvalidDocument {
        cause: err.to_string(),
      })?;
    Self::from_external(entries)
  }

  /// Derives measure onsets from the `Measure:<N>` markers of the first track
  pub fn from_markers(file: &MidiFile) -> TimemapBuilder {
    let division = file.division();
    let mut tempo = Tempo::default();
    let mut micros = 0f64;
    let mut entries: Vec<TimemapEntry> = Vec::new();

    for event in file.track(0).unwrap_or(&[]).iter() {
      micros += division.ticks_to_micros(u64::from(event.delta), tempo.micros_per_quarter());
      match &event.message {
        Message::Meta(MetaEvent::SetTempo { micros_per_quarter }) => {
          tempo = Tempo::new(*micros_per_quarter);
          debug!("Tempo {:.2} bpm at {} ms", tempo.bpm(), micros.round() / 1000.0);
        }
        Message::Meta(MetaEvent::Marker(text)) => {
          if let Some(measure) = parse_measure_marker(text) {
            let timestamp = micros.round() / 1000.0;
            if let Some(previous) = entries.last_mut() {
              previous.duration = Some(timestamp - previous.timestamp);
            }
            entries.push(TimemapEntry::new(measure, timestamp));
          } else {
            debug!("Ignoring marker {:?}", text);
          }
        }
        _ => {}
      }
    }

    if entries.is_empty() {
      warn!("No measure markers found, the cursor will only follow measure indices");
    }

    TimemapBuilder { entries }
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Sets the duration of the last measure from the total duration of the score.
  /// Without a total duration the last measure keeps an unknown duration.
  pub fn close(mut self, total_duration_ms: Option<f64>) -> Timemap {
    if let (Some(last), Some(total)) = (self.entries.last_mut(), total_duration_ms) {
      let duration = total - last.timestamp;
      if duration < 0.0 {
        warn!(
          "Total duration {} ms ends before the last measure onset {} ms",
          total, last.timestamp
        );
      }
      last.duration = Some(duration.max(0.0));
    }
    Timemap::from_entries(self.entries)
  }

  fn backfill_durations(&mut self) {
    let onsets: Vec<f64> = self.entries.iter().map(|entry| entry.timestamp).collect();
    for (entry, next_onset) in self.entries.iter_mut().zip(onsets.iter().skip(1)) {
      let duration = next_onset - entry.timestamp;
      if let Some(supplied) = entry.duration {
        if supplied != duration {
          debug!(
            "Measure {} lasts {} ms until the next onset, not {} ms",
            entry.measure, duration, supplied
          );
        }
      }
      entry.duration = Some(duration);
    }
  }
}

fn parse_measure_marker(text: &str) -> Option<u32> {
  let prefix = text.get(..MEASURE_MARKER_PREFIX.len())?;
  if prefix.eq_ignore_ascii_case(MEASURE_MARKER_PREFIX) {
    text[MEASURE_MARKER_PREFIX.len()..].trim().parse().ok()
  } else {
    None
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::midi::{Division, Event, Format};

  fn marker(delta: u32, text: &str) -> Event {
    Event::new(delta, Message::Meta(MetaEvent::Marker(text.to_string())))
  }

  fn file(track: Vec<Event>) -> MidiFile {
    MidiFile::new(Format::Simultaneous, Division::TicksPerQuarter(480), vec![track])
  }

  #[test]
  pub fn markers_at_120_bpm() {
    let builder = TimemapBuilder::from_markers(&file(vec![
      marker(0, "Measure:0"),
      marker(1920, "Measure:1"),
    ]));
    let map = builder.close(None);
    assert_eq!(map.len(), 2);
    assert_eq!(map.entries()[0].timestamp, 0.0);
    assert_eq!(map.entries()[0].duration, Some(2000.0));
    assert_eq!(map.entries()[1].timestamp, 2000.0);
    assert_eq!(map.entries()[1].duration, None);
  }

  #[test]
  pub fn markers_follow_tempo_changes() {
    let map = TimemapBuilder::from_markers(&file(vec![
      marker(0, "measure: 0"),
      Event::new(
        0,
        Message::Meta(MetaEvent::SetTempo {
          micros_per_quarter: 1_000_000,
        }),
      ),
      marker(1920, "MEASURE:1"),
      marker(960, "Rehearsal A"),
      marker(960, "Measure:2"),
    ]))
    .close(Some(10_000.0));
    let onsets: Vec<(u32, f64, Option<f64>)> = map
      .entries()
      .iter()
      .map(|entry| (entry.measure, entry.timestamp, entry.duration))
      .collect();
    assert_eq!(
      onsets,
      vec![
        (0, 0.0, Some(4000.0)),
        (1, 4000.0, Some(4000.0)),
        (2, 8000.0, Some(2000.0))
      ]
    );
  }

  #[test]
  pub fn marker_timestamps_are_rounded_to_microseconds() {
    let map = TimemapBuilder::from_markers(&file(vec![
      marker(0, "Measure:0"),
      marker(500, "Measure:1"),
    ]))
    .close(None);
    assert_eq!(map.entries()[1].timestamp, 520.833);
  }

  #[test]
  pub fn no_markers_is_empty() {
    let builder = TimemapBuilder::from_markers(&file(vec![Event::new(
      0,
      Message::Meta(MetaEvent::EndOfTrack),
    )]));
    assert!(builder.is_empty());
    assert!(builder.close(Some(1000.0)).is_empty());
  }

  #[test]
  pub fn external_must_be_monotonic() {
    let entries = vec![
      TimemapEntry::new(0, 0.0),
      TimemapEntry::new(1, 2000.0),
      TimemapEntry::new(2, 1500.0),
    ];
    assert_eq!(
      TimemapBuilder::from_external(entries).unwrap_err(),
      TimemapError::NonMonotonic {
        index: 2,
        previous: 2000.0,
        timestamp: 1500.0
      }
    );
  }

  #[test]
  pub fn closing_duration() {
    let entries = vec![TimemapEntry::new(0, 0.0), TimemapEntry::new(1, 1750.25)];
    let map = TimemapBuilder::from_external(entries)
      .unwrap()
      .close(Some(3500.5));
    assert_eq!(map.entries()[0].duration, Some(1750.25));
    assert_eq!(map.entries()[1].duration, Some(3500.5 - 1750.25));
  }

  #[test]
  pub fn external_durations_follow_onsets() {
    let mut first = TimemapEntry::new(0, 0.0);
    first.duration = Some(1900.0);
    let mut last = TimemapEntry::new(1, 2000.0);
    last.duration = Some(1500.0);
    let map = TimemapBuilder::from_external(vec![first, last])
      .unwrap()
      .close(Some(4000.0));
    assert_eq!(map.entries()[0].duration, Some(2000.0));
    assert_eq!(map.entries()[1].duration, Some(2000.0));
  }

  #[test]
  pub fn invalid_json() {
    match TimemapBuilder::from_json("{\"measure\": 1}") {
      Err(TimemapError::InvalidDocument { .. }) => {}
      other => panic!("unexpected result {:?}", other),
    }
  }

  #[test]
  pub fn marker_parsing() {
    assert_eq!(parse_measure_marker("Measure:12"), Some(12));
    assert_eq!(parse_measure_marker("mEaSuRe: 3 "), Some(3));
    assert_eq!(parse_measure_marker("Measure:x"), None);
    assert_eq!(parse_measure_marker("Meas"), None);
    assert_eq!(parse_measure_marker("Tempo:120"), None);
  }
}
