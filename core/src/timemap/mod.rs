pub mod builder;

pub use self::builder::TimemapBuilder;

use failure::Fail;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Fail, PartialEq)]
pub enum TimemapError {
  #[fail(
    display = "Timemap entry {} at {} ms starts before the previous entry at {} ms",
    index, timestamp, previous
  )]
  NonMonotonic {
    index: usize,
    previous: f64,
    timestamp: f64,
  },

  #[fail(display = "Invalid timemap document: {}", cause)]
  InvalidDocument { cause: String },
}

/// Onset and duration of one measure, in milliseconds
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct TimemapEntry {
  pub measure: u32,
  pub timestamp: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<f64>,
}

impl TimemapEntry {
  pub fn new(measure: u32, timestamp: f64) -> TimemapEntry {
    TimemapEntry {
      measure,
      timestamp,
      duration: None,
    }
  }
}

/// Where the playback is, relative to the measures of the score
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PlaybackPosition {
  /// Index of the timemap entry the position falls in
  pub entry: usize,
  pub measure_index: u32,
  pub measure_start_ms: f64,
  pub measure_offset_ms: f64,
  pub measure_duration_ms: Option<f64>,
}

/// Ordered measure onsets. Only built through `TimemapBuilder`, immutable afterwards.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Timemap {
  entries: Vec<TimemapEntry>,
}

impl Timemap {
  pub(crate) fn from_entries(entries: Vec<TimemapEntry>) -> Timemap {
    Timemap { entries }
  }

  pub fn entries(&self) -> &[TimemapEntry] {
    self.entries.as_slice()
  }

  pub fn entry(&self, index: usize) -> Option<&TimemapEntry> {
    self.entries.get(index)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Index of the nearest entry at or before `timestamp`.
  ///
  /// Entries sharing the same onset resolve to the earliest of them. Timestamps
  /// before the first or after the last entry clamp to the ends, so the result
  /// is always a valid index; `None` only for an empty timemap.
  pub fn measure_at(&self, timestamp: f64) -> Option<usize> {
    if self.entries.is_empty() {
      return None;
    }
    let after = self
      .entries
      .partition_point(|entry| entry.timestamp <= timestamp);
    if after == 0 {
      return Some(0);
    }
    let onset = self.entries[after - 1].timestamp;
    Some(self.entries.partition_point(|entry| entry.timestamp < onset))
  }

  pub fn position_at(&self, timestamp: f64) -> Option<PlaybackPosition> {
    self.measure_at(timestamp).map(|index| {
      let entry = &self.entries[index];
      PlaybackPosition {
        entry: index,
        measure_index: entry.measure,
        measure_start_ms: entry.timestamp,
        measure_offset_ms: (timestamp - entry.timestamp).max(0.0),
        measure_duration_ms: entry.duration,
      }
    })
  }

  /// Timestamp of `offset_ms` into the first occurrence of `measure`
  pub fn timestamp_of(&self, measure: u32, offset_ms: f64) -> Option<f64> {
    self
      .entries
      .iter()
      .find(|entry| entry.measure == measure)
      .map(|entry| {
        let offset = offset_ms.max(0.0);
        let offset = entry.duration.map_or(offset, |duration| offset.min(duration));
        entry.timestamp + offset
      })
  }

  /// End of the last measure, when its duration is known
  pub fn total_duration_ms(&self) -> Option<f64> {
    self
      .entries
      .last()
      .and_then(|entry| entry.duration.map(|duration| entry.timestamp + duration))
  }

  pub fn to_json(&self) -> String {
    serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn timemap(onsets: &[(u32, f64)]) -> Timemap {
    let entries = onsets
      .iter()
      .map(|(measure, timestamp)| TimemapEntry::new(*measure, *timestamp))
      .collect();
    TimemapBuilder::from_external(entries)
      .unwrap()
      .close(Some(8000.0))
  }

  #[test]
  pub fn measure_at_nearest_below() {
    let map = timemap(&[(0, 0.0), (1, 2000.0), (2, 4000.0), (3, 6000.0)]);
    assert_eq!(map.measure_at(0.0), Some(0));
    assert_eq!(map.measure_at(1999.9), Some(0));
    assert_eq!(map.measure_at(2000.0), Some(1));
    assert_eq!(map.measure_at(5000.0), Some(2));
  }

  #[test]
  pub fn measure_at_is_clamped() {
    let map = timemap(&[(0, 500.0), (1, 2000.0)]);
    assert_eq!(map.measure_at(-10.0), Some(0));
    assert_eq!(map.measure_at(100.0), Some(0));
    assert_eq!(map.measure_at(1_000_000.0), Some(1));
    assert_eq!(Timemap::default().measure_at(0.0), None);
  }

  #[test]
  pub fn measure_at_ties_resolve_to_earlier_entry() {
    let map = timemap(&[(0, 0.0), (1, 2000.0), (2, 2000.0), (3, 4000.0)]);
    assert_eq!(map.measure_at(2000.0), Some(1));
    assert_eq!(map.measure_at(3000.0), Some(1));
  }

  #[test]
  pub fn measure_at_stays_in_bounds() {
    let map = timemap(&[(0, 0.0), (1, 250.0), (2, 250.0), (3, 900.0), (4, 7000.0)]);
    let mut timestamp = -1000.0;
    while timestamp < 10_000.0 {
      let index = map.measure_at(timestamp).unwrap();
      assert!(index < map.len());
      timestamp += 37.0;
    }
  }

  #[test]
  pub fn position_at() {
    let map = timemap(&[(0, 0.0), (1, 2000.0), (2, 4000.0)]);
    assert_eq!(
      map.position_at(2500.0),
      Some(PlaybackPosition {
        entry: 1,
        measure_index: 1,
        measure_start_ms: 2000.0,
        measure_offset_ms: 500.0,
        measure_duration_ms: Some(2000.0),
      })
    );
    assert_eq!(map.position_at(9000.0).unwrap().measure_duration_ms, Some(4000.0));
  }

  #[test]
  pub fn timestamp_of_measure() {
    let map = timemap(&[(0, 0.0), (1, 2000.0), (2, 4000.0), (1, 6000.0)]);
    assert_eq!(map.timestamp_of(1, 250.0), Some(2250.0));
    assert_eq!(map.timestamp_of(1, 5000.0), Some(4000.0));
    assert_eq!(map.timestamp_of(7, 0.0), None);
    assert_eq!(map.total_duration_ms(), Some(8000.0));
  }

  #[test]
  pub fn json_shape() {
    let map = TimemapBuilder::from_json(r#"[{"measure":0,"timestamp":0},{"measure":1,"timestamp":1500.5}]"#)
      .unwrap()
      .close(None);
    assert_eq!(
      map.to_json(),
      r#"[{"measure":0,"timestamp":0.0,"duration":1500.5},{"measure":1,"timestamp":1500.5}]"#
    );
  }
}
