//! Boundaries with the score engines living outside of this crate.

use failure::Error;

use crossbeam_channel::{Receiver, Sender, TryIter};

use crate::timemap::{PlaybackPosition, TimemapEntry};

/// What a converter produces for one score
#[derive(Debug, Clone)]
pub struct Conversion {
  /// Standard MIDI File bytes
  pub midi: Vec<u8>,
  /// Measure onsets when the converter knows them, otherwise the MIDI markers are used
  pub timemap: Option<Vec<TimemapEntry>>,
  /// Total duration of the score from its metadata
  pub duration_ms: Option<f64>,
  pub version: String,
}

/// Turns a score document into MIDI, called once per loaded score
pub trait Converter {
  fn initialize(&mut self, score: &[u8]) -> Result<Conversion, Error>;
}

/// Treats the score document as a Standard MIDI File with `Measure:<N>` markers
#[derive(Debug, Default)]
pub struct MidiFileConverter;

impl Converter for MidiFileConverter {
  fn initialize(&mut self, score: &[u8]) -> Result<Conversion, Error> {
    Ok(Conversion {
      midi: score.to_vec(),
      timemap: None,
      duration_ms: None,
      version: format!("midi-file {}", env!("CARGO_PKG_VERSION")),
    })
  }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SeekRequest {
  Position { position_ms: f64 },
  Measure { measure: u32, offset_ms: f64 },
}

/// Handle given to the renderer to ask for a seek, usually on a click
#[derive(Debug, Clone)]
pub struct SeekRequests {
  tx: Sender<SeekRequest>,
}

impl SeekRequests {
  pub fn channel() -> (SeekRequests, PendingSeeks) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (SeekRequests { tx }, PendingSeeks { rx })
  }

  /// Returns false once the player is gone
  pub fn request(&self, request: SeekRequest) -> bool {
    self.tx.send(request).is_ok()
  }
}

/// Player side of `SeekRequests`
#[derive(Debug)]
pub struct PendingSeeks {
  rx: Receiver<SeekRequest>,
}

impl PendingSeeks {
  pub fn try_iter(&self) -> TryIter<SeekRequest> {
    self.rx.try_iter()
  }
}

/// Draws the score and its cursor
pub trait Renderer {
  fn initialize(&mut self, score: &[u8], seeks: SeekRequests) -> Result<(), Error>;

  fn seek(&mut self, position: &PlaybackPosition);

  fn resize(&mut self);
}
