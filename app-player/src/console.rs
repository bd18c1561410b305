use failure::Error;
use log::{debug, info, trace, warn};

use crossbeam_channel::Sender;

use score_follower_core::collaborators::{Renderer, SeekRequests};
use score_follower_core::output::AudioOutput;
use score_follower_core::scheduler::{Synthesizer, VoiceHandle, VoicePool, VoiceRequest};
use score_follower_core::timemap::PlaybackPosition;

const VOICES: usize = 64;

/// Prints the cursor instead of drawing a score.
///
/// The seek handle is passed on to the console, which plays the part of a
/// user clicking on the score.
pub struct ConsoleRenderer {
  seeks_tx: Sender<SeekRequests>,
}

impl ConsoleRenderer {
  pub fn new(seeks_tx: Sender<SeekRequests>) -> ConsoleRenderer {
    ConsoleRenderer { seeks_tx }
  }
}

impl Renderer for ConsoleRenderer {
  fn initialize(&mut self, score: &[u8], seeks: SeekRequests) -> Result<(), Error> {
    debug!("Console renderer ready for a score of {} bytes", score.len());
    if self.seeks_tx.send(seeks).is_err() {
      warn!("Nobody is listening for seek requests");
    }
    Ok(())
  }

  fn seek(&mut self, position: &PlaybackPosition) {
    match position.measure_duration_ms {
      Some(duration) => info!(
        "Measure {} [{:.0} ms +{:.0}/{:.0}]",
        position.measure_index, position.measure_start_ms, position.measure_offset_ms, duration
      ),
      None => info!(
        "Measure {} [{:.0} ms +{:.0}]",
        position.measure_index, position.measure_start_ms, position.measure_offset_ms
      ),
    }
  }

  fn resize(&mut self) {
    debug!("Nothing to resize on a console");
  }
}

/// Synthesizer that only logs the voices it would play
pub struct LoggingSynth {
  pool: VoicePool,
}

impl LoggingSynth {
  pub fn new() -> LoggingSynth {
    LoggingSynth {
      pool: VoicePool::new(VOICES),
    }
  }
}

impl Synthesizer for LoggingSynth {
  fn enqueue(&mut self, request: &VoiceRequest) -> VoiceHandle {
    let handle = self.pool.acquire();
    debug!(
      "Voice {} on {:?}: key {} velocity {} at {:.3} s ({:+.0} cents)",
      handle.slot(),
      request.instrument,
      request.key,
      request.velocity,
      request.onset,
      request.detune_cents()
    );
    handle
  }

  fn cancel(&mut self, handle: VoiceHandle, at: f64) {
    if self.pool.release(handle) {
      debug!("Voice {} released at {:.3} s", handle.slot(), at);
    }
  }

  fn is_live(&self, handle: VoiceHandle) -> bool {
    self.pool.is_live(handle)
  }
}

/// MIDI output writing the raw messages to the log
#[derive(Default)]
pub struct LoggingOutput;

impl AudioOutput for LoggingOutput {
  fn send(&mut self, data: &[u8], timestamp_ms: f64) {
    trace!("{:.1} ms: {:02x?}", timestamp_ms, data);
  }

  fn clear(&mut self) {
    trace!("MIDI output cleared");
  }
}
