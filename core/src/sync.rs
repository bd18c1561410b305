use std::sync::Arc;

use log::trace;

use crate::collaborators::Renderer;
use crate::timemap::{PlaybackPosition, Timemap};

/// Keeps the renderer cursor on the playback position
pub struct SyncCoordinator {
  timemap: Arc<Timemap>,
  renderer: Box<dyn Renderer>,
  last: Option<(u32, usize)>,
}

impl SyncCoordinator {
  pub fn new(timemap: Arc<Timemap>, renderer: Box<dyn Renderer>) -> SyncCoordinator {
    SyncCoordinator {
      timemap,
      renderer,
      last: None,
    }
  }

  pub fn timemap(&self) -> &Timemap {
    &self.timemap
  }

  pub fn set_timemap(&mut self, timemap: Arc<Timemap>) {
    self.timemap = timemap;
    self.last = None;
  }

  pub fn renderer_mut(&mut self) -> &mut dyn Renderer {
    self.renderer.as_mut()
  }

  /// Measure position for `position_ms`. Without a timemap everything falls
  /// in measure 0.
  pub fn position_at(&self, position_ms: f64) -> PlaybackPosition {
    self
      .timemap
      .position_at(position_ms)
      .unwrap_or(PlaybackPosition {
        entry: 0,
        measure_index: 0,
        measure_start_ms: 0.0,
        measure_offset_ms: position_ms.max(0.0),
        measure_duration_ms: None,
      })
  }

  /// Forwards the position to the renderer unless it is in the same measure
  /// as the previous call. Returns the position when it was forwarded.
  pub fn move_to(&mut self, position_ms: f64, force: bool) -> Option<PlaybackPosition> {
    let position = self.position_at(position_ms);
    let key = (position.measure_index, position.entry);
    if !force && self.last == Some(key) {
      return None;
    }
    trace!(
      "Cursor to measure {} (+{:.1} ms)",
      position.measure_index,
      position.measure_offset_ms
    );
    self.last = Some(key);
    self.renderer.seek(&position);
    Some(position)
  }

  pub fn resize(&mut self) {
    self.renderer.resize();
  }
}
