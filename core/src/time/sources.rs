use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::time::ClockTime;

/// Wall-clock time driving the visual transport, in milliseconds
pub trait WallClock {
  fn now_ms(&self) -> f64;
}

/// Independent time base used to schedule sound, in seconds
pub trait AudioClock: Send + Sync {
  fn now(&self) -> f64;
}

impl<T: WallClock + ?Sized> WallClock for Arc<T> {
  fn now_ms(&self) -> f64 {
    (**self).now_ms()
  }
}

impl<T: AudioClock + ?Sized> AudioClock for Arc<T> {
  fn now(&self) -> f64 {
    (**self).now()
  }
}

/// Monotonic clock measured from its creation
pub struct SystemClock {
  origin: Instant,
}

impl SystemClock {
  pub fn new() -> SystemClock {
    SystemClock {
      origin: Instant::now(),
    }
  }
}

impl Default for SystemClock {
  fn default() -> Self {
    SystemClock::new()
  }
}

impl WallClock for SystemClock {
  fn now_ms(&self) -> f64 {
    self.origin.elapsed().as_secs_f64() * 1000.0
  }
}

impl AudioClock for SystemClock {
  fn now(&self) -> f64 {
    self.origin.elapsed().as_secs_f64()
  }
}

/// Clock moved explicitly, for offline rendering and tests
pub struct ManualClock {
  units: AtomicU64,
}

impl ManualClock {
  pub fn new() -> ManualClock {
    ManualClock {
      units: AtomicU64::new(0),
    }
  }

  pub fn set_ms(&self, millis: f64) {
    self
      .units
      .store(ClockTime::from_millis(millis).units(), Ordering::SeqCst);
  }

  pub fn advance_ms(&self, millis: f64) {
    let delta = ClockTime::from_millis(millis).units();
    self.units.fetch_add(delta, Ordering::SeqCst);
  }

  pub fn time(&self) -> ClockTime {
    ClockTime::new(self.units.load(Ordering::SeqCst))
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    ManualClock::new()
  }
}

impl WallClock for ManualClock {
  fn now_ms(&self) -> f64 {
    self.time().to_millis()
  }
}

impl AudioClock for ManualClock {
  fn now(&self) -> f64 {
    self.time().to_seconds()
  }
}

#[cfg(test)]
mod test {

  use super::*;

  #[test]
  pub fn manual_clock() {
    let clock = ManualClock::new();
    clock.set_ms(100.0);
    clock.advance_ms(20.5);
    assert_eq!(clock.now_ms(), 120.5);
    assert_eq!(AudioClock::now(&clock), 0.1205);
  }
}
