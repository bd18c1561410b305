use failure::Fail;
use log::debug;

/// Loop the piece forever
pub const REPEAT_FOREVER: i32 = -1;

const DEFAULT_VELOCITY: f64 = 1.0;

#[derive(Debug, Fail, PartialEq)]
pub enum ClockMisuse {
  #[fail(display = "The transport is already playing")]
  AlreadyPlaying,

  #[fail(display = "The transport is not playing")]
  NotPlaying,

  #[fail(display = "Invalid velocity {}", velocity)]
  InvalidVelocity { velocity: f64 },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TransportState {
  Stopped,
  Playing,
  Paused,
}

/// What happened when the clock reached the end of the piece
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ClockEvent {
  None,
  Looped,
  Ended,
}

/// The single authoritative playback clock.
///
/// The musical position is never accumulated tick by tick: it is always
/// derived from an anchor (wall-clock time and position at the last
/// discontinuity) and the velocity, so pausing, seeking or changing velocity
/// only moves the anchor. All times are milliseconds.
pub struct PlaybackClock {
  state: TransportState,

  anchor_time: f64,
  anchor_position: f64,
  velocity: f64,

  total_duration: Option<f64>,

  repeat: i32,
  remaining_repeats: i32,
}

impl PlaybackClock {
  pub fn new(total_duration: Option<f64>) -> Self {
    PlaybackClock {
      state: TransportState::Stopped,
      anchor_time: 0.0,
      anchor_position: 0.0,
      velocity: DEFAULT_VELOCITY,
      total_duration,
      repeat: 0,
      remaining_repeats: 0,
    }
  }

  pub fn state(&self) -> TransportState {
    self.state
  }

  pub fn is_playing(&self) -> bool {
    self.state == TransportState::Playing
  }

  pub fn velocity(&self) -> f64 {
    self.velocity
  }

  pub fn total_duration(&self) -> Option<f64> {
    self.total_duration
  }

  pub fn set_total_duration(&mut self, total_duration: Option<f64>) {
    self.total_duration = total_duration;
  }

  /// Number of times the piece restarts once finished, `REPEAT_FOREVER` to loop
  pub fn set_repeat(&mut self, repeat: i32) {
    self.repeat = repeat.max(REPEAT_FOREVER);
    self.remaining_repeats = self.repeat;
  }

  pub fn remaining_repeats(&self) -> i32 {
    self.remaining_repeats
  }

  pub fn play(&mut self, now: f64) -> Result<(), ClockMisuse> {
    match self.state {
      TransportState::Playing => Err(ClockMisuse::AlreadyPlaying),
      TransportState::Stopped => {
        self.anchor(now, 0.0);
        self.transition(TransportState::Playing);
        Ok(())
      }
      TransportState::Paused => {
        let position = self.anchor_position;
        self.anchor(now, position);
        self.transition(TransportState::Playing);
        Ok(())
      }
    }
  }

  pub fn pause(&mut self, now: f64) -> Result<(), ClockMisuse> {
    if self.state != TransportState::Playing {
      return Err(ClockMisuse::NotPlaying);
    }
    let position = self.position(now);
    self.anchor(now, position);
    self.transition(TransportState::Paused);
    Ok(())
  }

  pub fn rewind(&mut self) {
    self.anchor_time = 0.0;
    self.anchor_position = 0.0;
    self.remaining_repeats = self.repeat;
    self.transition(TransportState::Stopped);
  }

  /// Moves to `position`. A stopped clock becomes paused there, so that
  /// the next `play` starts from the requested position.
  pub fn seek(&mut self, position: f64, now: f64) {
    let position = self.clamp(position);
    self.anchor(now, position);
    if self.state == TransportState::Stopped {
      self.transition(TransportState::Paused);
    }
  }

  pub fn set_velocity(&mut self, velocity: f64, now: f64) -> Result<(), ClockMisuse> {
    if !velocity.is_finite() || velocity <= 0.0 {
      return Err(ClockMisuse::InvalidVelocity { velocity });
    }
    let position = self.position(now);
    self.anchor(now, position);
    self.velocity = velocity;
    debug!("Velocity set to {} at {} ms", velocity, position);
    Ok(())
  }

  pub fn position(&self, now: f64) -> f64 {
    match self.state {
      TransportState::Playing => self.clamp(self.advanced(now)),
      _ => self.anchor_position,
    }
  }

  /// Applies the end of piece rules. Call on every tick while playing.
  pub fn tick(&mut self, now: f64) -> ClockEvent {
    let total = match self.total_duration {
      Some(total) if self.state == TransportState::Playing => total,
      _ => return ClockEvent::None,
    };
    if self.position(now) < total {
      return ClockEvent::None;
    }
    if self.remaining_repeats == 0 {
      debug!("End of the piece reached");
      self.rewind();
      ClockEvent::Ended
    } else {
      if self.remaining_repeats > 0 {
        self.remaining_repeats -= 1;
      }
      debug!(
        "Looping to the start, {} repeats remaining",
        self.remaining_repeats
      );
      let overshoot = (self.advanced(now) - total).max(0.0).min(total);
      self.anchor(now, overshoot);
      ClockEvent::Looped
    }
  }

  fn advanced(&self, now: f64) -> f64 {
    self.anchor_position + (now - self.anchor_time) * self.velocity
  }

  fn anchor(&mut self, now: f64, position: f64) {
    self.anchor_time = now;
    self.anchor_position = position;
  }

  fn clamp(&self, position: f64) -> f64 {
    let position = position.max(0.0);
    match self.total_duration {
      Some(total) => position.min(total),
      None => position,
    }
  }

  fn transition(&mut self, state: TransportState) {
    if self.state != state {
      debug!("Transport {:?} -> {:?}", self.state, state);
      self.state = state;
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  pub fn play_from_stopped_starts_at_zero() {
    let mut clock = PlaybackClock::new(Some(10_000.0));
    assert_eq!(clock.play(1000.0), Ok(()));
    assert_eq!(clock.position(1000.0), 0.0);
    assert_eq!(clock.position(1500.0), 500.0);
  }

  #[test]
  pub fn play_twice_is_a_misuse() {
    let mut clock = PlaybackClock::new(None);
    clock.play(0.0).unwrap();
    assert_eq!(clock.play(100.0), Err(ClockMisuse::AlreadyPlaying));
    assert_eq!(clock.position(200.0), 200.0);
  }

  #[test]
  pub fn pause_requires_playing() {
    let mut clock = PlaybackClock::new(None);
    assert_eq!(clock.pause(0.0), Err(ClockMisuse::NotPlaying));
    assert_eq!(clock.state(), TransportState::Stopped);
  }

  #[test]
  pub fn pause_then_play_resumes() {
    let mut clock = PlaybackClock::new(Some(60_000.0));
    clock.play(0.0).unwrap();
    clock.pause(1234.0).unwrap();
    assert_eq!(clock.position(50_000.0), 1234.0);
    clock.play(90_000.0).unwrap();
    assert!((clock.position(90_000.0) - 1234.0).abs() <= 1.0);
    assert!((clock.position(90_100.0) - 1334.0).abs() <= 1.0);
  }

  #[test]
  pub fn velocity_change_does_not_jump() {
    let mut clock = PlaybackClock::new(None);
    clock.play(0.0).unwrap();
    let before = clock.position(1000.0);
    clock.set_velocity(2.0, 1000.0).unwrap();
    assert_eq!(clock.position(1000.0), before);
    assert_eq!(clock.position(1500.0), before + 1000.0);
  }

  #[test]
  pub fn invalid_velocity() {
    let mut clock = PlaybackClock::new(None);
    assert_eq!(
      clock.set_velocity(0.0, 0.0),
      Err(ClockMisuse::InvalidVelocity { velocity: 0.0 })
    );
    assert!(clock.set_velocity(std::f64::NAN, 0.0).is_err());
    assert_eq!(clock.velocity(), 1.0);
  }

  #[test]
  pub fn rewind_always_succeeds() {
    let mut clock = PlaybackClock::new(None);
    clock.rewind();
    clock.play(0.0).unwrap();
    clock.rewind();
    assert_eq!(clock.state(), TransportState::Stopped);
    assert_eq!(clock.position(5000.0), 0.0);
  }

  #[test]
  pub fn position_is_clamped() {
    let mut clock = PlaybackClock::new(Some(1000.0));
    clock.play(0.0).unwrap();
    assert_eq!(clock.position(5000.0), 1000.0);
    clock.seek(-50.0, 5000.0);
    assert_eq!(clock.position(5000.0), 0.0);
  }

  #[test]
  pub fn seek_while_stopped_pauses_at_position() {
    let mut clock = PlaybackClock::new(Some(10_000.0));
    clock.seek(4000.0, 100.0);
    assert_eq!(clock.state(), TransportState::Paused);
    clock.play(200.0).unwrap();
    assert_eq!(clock.position(300.0), 4100.0);
  }

  #[test]
  pub fn end_without_repeat_stops() {
    let mut clock = PlaybackClock::new(Some(1000.0));
    clock.play(0.0).unwrap();
    assert_eq!(clock.tick(999.0), ClockEvent::None);
    assert_eq!(clock.tick(1000.0), ClockEvent::Ended);
    assert_eq!(clock.state(), TransportState::Stopped);
    assert_eq!(clock.position(2000.0), 0.0);
  }

  #[test]
  pub fn repeat_counts_down() {
    let mut clock = PlaybackClock::new(Some(1000.0));
    clock.set_repeat(1);
    clock.play(0.0).unwrap();
    assert_eq!(clock.tick(1000.0), ClockEvent::Looped);
    assert_eq!(clock.position(1250.0), 250.0);
    assert_eq!(clock.remaining_repeats(), 0);
    assert_eq!(clock.tick(2000.0), ClockEvent::Ended);
    clock.play(3000.0).unwrap();
    assert_eq!(clock.remaining_repeats(), 1);
  }

  #[test]
  pub fn repeat_forever() {
    let mut clock = PlaybackClock::new(Some(1000.0));
    clock.set_repeat(REPEAT_FOREVER);
    clock.play(0.0).unwrap();
    for lap in 1..10 {
      assert_eq!(clock.tick(f64::from(lap) * 1000.0), ClockEvent::Looped);
    }
    assert_eq!(clock.remaining_repeats(), REPEAT_FOREVER);
  }

  #[test]
  pub fn looping_keeps_the_overshoot() {
    let mut clock = PlaybackClock::new(Some(1000.0));
    clock.set_repeat(REPEAT_FOREVER);
    clock.play(0.0).unwrap();
    clock.set_velocity(2.0, 0.0).unwrap();
    assert_eq!(clock.tick(530.0), ClockEvent::Looped);
    assert_eq!(clock.position(530.0), 60.0);
    assert_eq!(clock.position(540.0), 80.0);
    assert_eq!(clock.tick(1000.0), ClockEvent::Looped);
    assert_eq!(clock.position(1000.0), 0.0);
  }
}
