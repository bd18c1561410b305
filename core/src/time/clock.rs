pub type UnitType = u64;
pub const UNITS_PER_SECOND: UnitType = 1_000_000_000;
pub const UNITS_PER_MILLI: UnitType = UNITS_PER_SECOND / 1000;

/// Nanosecond resolution time of the manual clock
#[derive(Debug, PartialOrd, PartialEq, Clone, Copy)]
pub struct ClockTime(UnitType);

impl ClockTime {
  pub fn new(units: UnitType) -> ClockTime {
    ClockTime(units)
  }

  /// Negative values clamp to zero
  pub fn from_millis(millis: f64) -> ClockTime {
    ClockTime((millis.max(0.0) * UNITS_PER_MILLI as f64).round() as UnitType)
  }

  pub fn units(&self) -> UnitType {
    self.0
  }

  pub fn to_seconds(&self) -> f64 {
    self.0 as f64 / UNITS_PER_SECOND as f64
  }

  pub fn to_millis(&self) -> f64 {
    self.0 as f64 / UNITS_PER_MILLI as f64
  }
}

#[cfg(test)]
mod test {
  use super::ClockTime;

  #[test]
  pub fn clock_time_millis() {
    let time = ClockTime::from_millis(520.833);
    assert_eq!(time.units(), 520_833_000);
    assert_eq!(time.to_millis(), 520.833);
    assert_eq!(time.to_seconds(), 0.520833);
    assert_eq!(ClockTime::from_millis(-3.0), ClockTime::new(0));
  }
}
