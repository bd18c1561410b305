const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;
const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Tempo as carried by MIDI set tempo events
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo(u32);

impl Tempo {
  pub fn new(micros_per_quarter: u32) -> Tempo {
    Tempo(micros_per_quarter)
  }

  pub fn micros_per_quarter(&self) -> u32 {
    self.0
  }

  pub fn bpm(&self) -> f64 {
    MICROS_PER_MINUTE / f64::from(self.0.max(1))
  }
}

impl Default for Tempo {
  fn default() -> Tempo {
    Tempo(DEFAULT_MICROS_PER_QUARTER)
  }
}

#[cfg(test)]
mod test {

  use super::Tempo;

  #[test]
  pub fn tempo_default_is_120_bpm() {
    let tempo = Tempo::default();
    assert_eq!(tempo.micros_per_quarter(), 500_000);
    assert_eq!(tempo.bpm(), 120.0);
  }

  #[test]
  pub fn tempo_bpm() {
    assert_eq!(Tempo::new(1_000_000).bpm(), 60.0);
    assert_eq!(Tempo::new(0).bpm(), 60_000_000.0);
  }
}
