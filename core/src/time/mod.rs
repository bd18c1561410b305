pub mod clock;
pub mod sources;
pub mod tempo;

pub use self::clock::ClockTime;
pub use self::sources::{AudioClock, ManualClock, SystemClock, WallClock};
pub use self::tempo::Tempo;
