pub type U4 = u8;
pub type U7 = u8;
pub type U14 = u16;
pub type U24 = u32;

pub const PITCH_BEND_CENTER: U14 = 8192;
