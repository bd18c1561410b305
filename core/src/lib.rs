pub mod collaborators;
pub mod config;
pub mod midi;
pub mod output;
pub mod player;
pub mod scheduler;
pub mod sync;
pub mod time;
pub mod timemap;
pub mod transport;

pub use crate::player::{Player, PlayerError};
