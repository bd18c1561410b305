pub mod decoder;
pub mod encoder;
pub mod error;
pub mod file;
pub mod messages;
pub mod sequence;
pub mod types;

pub use decoder::{decode_message, Decoder};
pub use encoder::Encoder;
pub use error::CodecError;
pub use file::{Division, Format, MidiFile};
pub use messages::{Event, Message, MetaEvent};
pub use sequence::{Sequence, TimedEvent};
