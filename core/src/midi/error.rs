use failure::Fail;

#[derive(Debug, Fail, PartialEq, Clone)]
pub enum CodecError {
  #[fail(display = "Unexpected end of data at offset {}", offset)]
  UnexpectedEndOfData { offset: usize },

  #[fail(display = "Malformed header: {}", cause)]
  MalformedHeader { cause: String },

  #[fail(display = "Malformed track {}: {}", index, cause)]
  MalformedTrack { index: usize, cause: String },

  /// `meta_type` is set when the status is 0xff and the meta type is unknown
  #[fail(
    display = "Unsupported event type {:#04x} (meta {:?}) at offset {}",
    status, meta_type, offset
  )]
  UnsupportedEventType {
    status: u8,
    meta_type: Option<u8>,
    offset: usize,
  },

  #[fail(display = "Invalid data byte {:#04x} at offset {}", value, offset)]
  InvalidDataByte { value: u8, offset: usize },

  #[fail(display = "Variable length quantity too long at offset {}", offset)]
  InvalidVariableLength { offset: usize },
}
