use crate::midi::types::{U14, U24, U4, U7};

#[derive(Debug, PartialEq, Clone)]
pub enum MetaEvent {
  SequenceNumber(u16),
  Text(String),
  Copyright(String),
  TrackName(String),
  InstrumentName(String),
  Lyric(String),
  Marker(String),
  CuePoint(String),
  ProgramName(String),
  DeviceName(String),
  /// Text-like meta events in the reserved 0x0A..=0x0F range
  UnknownText { meta_type: u8, text: String },
  ChannelPrefix(U4),
  Port(u8),
  EndOfTrack,
  SetTempo { micros_per_quarter: U24 },
  SmpteOffset {
    hours: u8,
    minutes: u8,
    seconds: u8,
    frames: u8,
    subframes: u8,
  },
  TimeSignature {
    numerator: u8,
    denominator_pow2: u8,
    clocks_per_click: u8,
    notated_32nds_per_quarter: u8,
  },
  KeySignature { sharps_flats: i8, minor: bool },
  SequencerSpecific(Vec<u8>),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Message {
  NoteOff {
    channel: U4,
    key: U7,
    velocity: U7,
  },
  NoteOn {
    channel: U4,
    key: U7,
    velocity: U7,
  },
  PolyphonicKeyPressure {
    channel: U4,
    key: U7,
    value: U7,
  },
  ControlChange {
    channel: U4,
    controller: U7,
    value: U7,
  },
  ProgramChange {
    channel: U4,
    value: U7,
  },
  ChannelPressure {
    channel: U4,
    value: U7,
  },
  PitchBend {
    channel: U4,
    value: U14,
  },
  SysEx {
    data: Vec<u8>,
  },
  SysExEscape {
    data: Vec<u8>,
  },
  Meta(MetaEvent),
}

impl Message {
  pub fn channel(&self) -> Option<U4> {
    match self {
      Message::NoteOff { channel, .. }
      | Message::NoteOn { channel, .. }
      | Message::PolyphonicKeyPressure { channel, .. }
      | Message::ControlChange { channel, .. }
      | Message::ProgramChange { channel, .. }
      | Message::ChannelPressure { channel, .. }
      | Message::PitchBend { channel, .. } => Some(*channel),
      _ => None,
    }
  }

  pub fn is_channel_message(&self) -> bool {
    self.channel().is_some()
  }

  /// Hex representation of a sysex payload, empty for any other message
  pub fn hex(&self) -> String {
    match self {
      Message::SysEx { data } | Message::SysExEscape { data } => {
        data.iter().map(|byte| format!("{:02x}", byte)).collect()
      }
      _ => String::new(),
    }
  }
}

/// A message as stored in a track, `delta` ticks after the previous one
#[derive(Debug, PartialEq, Clone)]
pub struct Event {
  pub delta: u32,
  pub message: Message,
}

impl Event {
  pub fn new(delta: u32, message: Message) -> Event {
    Event { delta, message }
  }
}

#[cfg(test)]
mod test {

  use super::{Message, MetaEvent};

  #[test]
  pub fn channel_of_voice_messages() {
    let msg = Message::PitchBend {
      channel: 3,
      value: 8192,
    };
    assert_eq!(msg.channel(), Some(3));
    assert!(msg.is_channel_message());
    assert_eq!(Message::Meta(MetaEvent::EndOfTrack).channel(), None);
  }

  #[test]
  pub fn sysex_hex() {
    let msg = Message::SysEx {
      data: vec![0x7e, 0x7f, 0x09, 0x01],
    };
    assert_eq!(msg.hex(), "7e7f0901");
  }
}
