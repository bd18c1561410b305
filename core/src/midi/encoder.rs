use log::warn;

use super::messages::{Event, Message, MetaEvent};
use super::types::{U14, U4, U7};

#[inline]
fn u7(d: &U7) -> u8 {
  d & 0x7f
}

#[inline]
fn u14_msb(d: &U14) -> u8 {
  ((d >> 7) & 0x7fu16) as u8
}

#[inline]
fn u14_lsb(d: &U14) -> u8 {
  (d & 0x7f) as u8
}

#[inline]
fn status_and_channel(status: U4, channel: &U4) -> u8 {
  (status << 4) | (channel & 0x0f)
}

/// Largest value a four byte variable length quantity holds
pub const MAX_VLQ_VALUE: u32 = 0x0fff_ffff;

pub struct Encoder;

impl Encoder {
  /// Values above `MAX_VLQ_VALUE` saturate to it
  pub fn write_vlq(value: u32, out: &mut Vec<u8>) {
    let value = if value > MAX_VLQ_VALUE {
      warn!(
        "Variable length value {:#x} does not fit in four bytes, writing {:#x}",
        value, MAX_VLQ_VALUE
      );
      MAX_VLQ_VALUE
    } else {
      value
    };
    let mut buffer = [0u8; 4];
    let mut index = buffer.len() - 1;
    buffer[index] = (value & 0x7f) as u8;
    let mut rest = value >> 7;
    while rest > 0 {
      index -= 1;
      buffer[index] = ((rest & 0x7f) as u8) | 0x80;
      rest >>= 7;
    }
    out.extend_from_slice(&buffer[index..]);
  }

  /// Status byte for channel messages, `None` for sysex and meta events
  pub fn status(msg: &Message) -> Option<u8> {
    match msg {
      Message::NoteOff { channel, .. } => Some(status_and_channel(0b1000, channel)),
      Message::NoteOn { channel, .. } => Some(status_and_channel(0b1001, channel)),
      Message::PolyphonicKeyPressure { channel, .. } => Some(status_and_channel(0b1010, channel)),
      Message::ControlChange { channel, .. } => Some(status_and_channel(0b1011, channel)),
      Message::ProgramChange { channel, .. } => Some(status_and_channel(0b1100, channel)),
      Message::ChannelPressure { channel, .. } => Some(status_and_channel(0b1101, channel)),
      Message::PitchBend { channel, .. } => Some(status_and_channel(0b1110, channel)),
      _ => None,
    }
  }

  /// Encodes a message with its status byte always present
  pub fn encode_message(msg: &Message, out: &mut Vec<u8>) {
    Self::encode_with_running_status(msg, None, out);
  }

  /// Encodes a message omitting the status byte when it equals `running_status`.
  /// Returns the running status after this message, which sysex and meta events cancel.
  pub fn encode_with_running_status(
    msg: &Message,
    running_status: Option<u8>,
    out: &mut Vec<u8>,
  ) -> Option<u8> {
    if let Some(status) = Self::status(msg) {
      if running_status != Some(status) {
        out.push(status);
      }
      Self::encode_channel_data(msg, out);
      Some(status)
    } else {
      match msg {
        Message::SysEx { data } => Self::encode_sysex(0xf0, data, out),
        Message::SysExEscape { data } => Self::encode_sysex(0xf7, data, out),
        Message::Meta(meta) => Self::encode_meta(meta, out),
        _ => {}
      }
      None
    }
  }

  fn encode_channel_data(msg: &Message, out: &mut Vec<u8>) {
    match msg {
      Message::NoteOff { key, velocity, .. } | Message::NoteOn { key, velocity, .. } => {
        out.extend_from_slice(&[u7(key), u7(velocity)])
      }
      Message::PolyphonicKeyPressure { key, value, .. } => {
        out.extend_from_slice(&[u7(key), u7(value)])
      }
      Message::ControlChange {
        controller, value, ..
      } => out.extend_from_slice(&[u7(controller), u7(value)]),
      Message::ProgramChange { value, .. } | Message::ChannelPressure { value, .. } => {
        out.push(u7(value))
      }
      Message::PitchBend { value, .. } => out.extend_from_slice(&[u14_lsb(value), u14_msb(value)]),
      _ => {}
    }
  }

  fn encode_sysex(status: u8, data: &[u8], out: &mut Vec<u8>) {
    out.push(status);
    Self::write_vlq(data.len() as u32, out);
    out.extend_from_slice(data);
  }

  fn encode_meta(meta: &MetaEvent, out: &mut Vec<u8>) {
    let (meta_type, payload): (u8, Vec<u8>) = match meta {
      MetaEvent::SequenceNumber(number) => (0x00, vec![(number >> 8) as u8, *number as u8]),
      MetaEvent::Text(text) => (0x01, text.as_bytes().to_vec()),
      MetaEvent::Copyright(text) => (0x02, text.as_bytes().to_vec()),
      MetaEvent::TrackName(text) => (0x03, text.as_bytes().to_vec()),
      MetaEvent::InstrumentName(text) => (0x04, text.as_bytes().to_vec()),
      MetaEvent::Lyric(text) => (0x05, text.as_bytes().to_vec()),
      MetaEvent::Marker(text) => (0x06, text.as_bytes().to_vec()),
      MetaEvent::CuePoint(text) => (0x07, text.as_bytes().to_vec()),
      MetaEvent::ProgramName(text) => (0x08, text.as_bytes().to_vec()),
      MetaEvent::DeviceName(text) => (0x09, text.as_bytes().to_vec()),
      MetaEvent::UnknownText { meta_type, text } => (*meta_type, text.as_bytes().to_vec()),
      MetaEvent::ChannelPrefix(channel) => (0x20, vec![channel & 0x0f]),
      MetaEvent::Port(port) => (0x21, vec![*port]),
      MetaEvent::EndOfTrack => (0x2f, vec![]),
      MetaEvent::SetTempo { micros_per_quarter } => (
        0x51,
        vec![
          (micros_per_quarter >> 16) as u8,
          (micros_per_quarter >> 8) as u8,
          *micros_per_quarter as u8,
        ],
      ),
      MetaEvent::SmpteOffset {
        hours,
        minutes,
        seconds,
        frames,
        subframes,
      } => (0x54, vec![*hours, *minutes, *seconds, *frames, *subframes]),
      MetaEvent::TimeSignature {
        numerator,
        denominator_pow2,
        clocks_per_click,
        notated_32nds_per_quarter,
      } => (
        0x58,
        vec![
          *numerator,
          *denominator_pow2,
          *clocks_per_click,
          *notated_32nds_per_quarter,
        ],
      ),
      MetaEvent::KeySignature {
        sharps_flats,
        minor,
      } => (0x59, vec![*sharps_flats as u8, *minor as u8]),
      MetaEvent::SequencerSpecific(data) => (0x7f, data.clone()),
    };
    out.push(0xff);
    out.push(meta_type);
    Self::write_vlq(payload.len() as u32, out);
    out.extend_from_slice(&payload);
  }

  /// Encodes the body of a track chunk, appending an end of track if missing
  pub fn encode_track(events: &[Event], running_status: bool, out: &mut Vec<u8>) {
    let mut status = None;
    for event in events.iter() {
      Self::write_vlq(event.delta, out);
      let running = if running_status { status } else { None };
      status = Self::encode_with_running_status(&event.message, running, out);
    }
    let terminated = events
      .last()
      .map_or(false, |event| event.message == Message::Meta(MetaEvent::EndOfTrack));
    if !terminated {
      Self::write_vlq(0, out);
      Self::encode_meta(&MetaEvent::EndOfTrack, out);
    }
  }
}
