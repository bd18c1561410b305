use crate::midi::error::CodecError;
use crate::midi::messages::{Event, Message, MetaEvent};
use crate::midi::types::{U14, U4, U7};

pub type Result<T> = std::result::Result<T, CodecError>;

const MAX_VLQ_BYTES: usize = 4;

/// Decodes events from a byte buffer, carrying the running status between calls.
pub struct Decoder<'a> {
  pos: usize,
  data: &'a [u8],
  running_status: Option<u8>,
}

impl<'a> Decoder<'a> {
  pub fn new(data: &'a [u8]) -> Decoder<'a> {
    Decoder {
      pos: 0,
      data,
      running_status: None,
    }
  }

  pub fn at(data: &'a [u8], offset: usize, running_status: Option<u8>) -> Decoder<'a> {
    Decoder {
      pos: offset,
      data,
      running_status,
    }
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn running_status(&self) -> Option<u8> {
    self.running_status
  }

  pub fn has_remaining(&self) -> bool {
    self.pos < self.data.len()
  }

  fn peek_byte(&self) -> Result<u8> {
    self
      .data
      .get(self.pos)
      .cloned()
      .ok_or(CodecError::UnexpectedEndOfData { offset: self.pos })
  }

  fn next_byte(&mut self) -> Result<u8> {
    let byte = self.peek_byte()?;
    self.pos += 1;
    Ok(byte)
  }

  fn next_data(&mut self) -> Result<U7> {
    let offset = self.pos;
    let byte = self.next_byte()?;
    if byte & 0b1000_0000 == 0 {
      Ok(byte)
    } else {
      Err(CodecError::InvalidDataByte {
        value: byte,
        offset,
      })
    }
  }

  fn next_data2(&mut self) -> Result<(U7, U7)> {
    let d1 = self.next_data()?;
    let d2 = self.next_data()?;
    Ok((d1, d2))
  }

  fn next_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
    let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
    match end {
      Some(end) => {
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
      }
      None => Err(CodecError::UnexpectedEndOfData {
        offset: self.data.len(),
      }),
    }
  }

  pub fn read_vlq(&mut self) -> Result<u32> {
    let start = self.pos;
    let mut value = 0u32;
    for _ in 0..MAX_VLQ_BYTES {
      let byte = self.next_byte()?;
      value = (value << 7) | u32::from(byte & 0x7f);
      if byte & 0x80 == 0 {
        return Ok(value);
      }
    }
    Err(CodecError::InvalidVariableLength { offset: start })
  }

  /// Decodes a delta-prefixed event as found inside a track chunk
  pub fn next_event(&mut self) -> Result<Event> {
    let delta = self.read_vlq()?;
    let message = self.next_message()?;
    Ok(Event { delta, message })
  }

  /// Decodes a single message without delta
  pub fn next_message(&mut self) -> Result<Message> {
    let offset = self.pos;
    let first = self.peek_byte()?;
    let status = if first & 0x80 != 0 {
      self.pos += 1;
      first
    } else {
      // running status: the current byte is the first data byte
      self
        .running_status
        .ok_or(CodecError::UnsupportedEventType {
          status: first,
          meta_type: None,
          offset,
        })?
    };

    match status {
      0xff => self.decode_meta(offset),
      0xf0 => self.decode_sysex().map(|data| Message::SysEx { data }),
      0xf7 => self.decode_sysex().map(|data| Message::SysExEscape { data }),
      0x80..=0xef => {
        self.running_status = Some(status);
        self.decode_channel(status)
      }
      _ => Err(CodecError::UnsupportedEventType {
        status,
        meta_type: None,
        offset,
      }),
    }
  }

  fn decode_channel(&mut self, status: u8) -> Result<Message> {
    let channel: U4 = status & 0x0f;
    match (status >> 4) & 0x0f {
      0b1000 => {
        let (key, velocity) = self.next_data2()?;
        Ok(Message::NoteOff {
          channel,
          key,
          velocity,
        })
      }
      0b1001 => {
        let (key, velocity) = self.next_data2()?;
        if velocity == 0 {
          Ok(Message::NoteOff {
            channel,
            key,
            velocity,
          })
        } else {
          Ok(Message::NoteOn {
            channel,
            key,
            velocity,
          })
        }
      }
      0b1010 => {
        let (key, value) = self.next_data2()?;
        Ok(Message::PolyphonicKeyPressure {
          channel,
          key,
          value,
        })
      }
      0b1011 => {
        let (controller, value) = self.next_data2()?;
        Ok(Message::ControlChange {
          channel,
          controller,
          value,
        })
      }
      0b1100 => {
        let value = self.next_data()?;
        Ok(Message::ProgramChange { channel, value })
      }
      0b1101 => {
        let value = self.next_data()?;
        Ok(Message::ChannelPressure { channel, value })
      }
      _ => {
        let (lsb, msb) = self.next_data2()?;
        Ok(Message::PitchBend {
          channel,
          value: ((msb as U14) << 7) | (lsb as U14),
        })
      }
    }
  }

  fn decode_sysex(&mut self) -> Result<Vec<u8>> {
    let len = self.read_vlq()? as usize;
    self.next_bytes(len).map(|data| data.to_vec())
  }

  fn decode_meta(&mut self, offset: usize) -> Result<Message> {
    let meta_type = self.next_byte()?;
    let len = self.read_vlq()? as usize;
    let payload_offset = self.pos;
    let payload = self.next_bytes(len)?;

    let byte = |index: usize| -> Result<u8> {
      payload
        .get(index)
        .cloned()
        .ok_or(CodecError::UnexpectedEndOfData {
          offset: payload_offset + index,
        })
    };
    let text = || String::from_utf8_lossy(payload).into_owned();

    let meta = match meta_type {
      0x00 => {
        let number = if payload.len() >= 2 {
          (u16::from(payload[0]) << 8) | u16::from(payload[1])
        } else {
          0
        };
        MetaEvent::SequenceNumber(number)
      }
      0x01 => MetaEvent::Text(text()),
      0x02 => MetaEvent::Copyright(text()),
      0x03 => MetaEvent::TrackName(text()),
      0x04 => MetaEvent::InstrumentName(text()),
      0x05 => MetaEvent::Lyric(text()),
      0x06 => MetaEvent::Marker(text()),
      0x07 => MetaEvent::CuePoint(text()),
      0x08 => MetaEvent::ProgramName(text()),
      0x09 => MetaEvent::DeviceName(text()),
      0x0a..=0x0f => MetaEvent::UnknownText {
        meta_type,
        text: text(),
      },
      0x20 => MetaEvent::ChannelPrefix(byte(0)? & 0x0f),
      0x21 => MetaEvent::Port(byte(0)?),
      0x2f => MetaEvent::EndOfTrack,
      0x51 => MetaEvent::SetTempo {
        micros_per_quarter: (u32::from(byte(0)?) << 16)
          | (u32::from(byte(1)?) << 8)
          | u32::from(byte(2)?),
      },
      0x54 => MetaEvent::SmpteOffset {
        hours: byte(0)?,
        minutes: byte(1)?,
        seconds: byte(2)?,
        frames: byte(3)?,
        subframes: byte(4)?,
      },
      0x58 => MetaEvent::TimeSignature {
        numerator: byte(0)?,
        denominator_pow2: byte(1)?,
        clocks_per_click: byte(2)?,
        notated_32nds_per_quarter: byte(3)?,
      },
      0x59 => MetaEvent::KeySignature {
        sharps_flats: byte(0)? as i8,
        minor: byte(1)? != 0,
      },
      0x7f => MetaEvent::SequencerSpecific(payload.to_vec()),
      _ => {
        return Err(CodecError::UnsupportedEventType {
          status: 0xff,
          meta_type: Some(meta_type),
          offset,
        })
      }
    };

    Ok(Message::Meta(meta))
  }
}

impl<'a> Iterator for Decoder<'a> {
  type Item = Result<Message>;

  fn next(&mut self) -> Option<Result<Message>> {
    if self.has_remaining() {
      let result = self.next_message();
      if result.is_err() {
        // errors are fatal, stop iterating
        self.pos = self.data.len();
      }
      Some(result)
    } else {
      None
    }
  }
}

/// Decodes one isolated message starting at `offset`.
///
/// Returns the message, the number of bytes consumed and the running status
/// to pass into the next call.
pub fn decode_message(
  data: &[u8],
  offset: usize,
  running_status: Option<u8>,
) -> Result<(Message, usize, Option<u8>)> {
  let mut decoder = Decoder::at(data, offset, running_status);
  let message = decoder.next_message()?;
  Ok((
    message,
    decoder.position() - offset,
    decoder.running_status(),
  ))
}

/// Decodes the events of a track chunk body until the end of track marker.
pub fn decode_track(data: &[u8]) -> Result<Vec<Event>> {
  let mut decoder = Decoder::new(data);
  let mut events = Vec::new();
  while decoder.has_remaining() {
    let event = decoder.next_event()?;
    let end_of_track = event.message == Message::Meta(MetaEvent::EndOfTrack);
    events.push(event);
    if end_of_track {
      break;
    }
  }
  Ok(events)
}
