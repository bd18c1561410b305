use log::debug;

use crate::midi::decoder::decode_track;
use crate::midi::encoder::Encoder;
use crate::midi::error::CodecError;
use crate::midi::messages::Event;

const HEADER_TAG: &[u8; 4] = b"MThd";
const TRACK_TAG: &[u8; 4] = b"MTrk";
const HEADER_LENGTH: u32 = 6;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Format {
  SingleTrack,
  Simultaneous,
  Sequential,
}

impl Format {
  fn from_u16(value: u16) -> Option<Format> {
    match value {
      0 => Some(Format::SingleTrack),
      1 => Some(Format::Simultaneous),
      2 => Some(Format::Sequential),
      _ => None,
    }
  }

  fn to_u16(self) -> u16 {
    match self {
      Format::SingleTrack => 0,
      Format::Simultaneous => 1,
      Format::Sequential => 2,
    }
  }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Division {
  TicksPerQuarter(u16),
  Smpte {
    frames_per_second: u8,
    ticks_per_frame: u8,
  },
}

impl Division {
  fn from_u16(value: u16) -> Division {
    if value & 0x8000 == 0 {
      Division::TicksPerQuarter(value)
    } else {
      // the upper byte holds the negated frame rate
      let frames = ((value >> 8) as u8 as i8).wrapping_neg();
      Division::Smpte {
        frames_per_second: frames as u8,
        ticks_per_frame: (value & 0xff) as u8,
      }
    }
  }

  fn to_u16(self) -> u16 {
    match self {
      Division::TicksPerQuarter(ticks) => ticks & 0x7fff,
      Division::Smpte {
        frames_per_second,
        ticks_per_frame,
      } => (u16::from((frames_per_second as i8).wrapping_neg() as u8) << 8) | u16::from(ticks_per_frame),
    }
  }

  /// Microseconds elapsed for `ticks` under the given tempo
  pub fn ticks_to_micros(self, ticks: u64, micros_per_quarter: u32) -> f64 {
    match self {
      Division::TicksPerQuarter(division) => {
        ticks as f64 * f64::from(micros_per_quarter) / f64::from(division.max(1))
      }
      Division::Smpte {
        frames_per_second,
        ticks_per_frame,
      } => {
        let ticks_per_second = f64::from(frames_per_second) * f64::from(ticks_per_frame);
        ticks as f64 * 1_000_000.0 / ticks_per_second.max(1.0)
      }
    }
  }
}

#[derive(Debug, PartialEq, Clone)]
pub struct MidiFile {
  format: Format,
  division: Division,
  tracks: Vec<Vec<Event>>,
}

impl MidiFile {
  pub fn new(format: Format, division: Division, tracks: Vec<Vec<Event>>) -> MidiFile {
    MidiFile {
      format,
      division,
      tracks,
    }
  }

  pub fn format(&self) -> Format {
    self.format
  }

  pub fn division(&self) -> Division {
    self.division
  }

  pub fn tracks(&self) -> &[Vec<Event>] {
    self.tracks.as_slice()
  }

  pub fn track(&self, index: usize) -> Option<&[Event]> {
    self.tracks.get(index).map(|track| track.as_slice())
  }

  pub fn decode(data: &[u8]) -> Result<MidiFile, CodecError> {
    let header = Self::chunk(data, 0).ok_or_else(|| CodecError::MalformedHeader {
      cause: "missing header chunk".to_string(),
    })?;
    if header.tag != HEADER_TAG {
      return Err(CodecError::MalformedHeader {
        cause: format!("unexpected tag {:?}", String::from_utf8_lossy(header.tag)),
      });
    }
    if header.length != HEADER_LENGTH {
      return Err(CodecError::MalformedHeader {
        cause: format!("unexpected length {}", header.length),
      });
    }
    let body = header.body.ok_or(CodecError::UnexpectedEndOfData {
      offset: data.len(),
    })?;

    let format_value = read_u16(body, 0);
    let format = Format::from_u16(format_value).ok_or_else(|| CodecError::MalformedHeader {
      cause: format!("unknown format {}", format_value),
    })?;
    let num_tracks = read_u16(body, 2) as usize;
    let division = Division::from_u16(read_u16(body, 4));

    debug!(
      "Decoding MIDI file: format={:?}, tracks={}, division={:?}",
      format, num_tracks, division
    );

    let mut offset = header.end;
    let mut tracks = Vec::with_capacity(num_tracks);
    for index in 0..num_tracks {
      let chunk = Self::chunk(data, offset).ok_or(CodecError::UnexpectedEndOfData {
        offset: data.len(),
      })?;
      if chunk.tag != TRACK_TAG {
        return Err(CodecError::MalformedTrack {
          index,
          cause: format!("unexpected tag {:?}", String::from_utf8_lossy(chunk.tag)),
        });
      }
      let body = chunk.body.ok_or_else(|| CodecError::MalformedTrack {
        index,
        cause: format!(
          "length {} exceeds the {} remaining bytes",
          chunk.length,
          data.len() - offset - 8
        ),
      })?;
      tracks.push(decode_track(body).map_err(|err| Self::in_track(err, offset + 8))?);
      offset = chunk.end;
    }

    Ok(MidiFile {
      format,
      division,
      tracks,
    })
  }

  pub fn encode(&self, running_status: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(HEADER_TAG);
    out.extend_from_slice(&HEADER_LENGTH.to_be_bytes());
    out.extend_from_slice(&self.format.to_u16().to_be_bytes());
    out.extend_from_slice(&(self.tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&self.division.to_u16().to_be_bytes());
    for track in self.tracks.iter() {
      let mut body = Vec::new();
      Encoder::encode_track(track, running_status, &mut body);
      out.extend_from_slice(TRACK_TAG);
      out.extend_from_slice(&(body.len() as u32).to_be_bytes());
      out.extend_from_slice(&body);
    }
    out
  }

  fn chunk(data: &[u8], offset: usize) -> Option<Chunk> {
    if offset + 8 > data.len() {
      return None;
    }
    let tag = &data[offset..offset + 4];
    let length = u32::from_be_bytes([
      data[offset + 4],
      data[offset + 5],
      data[offset + 6],
      data[offset + 7],
    ]);
    let start = offset + 8;
    let end = start + length as usize;
    let body = if end <= data.len() {
      Some(&data[start..end])
    } else {
      None
    };
    Some(Chunk {
      tag,
      length,
      body,
      end,
    })
  }

  /// Track decoding reports offsets relative to the chunk body
  fn in_track(err: CodecError, base: usize) -> CodecError {
    match err {
      CodecError::UnexpectedEndOfData { offset } => CodecError::UnexpectedEndOfData {
        offset: base + offset,
      },
      CodecError::UnsupportedEventType {
        status,
        meta_type,
        offset,
      } => CodecError::UnsupportedEventType {
        status,
        meta_type,
        offset: base + offset,
      },
      CodecError::InvalidDataByte { value, offset } => CodecError::InvalidDataByte {
        value,
        offset: base + offset,
      },
      CodecError::InvalidVariableLength { offset } => CodecError::InvalidVariableLength {
        offset: base + offset,
      },
      other => other,
    }
  }
}

struct Chunk<'a> {
  tag: &'a [u8],
  length: u32,
  body: Option<&'a [u8]>,
  end: usize,
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
  (u16::from(data[offset]) << 8) | u16::from(data[offset + 1])
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::midi::messages::{Message, MetaEvent};

  fn smf(format: u16, division: u16, tracks: &[&[u8]]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"MThd");
    data.extend_from_slice(&6u32.to_be_bytes());
    data.extend_from_slice(&format.to_be_bytes());
    data.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    data.extend_from_slice(&division.to_be_bytes());
    for track in tracks {
      data.extend_from_slice(b"MTrk");
      data.extend_from_slice(&(track.len() as u32).to_be_bytes());
      data.extend_from_slice(track);
    }
    data
  }

  const NOTES: &[u8] = &[
    0x00, 0x90, 0x3c, 0x64, 0x83, 0x74, 0x80, 0x3c, 0x40, 0x00, 0xff, 0x2f, 0x00,
  ];

  #[test]
  pub fn decode_single_track() {
    let file = MidiFile::decode(&smf(0, 480, &[NOTES])).unwrap();
    assert_eq!(file.format(), Format::SingleTrack);
    assert_eq!(file.division(), Division::TicksPerQuarter(480));
    assert_eq!(file.tracks().len(), 1);
    assert_eq!(
      file.track(0).unwrap()[0].message,
      Message::NoteOn {
        channel: 0,
        key: 60,
        velocity: 100
      }
    );
    assert_eq!(
      file.track(0).unwrap()[2].message,
      Message::Meta(MetaEvent::EndOfTrack)
    );
  }

  #[test]
  pub fn decode_bad_header_tag() {
    let mut data = smf(0, 480, &[NOTES]);
    data[0] = b'X';
    match MidiFile::decode(&data) {
      Err(CodecError::MalformedHeader { .. }) => {}
      other => panic!("unexpected result {:?}", other),
    }
  }

  #[test]
  pub fn decode_bad_header_length() {
    let mut data = smf(0, 480, &[NOTES]);
    data[7] = 7;
    match MidiFile::decode(&data) {
      Err(CodecError::MalformedHeader { .. }) => {}
      other => panic!("unexpected result {:?}", other),
    }
  }

  #[test]
  pub fn decode_bad_track_tag() {
    let mut data = smf(1, 480, &[NOTES]);
    data[14] = b'X';
    match MidiFile::decode(&data) {
      Err(CodecError::MalformedTrack { index: 0, .. }) => {}
      other => panic!("unexpected result {:?}", other),
    }
  }

  #[test]
  pub fn decode_track_length_beyond_data() {
    let mut data = smf(1, 480, &[NOTES]);
    data.truncate(data.len() - 2);
    match MidiFile::decode(&data) {
      Err(CodecError::MalformedTrack { index: 0, .. }) => {}
      other => panic!("unexpected result {:?}", other),
    }
  }

  #[test]
  pub fn decode_missing_tracks() {
    let mut data = smf(1, 480, &[NOTES]);
    data[11] = 2;
    assert_eq!(
      MidiFile::decode(&data),
      Err(CodecError::UnexpectedEndOfData { offset: data.len() })
    );
  }

  #[test]
  pub fn decode_truncated_event_inside_track() {
    let track: &[u8] = &[0x00, 0x90, 0x3c];
    assert_eq!(
      MidiFile::decode(&smf(0, 480, &[track])),
      Err(CodecError::UnexpectedEndOfData { offset: 25 })
    );
  }

  #[test]
  pub fn smpte_division() {
    let division = Division::from_u16(0xe728);
    assert_eq!(
      division,
      Division::Smpte {
        frames_per_second: 25,
        ticks_per_frame: 40
      }
    );
    assert_eq!(division.to_u16(), 0xe728);
    assert_eq!(division.ticks_to_micros(1000, 500_000), 1_000_000.0);
  }

  #[test]
  pub fn file_round_trip() {
    let data = smf(1, 96, &[NOTES, &[0x00, 0xc1, 0x05, 0x10, 0x91, 0x40, 0x70, 0x00, 0xff, 0x2f, 0x00]]);
    let file = MidiFile::decode(&data).unwrap();
    let encoded = file.encode(false);
    assert_eq!(encoded, data);
    assert_eq!(MidiFile::decode(&file.encode(true)).unwrap(), file);
  }
}
