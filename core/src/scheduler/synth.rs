use crate::midi::types::{U14, U4, U7};
use crate::midi::types::PITCH_BEND_CENTER;

/// Bend range of a full pitch wheel deflection, in semitones
pub const PITCH_BEND_RANGE: f64 = 2.0;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Instrument {
  DrumKit,
  Program(U7),
}

/// Everything a synthesis backend needs to start one note
#[derive(Debug, PartialEq, Clone)]
pub struct VoiceRequest {
  pub channel: U4,
  pub key: U7,
  pub velocity: U7,
  pub instrument: Instrument,
  pub pitch_bend: U14,
  /// Audio clock time of the onset, in seconds
  pub onset: f64,
}

impl VoiceRequest {
  /// Pitch offset implied by the pitch bend
  pub fn detune_cents(&self) -> f64 {
    let deflection = f64::from(self.pitch_bend) - f64::from(PITCH_BEND_CENTER);
    deflection / f64::from(PITCH_BEND_CENTER) * PITCH_BEND_RANGE * 100.0
  }
}

/// Identifies a voice together with the allocation it belongs to.
///
/// Backends recycle their voices, so a handle outlives the note it was
/// created for. The generation tells both apart.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct VoiceHandle {
  slot: u32,
  generation: u32,
}

impl VoiceHandle {
  pub fn new(slot: u32, generation: u32) -> VoiceHandle {
    VoiceHandle { slot, generation }
  }

  pub fn slot(&self) -> u32 {
    self.slot
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }
}

/// The sample based synthesis backend fed by the `NoteScheduler`
pub trait Synthesizer: Send {
  fn enqueue(&mut self, request: &VoiceRequest) -> VoiceHandle;

  /// Stops the voice at the given audio clock time
  fn cancel(&mut self, handle: VoiceHandle, at: f64);

  /// Whether the handle still refers to the voice it was returned for
  fn is_live(&self, handle: VoiceHandle) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Slot {
  generation: u32,
  busy: bool,
}

/// Fixed size voice allocator with generation checked handles.
///
/// When every voice is busy the least recently allocated one is stolen,
/// which invalidates the handle it was given out with.
#[derive(Debug)]
pub struct VoicePool {
  slots: Vec<Slot>,
  order: Vec<u32>,
}

impl VoicePool {
  pub fn new(capacity: usize) -> VoicePool {
    VoicePool {
      slots: vec![
        Slot {
          generation: 0,
          busy: false,
        };
        capacity.max(1)
      ],
      order: Vec::with_capacity(capacity),
    }
  }

  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  pub fn active(&self) -> usize {
    self.order.len()
  }

  pub fn acquire(&mut self) -> VoiceHandle {
    let slot = match self.slots.iter().position(|slot| !slot.busy) {
      Some(free) => free as u32,
      None => self.order.remove(0),
    };
    let entry = &mut self.slots[slot as usize];
    entry.generation = entry.generation.wrapping_add(1);
    entry.busy = true;
    self.order.push(slot);
    VoiceHandle::new(slot, entry.generation)
  }

  /// Frees the voice, returns false when the handle was stale
  pub fn release(&mut self, handle: VoiceHandle) -> bool {
    if !self.is_live(handle) {
      return false;
    }
    self.slots[handle.slot as usize].busy = false;
    self.order.retain(|slot| *slot != handle.slot);
    true
  }

  pub fn is_live(&self, handle: VoiceHandle) -> bool {
    self
      .slots
      .get(handle.slot as usize)
      .map_or(false, |slot| slot.busy && slot.generation == handle.generation)
  }
}
