//! MIDI primitives and per-cycle event buffers
//!
//! - Note on/off events with sample-accurate in-cycle offsets
//! - A fixed-capacity event buffer safe for the realtime path

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// MIDI 1.0 status bytes
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const ALL_NOTES_OFF_CC: u8 = 123;
}

/// MIDI channel (1-16)
pub type MidiChannel = u8;

/// MIDI note number (0-127)
pub type NoteNumber = u8;

/// MIDI velocity (0-127)
pub type MidiVelocity = u8;

/// Default note velocity
pub const VELOCITY_DEFAULT: MidiVelocity = 90;

// ═══════════════════════════════════════════════════════════════════════════════
// CYCLE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A sample-accurate MIDI event within a processing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiCycleEvent {
    /// Frame offset from the start of the cycle buffer
    pub time: u32,
    pub channel: MidiChannel,
    pub kind: MidiEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEventKind {
    NoteOn {
        pitch: NoteNumber,
        velocity: MidiVelocity,
    },
    NoteOff {
        pitch: NoteNumber,
    },
    /// CC 123 — all notes off on the channel
    AllNotesOff,
}

/// Event buffer filled once per processing cycle.
///
/// Backed by an inline SmallVec so typical cycles never allocate on the
/// realtime path.
#[derive(Debug, Default, Clone)]
pub struct MidiEventBuffer {
    events: SmallVec<[MidiCycleEvent; 64]>,
}

impl MidiEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_note_on(
        &mut self,
        channel: MidiChannel,
        pitch: NoteNumber,
        velocity: MidiVelocity,
        time: u32,
    ) {
        self.events.push(MidiCycleEvent {
            time,
            channel,
            kind: MidiEventKind::NoteOn { pitch, velocity },
        });
    }

    pub fn add_note_off(&mut self, channel: MidiChannel, pitch: NoteNumber, time: u32) {
        self.events.push(MidiCycleEvent {
            time,
            channel,
            kind: MidiEventKind::NoteOff { pitch },
        });
    }

    pub fn add_all_notes_off(&mut self, channel: MidiChannel, time: u32) {
        self.events.push(MidiCycleEvent {
            time,
            channel,
            kind: MidiEventKind::AllNotesOff,
        });
    }

    /// Sort by time, note-offs before note-ons at the same frame so a
    /// retrigger on the same pitch is never swallowed.
    pub fn sort(&mut self) {
        self.events.sort_by(|a, b| {
            a.time.cmp(&b.time).then_with(|| {
                let rank = |e: &MidiCycleEvent| match e.kind {
                    MidiEventKind::AllNotesOff => 0,
                    MidiEventKind::NoteOff { .. } => 1,
                    MidiEventKind::NoteOn { .. } => 2,
                };
                rank(a).cmp(&rank(b))
            })
        });
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[MidiCycleEvent] {
        &self.events
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_offs_before_ons() {
        let mut buf = MidiEventBuffer::new();
        buf.add_note_on(1, 60, 100, 5);
        buf.add_note_off(1, 60, 5);
        buf.add_note_on(1, 62, 100, 0);
        buf.sort();

        let ev = buf.events();
        assert_eq!(ev[0].time, 0);
        assert!(matches!(ev[1].kind, MidiEventKind::NoteOff { pitch: 60 }));
        assert!(matches!(ev[2].kind, MidiEventKind::NoteOn { pitch: 60, .. }));
    }
}
