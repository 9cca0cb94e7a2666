//! Arranger objects
//!
//! Everything that can be placed on the timeline or inside a region is one
//! of a closed set of variants over a shared positional interface. Children
//! (notes, automation points, chord hits) keep their positions in the
//! owning region's local content space; markers and scale changes are
//! timeline-global.

use serde::{Deserialize, Serialize};

use ll_core::{ChildId, MidiVelocity, NoteNumber, Position, TempoMap};

use crate::Region;

// ═══════════════════════════════════════════════════════════════════════════════
// REGION-OWNED CHILDREN
// ═══════════════════════════════════════════════════════════════════════════════

/// MIDI note inside a region (positions local to the region content)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    pub pos: Position,
    /// Exclusive end
    pub end_pos: Position,
    pub pitch: NoteNumber,
    pub velocity: MidiVelocity,
    pub muted: bool,
}

impl MidiNote {
    pub fn new(pos: Position, end_pos: Position, pitch: NoteNumber, velocity: MidiVelocity) -> Self {
        Self {
            pos,
            end_pos,
            pitch,
            velocity,
            muted: false,
        }
    }

    pub fn length_ticks(&self) -> f64 {
        self.end_pos.ticks - self.pos.ticks
    }

    /// Whether the note is sounding at a local frame (end exclusive)
    pub fn is_hit(&self, local_frame: i64) -> bool {
        self.pos.frames <= local_frame && local_frame < self.end_pos.frames
    }
}

/// Automation point inside an automation region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub pos: Position,
    /// Normalized value (0.0 - 1.0)
    pub value: f32,
    /// Curve tension toward the next point (-1.0 to 1.0)
    pub tension: f32,
}

impl AutomationPoint {
    pub fn new(pos: Position, value: f32) -> Self {
        Self {
            pos,
            value: value.clamp(0.0, 1.0),
            tension: 0.0,
        }
    }
}

/// Chord hit inside a chord region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChordHit {
    pub pos: Position,
    /// Index into the project chord palette
    pub chord_index: usize,
}

/// Chord palette entry (pitches sounded by a [`ChordHit`])
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordDescriptor {
    pub name: String,
    /// Absolute MIDI pitches
    pub notes: Vec<NoteNumber>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TIMELINE-GLOBAL OBJECTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Timeline marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub pos: Position,
    pub muted: bool,
}

impl Marker {
    pub fn new(name: impl Into<String>, pos: Position) -> Self {
        Self {
            name: name.into(),
            pos,
            muted: false,
        }
    }
}

/// Musical scale kinds understood by the scale track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleKind {
    #[default]
    Major,
    Minor,
    HarmonicMinor,
    Dorian,
    Mixolydian,
    Chromatic,
}

/// Scale change on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleObject {
    pub pos: Position,
    /// Root pitch class (0 = C)
    pub root: u8,
    pub kind: ScaleKind,
    pub muted: bool,
}

impl ScaleObject {
    pub fn new(pos: Position, root: u8, kind: ScaleKind) -> Self {
        Self {
            pos,
            root: root % 12,
            kind,
            muted: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAGGED VARIANT
// ═══════════════════════════════════════════════════════════════════════════════

/// Any object an edit action can operate on.
///
/// Children carry their stable [`ChildId`] so an action clone can find the
/// live object again after a save/reload. Markers and scales are addressed
/// by their index in the project-level lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrangerObject {
    Region(Region),
    MidiNote { owner: ChildId, note: MidiNote },
    AutomationPoint { owner: ChildId, point: AutomationPoint },
    ChordHit { owner: ChildId, hit: ChordHit },
    Marker { index: usize, marker: Marker },
    ScaleObject { index: usize, scale: ScaleObject },
}

impl ArrangerObject {
    /// Start position (timeline-global for regions/markers/scales, local
    /// for region children).
    pub fn pos(&self) -> Position {
        match self {
            ArrangerObject::Region(r) => r.pos,
            ArrangerObject::MidiNote { note, .. } => note.pos,
            ArrangerObject::AutomationPoint { point, .. } => point.pos,
            ArrangerObject::ChordHit { hit, .. } => hit.pos,
            ArrangerObject::Marker { marker, .. } => marker.pos,
            ArrangerObject::ScaleObject { scale, .. } => scale.pos,
        }
    }

    /// Exclusive end position, if the variant has a length
    pub fn end_pos(&self) -> Option<Position> {
        match self {
            ArrangerObject::Region(r) => Some(r.end_pos),
            ArrangerObject::MidiNote { note, .. } => Some(note.end_pos),
            _ => None,
        }
    }

    pub fn muted(&self) -> bool {
        match self {
            ArrangerObject::Region(r) => r.muted,
            ArrangerObject::MidiNote { note, .. } => note.muted,
            ArrangerObject::Marker { marker, .. } => marker.muted,
            ArrangerObject::ScaleObject { scale, .. } => scale.muted,
            _ => false,
        }
    }

    /// Shift the object (and its end, if any) by a tick delta.
    pub fn move_by_ticks(&mut self, delta: f64, map: &TempoMap) {
        match self {
            ArrangerObject::Region(r) => r.move_by_ticks(delta, map),
            ArrangerObject::MidiNote { note, .. } => {
                note.pos.add_ticks(delta, map);
                note.end_pos.add_ticks(delta, map);
            }
            ArrangerObject::AutomationPoint { point, .. } => point.pos.add_ticks(delta, map),
            ArrangerObject::ChordHit { hit, .. } => hit.pos.add_ticks(delta, map),
            ArrangerObject::Marker { marker, .. } => marker.pos.add_ticks(delta, map),
            ArrangerObject::ScaleObject { scale, .. } => scale.pos.add_ticks(delta, map),
        }
    }

    /// Stable-identity match, used for selection deduplication.
    pub fn same_identity(&self, other: &ArrangerObject) -> bool {
        match (self, other) {
            (ArrangerObject::Region(a), ArrangerObject::Region(b)) => a.id.same_slot(&b.id),
            (
                ArrangerObject::MidiNote { owner: a, .. },
                ArrangerObject::MidiNote { owner: b, .. },
            ) => a == b,
            (
                ArrangerObject::AutomationPoint { owner: a, .. },
                ArrangerObject::AutomationPoint { owner: b, .. },
            ) => a == b,
            (
                ArrangerObject::ChordHit { owner: a, .. },
                ArrangerObject::ChordHit { owner: b, .. },
            ) => a == b,
            (
                ArrangerObject::Marker { index: a, .. },
                ArrangerObject::Marker { index: b, .. },
            ) => a == b,
            (
                ArrangerObject::ScaleObject { index: a, .. },
                ArrangerObject::ScaleObject { index: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
