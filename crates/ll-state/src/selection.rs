//! Selections
//!
//! An action operates on a selection clone, never on live objects. The
//! selection owns full deep copies so the action can be stored on the undo
//! stack and replayed later against whatever the project looks like then,
//! resolving everything through stable ids.

use serde::{Deserialize, Serialize};

use ll_core::Position;

use crate::{ArrangerObject, Region};

/// Which arranger surface a selection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionKind {
    /// Regions, markers and scale objects
    Timeline,
    /// Region children (notes, automation points, chord hits)
    Editor,
}

/// A set of selected objects, deduplicated by stable identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub kind: SelectionKind,
    objects: Vec<ArrangerObject>,
}

impl Selection {
    pub fn new(kind: SelectionKind) -> Self {
        Self {
            kind,
            objects: Vec::new(),
        }
    }

    pub fn timeline() -> Self {
        Self::new(SelectionKind::Timeline)
    }

    pub fn editor() -> Self {
        Self::new(SelectionKind::Editor)
    }

    /// Add an object unless an identical identity is already present.
    pub fn add(&mut self, obj: ArrangerObject) {
        if !self.objects.iter().any(|o| o.same_identity(&obj)) {
            self.objects.push(obj);
        }
    }

    pub fn add_region(&mut self, region: Region) {
        self.add(ArrangerObject::Region(region));
    }

    pub fn remove(&mut self, obj: &ArrangerObject) {
        self.objects.retain(|o| !o.same_identity(obj));
    }

    pub fn contains(&self, obj: &ArrangerObject) -> bool {
        self.objects.iter().any(|o| o.same_identity(obj))
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[ArrangerObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [ArrangerObject] {
        &mut self.objects
    }

    pub fn into_objects(self) -> Vec<ArrangerObject> {
        self.objects
    }

    /// Only the region members, in selection order
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.objects.iter().filter_map(|o| match o {
            ArrangerObject::Region(r) => Some(r),
            _ => None,
        })
    }

    /// Earliest start across the selection
    pub fn start_position(&self) -> Option<Position> {
        self.objects
            .iter()
            .map(|o| o.pos())
            .fold(None, |acc, p| match acc {
                Some(a) if a <= p => Some(a),
                _ => Some(p),
            })
    }

    /// Latest end (or start, for lengthless objects) across the selection
    pub fn end_position(&self) -> Option<Position> {
        self.objects
            .iter()
            .map(|o| o.end_pos().unwrap_or_else(|| o.pos()))
            .fold(None, |acc, p| match acc {
                Some(a) if a >= p => Some(a),
                _ => Some(p),
            })
    }

    /// Sort by ascending position (regions by start).
    pub fn sort_by_position(&mut self) {
        self.objects
            .sort_by(|a, b| a.pos().ticks.total_cmp(&b.pos().ticks));
    }

    /// Sort by descending structural index so removals never invalidate
    /// the indices of objects still to be removed.
    pub fn sort_for_removal(&mut self) {
        fn key(o: &ArrangerObject) -> (usize, usize) {
            match o {
                ArrangerObject::Region(r) => (r.id.idx, 0),
                ArrangerObject::MidiNote { owner, .. }
                | ArrangerObject::AutomationPoint { owner, .. }
                | ArrangerObject::ChordHit { owner, .. } => (owner.region.idx, owner.index),
                ArrangerObject::Marker { index, .. } | ArrangerObject::ScaleObject { index, .. } => {
                    (*index, 0)
                }
            }
        }
        self.objects.sort_by(|a, b| key(b).cmp(&key(a)));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MidiNote, RegionData};
    use ll_core::{track_name_hash, RegionId, RegionType, TempoMap};

    fn region(map: &TempoMap, idx: usize, start: f64) -> Region {
        Region::new(
            RegionId::new(RegionType::Midi, track_name_hash("Piano"), 0, idx),
            "r",
            Position::from_ticks(start, map),
            Position::from_ticks(start + 3840.0, map),
            RegionData::Midi { notes: Vec::new() },
            map,
        )
    }

    #[test]
    fn test_dedupe_by_identity() {
        let map = TempoMap::new(48000);
        let mut sel = Selection::timeline();
        sel.add_region(region(&map, 0, 0.0));
        sel.add_region(region(&map, 0, 0.0));
        sel.add_region(region(&map, 1, 3840.0));
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn test_start_end_positions() {
        let map = TempoMap::new(48000);
        let mut sel = Selection::timeline();
        sel.add_region(region(&map, 1, 3840.0));
        sel.add_region(region(&map, 0, 0.0));
        assert!((sel.start_position().unwrap().ticks - 0.0).abs() < 1e-9);
        assert!((sel.end_position().unwrap().ticks - 7680.0).abs() < 1e-9);
    }

    #[test]
    fn test_sort_for_removal_descending() {
        let map = TempoMap::new(48000);
        let mut sel = Selection::editor();
        let owner = ll_core::ChildId {
            region: RegionId::new(RegionType::Midi, track_name_hash("Piano"), 0, 0),
            index: 0,
        };
        for i in 0..3 {
            let mut o = owner;
            o.index = i;
            sel.add(ArrangerObject::MidiNote {
                owner: o,
                note: MidiNote::new(
                    Position::from_ticks(i as f64 * 100.0, &map),
                    Position::from_ticks(i as f64 * 100.0 + 50.0, &map),
                    60,
                    100,
                ),
            });
        }
        sel.sort_for_removal();
        let indices: Vec<usize> = sel
            .objects()
            .iter()
            .map(|o| match o {
                ArrangerObject::MidiNote { owner, .. } => owner.index,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(indices, vec![2, 1, 0]);
    }
}
