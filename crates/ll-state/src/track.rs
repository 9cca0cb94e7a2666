//! Tracks and lanes
//!
//! A track owns region lanes plus automation lanes, each a position-sorted
//! vector of regions. Region identities embed the track-name hash and the
//! index within the lane, so lane mutations renumber and a rename re-stamps
//! every owned region id.

use serde::{Deserialize, Serialize};

use ll_core::{track_name_hash, Position, RegionType, TempoMap, TrackNameHash};

use crate::Region;

// ═══════════════════════════════════════════════════════════════════════════════
// LANE
// ═══════════════════════════════════════════════════════════════════════════════

/// One horizontal strip of regions, sorted ascending by position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Lane {
    pub regions: Vec<Region>,
}

impl Lane {
    /// Insert keeping position order, then renumber. Returns the index the
    /// region landed at.
    pub fn insert_region(&mut self, region: Region) -> usize {
        let at = self
            .regions
            .iter()
            .position(|r| r.pos.ticks > region.pos.ticks)
            .unwrap_or(self.regions.len());
        self.regions.insert(at, region);
        self.renumber(self.regions[at].id.track, self.regions[at].id.lane);
        at
    }

    /// Remove by index, renumbering the remainder.
    pub fn remove_region(&mut self, idx: usize) -> Option<Region> {
        if idx >= self.regions.len() {
            return None;
        }
        let removed = self.regions.remove(idx);
        self.renumber(removed.id.track, removed.id.lane);
        Some(removed)
    }

    /// Re-sort by position and re-stamp `idx` on every region id.
    pub fn renumber(&mut self, track: TrackNameHash, lane: usize) {
        self.regions
            .sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks));
        for (i, r) in self.regions.iter_mut().enumerate() {
            r.id.track = track;
            r.id.lane = lane;
            r.id.idx = i;
        }
    }

    /// Region sounding at a timeline frame, if any (end exclusive)
    pub fn region_at_frame(&self, frame: i64) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains_frame(frame))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRACK
// ═══════════════════════════════════════════════════════════════════════════════

/// Kinds of timeline tracks the model distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Midi,
    Audio,
    Chord,
}

/// Timeline track: region lanes plus automation lanes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    /// Cached hash of `name`; regions reference tracks through this
    pub name_hash: TrackNameHash,
    pub kind: TrackKind,
    pub muted: bool,
    pub lanes: Vec<Lane>,
    /// One lane per automated parameter
    pub automation_lanes: Vec<Lane>,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        let name = name.into();
        let name_hash = track_name_hash(&name);
        Self {
            name,
            name_hash,
            kind,
            muted: false,
            lanes: vec![Lane::default()],
            automation_lanes: Vec::new(),
        }
    }

    /// Region type this track's lanes hold
    pub fn lane_region_type(&self) -> RegionType {
        match self.kind {
            TrackKind::Midi => RegionType::Midi,
            TrackKind::Audio => RegionType::Audio,
            TrackKind::Chord => RegionType::Chord,
        }
    }

    /// Rename and re-stamp the new hash onto every owned region id.
    pub fn rename(&mut self, new_name: impl Into<String>) {
        self.name = new_name.into();
        self.name_hash = track_name_hash(&self.name);
        for lane in self.lanes.iter_mut().chain(self.automation_lanes.iter_mut()) {
            for r in &mut lane.regions {
                r.id.track = self.name_hash;
            }
        }
    }

    /// Lane vector a region type belongs to, growing it to `lane + 1`.
    pub fn lane_mut(&mut self, rtype: RegionType, lane: usize) -> &mut Lane {
        let lanes = if rtype == RegionType::Automation {
            &mut self.automation_lanes
        } else {
            &mut self.lanes
        };
        while lanes.len() <= lane {
            lanes.push(Lane::default());
        }
        &mut lanes[lane]
    }

    pub fn lane_ref(&self, rtype: RegionType, lane: usize) -> Option<&Lane> {
        if rtype == RegionType::Automation {
            self.automation_lanes.get(lane)
        } else {
            self.lanes.get(lane)
        }
    }

    /// Re-derive frame caches for everything on the track.
    pub fn update_frames(&mut self, map: &TempoMap) {
        for lane in self.lanes.iter_mut().chain(self.automation_lanes.iter_mut()) {
            for r in &mut lane.regions {
                r.update_frames(map);
            }
        }
    }

    /// Last region end on any lane, for project length queries
    pub fn end_position(&self) -> Option<Position> {
        self.lanes
            .iter()
            .chain(self.automation_lanes.iter())
            .flat_map(|l| l.regions.iter())
            .map(|r| r.end_pos)
            .fold(None, |acc, p| match acc {
                Some(a) if a >= p => Some(a),
                _ => Some(p),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegionData;
    use ll_core::RegionId;

    fn region(map: &TempoMap, track: TrackNameHash, start: f64, end: f64) -> Region {
        Region::new(
            RegionId::new(RegionType::Midi, track, 0, 0),
            "r",
            Position::from_ticks(start, map),
            Position::from_ticks(end, map),
            RegionData::Midi { notes: Vec::new() },
            map,
        )
    }

    #[test]
    fn test_insert_keeps_order_and_renumbers() {
        let map = TempoMap::new(48000);
        let mut track = Track::new("Piano", TrackKind::Midi);
        let h = track.name_hash;
        track.lanes[0].insert_region(region(&map, h, 3840.0, 7680.0));
        track.lanes[0].insert_region(region(&map, h, 0.0, 3840.0));
        let lane = &track.lanes[0];
        assert_eq!(lane.regions.len(), 2);
        assert!((lane.regions[0].pos.ticks - 0.0).abs() < 1e-9);
        assert_eq!(lane.regions[0].id.idx, 0);
        assert_eq!(lane.regions[1].id.idx, 1);
    }

    #[test]
    fn test_remove_renumbers() {
        let map = TempoMap::new(48000);
        let mut track = Track::new("Piano", TrackKind::Midi);
        let h = track.name_hash;
        track.lanes[0].insert_region(region(&map, h, 0.0, 3840.0));
        track.lanes[0].insert_region(region(&map, h, 3840.0, 7680.0));
        let removed = track.lanes[0].remove_region(0).unwrap();
        assert!((removed.pos.ticks - 0.0).abs() < 1e-9);
        assert_eq!(track.lanes[0].regions[0].id.idx, 0);
    }

    #[test]
    fn test_rename_restamps_region_ids() {
        let map = TempoMap::new(48000);
        let mut track = Track::new("Piano", TrackKind::Midi);
        let h = track.name_hash;
        track.lanes[0].insert_region(region(&map, h, 0.0, 3840.0));
        track.rename("Rhodes");
        let new_hash = track_name_hash("Rhodes");
        assert_eq!(track.name_hash, new_hash);
        assert_eq!(track.lanes[0].regions[0].id.track, new_hash);
    }

    #[test]
    fn test_region_at_frame_end_exclusive() {
        let map = TempoMap::new(48000);
        let mut track = Track::new("Piano", TrackKind::Midi);
        let h = track.name_hash;
        track.lanes[0].insert_region(region(&map, h, 0.0, 3840.0));
        let end = track.lanes[0].regions[0].end_pos.frames;
        assert!(track.lanes[0].region_at_frame(end - 1).is_some());
        assert!(track.lanes[0].region_at_frame(end).is_none());
    }
}
