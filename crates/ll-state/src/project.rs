//! Project graph
//!
//! The single root aggregate: tempo map, tracks, clip pool, link registry
//! and the timeline-global object lists. Every mutation entry point takes
//! `&mut Project` explicitly; there is no global instance. Lookup is by
//! stable id throughout so stored actions resolve after save/reload.

use serde::{Deserialize, Serialize};

use ll_core::{
    ChildId, ClipId, CoreError, Position, RegionId, RegionType, TempoMap, TrackNameHash,
};

use crate::{
    ArrangerObject, AutomationPoint, ChordDescriptor, ChordHit, ClipPool, LinkGroupManager,
    Marker, MidiNote, Region, RegionData, ScaleObject, StateError, StateResult, Track,
};

/// Serialized project format version
pub const PROJECT_FORMAT_VERSION: u32 = 1;

/// Root document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub format_version: u32,
    pub title: String,
    pub tempo_map: TempoMap,
    pub tracks: Vec<Track>,
    pub pool: ClipPool,
    pub link_groups: LinkGroupManager,
    pub markers: Vec<Marker>,
    pub scales: Vec<ScaleObject>,
    pub chord_palette: Vec<ChordDescriptor>,
}

impl Project {
    pub fn new(title: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            format_version: PROJECT_FORMAT_VERSION,
            title: title.into(),
            tempo_map: TempoMap::new(sample_rate),
            tracks: Vec::new(),
            pool: ClipPool::new(),
            link_groups: LinkGroupManager::new(),
            markers: Vec::new(),
            scales: Vec::new(),
            chord_palette: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn find_track(&self, hash: TrackNameHash) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name_hash == hash)
    }

    pub fn find_track_mut(&mut self, hash: TrackNameHash) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.name_hash == hash)
    }

    /// Resolve a region id to the live region, matching by slot.
    pub fn find_region(&self, id: &RegionId) -> Option<&Region> {
        let track = self.find_track(id.track)?;
        let lane = track.lane_ref(id.rtype, id.lane)?;
        lane.regions.get(id.idx).filter(|r| r.id.same_slot(id))
    }

    pub fn find_region_mut(&mut self, id: &RegionId) -> Option<&mut Region> {
        let track = self.find_track_mut(id.track)?;
        let lane = track.lane_mut(id.rtype, id.lane);
        lane.regions.get_mut(id.idx).filter(|r| r.id.same_slot(id))
    }

    pub fn find_note(&self, id: &ChildId) -> Option<&MidiNote> {
        match &self.find_region(&id.region)?.data {
            RegionData::Midi { notes } => notes.get(id.index),
            _ => None,
        }
    }

    pub fn find_automation_point(&self, id: &ChildId) -> Option<&AutomationPoint> {
        match &self.find_region(&id.region)?.data {
            RegionData::Automation { points } => points.get(id.index),
            _ => None,
        }
    }

    pub fn find_chord_hit(&self, id: &ChildId) -> Option<&ChordHit> {
        match &self.find_region(&id.region)?.data {
            RegionData::Chord { hits } => hits.get(id.index),
            _ => None,
        }
    }

    /// All live region ids, every track and lane
    pub fn all_region_ids(&self) -> Vec<RegionId> {
        let mut ids = Vec::new();
        for t in &self.tracks {
            for lane in t.lanes.iter().chain(t.automation_lanes.iter()) {
                ids.extend(lane.regions.iter().map(|r| r.id));
            }
        }
        ids
    }

    /// Whether any live region references a pool clip
    pub fn clip_in_use(&self, clip: ClipId) -> bool {
        self.tracks.iter().any(|t| {
            t.lanes.iter().chain(t.automation_lanes.iter()).any(|l| {
                l.regions.iter().any(|r| {
                    matches!(&r.data, RegionData::Audio { clip_id, .. } if *clip_id == clip)
                })
            })
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Structural mutation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert a region into the lane its id names, keeping position order.
    /// Returns the id after renumbering.
    pub fn add_region(&mut self, mut region: Region) -> StateResult<RegionId> {
        region.validate()?;
        let (rtype, track_hash, lane_idx) = (region.id.rtype, region.id.track, region.id.lane);
        if matches!(&region.data, RegionData::Audio { clip_id, .. } if !self.pool.contains(*clip_id))
        {
            return Err(StateError::ActionFailed(format!(
                "region '{}' references a missing pool clip",
                region.name
            )));
        }
        let track = self.find_track_mut(track_hash).ok_or_else(|| {
            StateError::Core(CoreError::UnresolvedReference(format!(
                "track {track_hash:#x}"
            )))
        })?;
        let lane = track.lane_mut(rtype, lane_idx);
        let at = lane.insert_region(region);
        let id = lane.regions[at].id;
        self.refresh_link_members();
        Ok(id)
    }

    /// Remove the region a stable id names. The caller handles link-group
    /// bookkeeping before removal.
    pub fn remove_region(&mut self, id: &RegionId) -> StateResult<Region> {
        let track = self.find_track_mut(id.track).ok_or_else(|| {
            StateError::Core(CoreError::UnresolvedReference(format!(
                "track {:#x}",
                id.track
            )))
        })?;
        let lane = track.lane_mut(id.rtype, id.lane);
        let matches_slot = lane
            .regions
            .get(id.idx)
            .is_some_and(|r| r.id.same_slot(id));
        if !matches_slot {
            return Err(StateError::Core(CoreError::UnresolvedReference(format!(
                "region at track {:#x} lane {} idx {}",
                id.track, id.lane, id.idx
            ))));
        }
        let Some(removed) = lane.remove_region(id.idx) else {
            return Err(StateError::Core(CoreError::UnresolvedReference(format!(
                "region at track {:#x} lane {} idx {}",
                id.track, id.lane, id.idx
            ))));
        };
        self.refresh_link_members();
        Ok(removed)
    }

    /// Re-stamp registry membership from the live regions' own membership
    /// fields. Run after any renumbering.
    pub fn refresh_link_members(&mut self) {
        let live = self.all_region_ids();
        self.link_groups.refresh_members(live);
    }

    /// Re-derive every cached frame count. Run after any tempo map edit.
    pub fn update_frames(&mut self) {
        for t in &mut self.tracks {
            t.update_frames(&self.tempo_map);
        }
        for m in &mut self.markers {
            m.pos.update_frames(&self.tempo_map);
        }
        for s in &mut self.scales {
            s.pos.update_frames(&self.tempo_map);
        }
    }

    /// End of the last region on any track
    pub fn end_position(&self) -> Position {
        self.tracks
            .iter()
            .filter_map(|t| t.end_position())
            .fold(Position::ZERO, Position::max)
    }

    /// Re-resolve an arranger object clone against the live model.
    pub fn resolve(&self, obj: &ArrangerObject) -> Option<ArrangerObject> {
        match obj {
            ArrangerObject::Region(r) => {
                self.find_region(&r.id).cloned().map(ArrangerObject::Region)
            }
            ArrangerObject::MidiNote { owner, .. } => {
                self.find_note(owner).map(|n| ArrangerObject::MidiNote {
                    owner: *owner,
                    note: *n,
                })
            }
            ArrangerObject::AutomationPoint { owner, .. } => self
                .find_automation_point(owner)
                .map(|p| ArrangerObject::AutomationPoint {
                    owner: *owner,
                    point: *p,
                }),
            ArrangerObject::ChordHit { owner, .. } => {
                self.find_chord_hit(owner).map(|h| ArrangerObject::ChordHit {
                    owner: *owner,
                    hit: *h,
                })
            }
            ArrangerObject::Marker { index, .. } => {
                self.markers.get(*index).map(|m| ArrangerObject::Marker {
                    index: *index,
                    marker: m.clone(),
                })
            }
            ArrangerObject::ScaleObject { index, .. } => {
                self.scales.get(*index).map(|s| ArrangerObject::ScaleObject {
                    index: *index,
                    scale: *s,
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Full structural check: region invariants, lane ordering, id
    /// stamping, and two-way link-group consistency.
    pub fn validate(&self) -> StateResult<()> {
        for t in &self.tracks {
            let lane_sets: [(&[crate::Lane], RegionType); 2] = [
                (&t.lanes, t.lane_region_type()),
                (&t.automation_lanes, RegionType::Automation),
            ];
            for (lanes, expected_type) in lane_sets {
                for (lane_idx, lane) in lanes.iter().enumerate() {
                    let mut prev = f64::NEG_INFINITY;
                    for (i, r) in lane.regions.iter().enumerate() {
                        r.validate()?;
                        if r.id.rtype != expected_type
                            || r.id.track != t.name_hash
                            || r.id.lane != lane_idx
                            || r.id.idx != i
                        {
                            return Err(StateError::Core(CoreError::UnresolvedReference(
                                format!("region '{}' id out of step with its slot", r.name),
                            )));
                        }
                        if r.pos.ticks < prev {
                            return Err(StateError::Core(CoreError::InvalidRange(format!(
                                "lane {lane_idx} on '{}' not sorted by position",
                                t.name
                            ))));
                        }
                        prev = r.pos.ticks;
                        if let Some(gid) = r.id.link_group {
                            let in_group = self
                                .link_groups
                                .group(gid)
                                .is_some_and(|g| g.members.iter().any(|m| m.same_slot(&r.id)));
                            if !in_group {
                                return Err(StateError::Core(
                                    CoreError::LinkGroupInconsistency(format!(
                                        "region '{}' claims group {gid} but the registry disagrees",
                                        r.name
                                    )),
                                ));
                            }
                        }
                    }
                }
            }
        }
        for gid in self.link_groups.group_ids() {
            let Some(group) = self.link_groups.group(gid) else {
                continue;
            };
            for m in &group.members {
                let ok = self
                    .find_region(m)
                    .is_some_and(|r| r.id.link_group == Some(gid));
                if !ok {
                    return Err(StateError::Core(CoreError::LinkGroupInconsistency(
                        format!("group {gid} lists a member that does not claim it"),
                    )));
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> StateResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StateError::ActionFailed(format!("serialize: {e}")))
    }

    pub fn from_json(json: &str) -> StateResult<Self> {
        let mut project: Project = serde_json::from_str(json)
            .map_err(|e| StateError::ActionFailed(format!("deserialize: {e}")))?;
        project.tempo_map.rebuild_cache();
        project.update_frames();
        project.validate()?;
        Ok(project)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackKind;

    fn project_with_track() -> Project {
        let mut p = Project::new("test", 48000);
        p.tracks.push(Track::new("Piano", TrackKind::Midi));
        p
    }

    fn midi_region(p: &Project, start: f64, end: f64) -> Region {
        let hash = p.tracks[0].name_hash;
        Region::new(
            RegionId::new(RegionType::Midi, hash, 0, 0),
            "r",
            Position::from_ticks(start, &p.tempo_map),
            Position::from_ticks(end, &p.tempo_map),
            RegionData::Midi { notes: Vec::new() },
            &p.tempo_map,
        )
    }

    #[test]
    fn test_add_find_remove_region() {
        let mut p = project_with_track();
        let r = midi_region(&p, 0.0, 3840.0);
        let id = p.add_region(r).unwrap();
        assert!(p.find_region(&id).is_some());
        let removed = p.remove_region(&id).unwrap();
        assert_eq!(removed.name, "r");
        assert!(p.find_region(&id).is_none());
    }

    #[test]
    fn test_add_renumbers_later_regions() {
        let mut p = project_with_track();
        let r2 = midi_region(&p, 3840.0, 7680.0);
        let id2 = p.add_region(r2).unwrap();
        assert_eq!(id2.idx, 0);
        // inserting before shifts the existing region to idx 1
        let r1 = midi_region(&p, 0.0, 3840.0);
        let id1 = p.add_region(r1).unwrap();
        assert_eq!(id1.idx, 0);
        let lane = &p.tracks[0].lanes[0];
        assert_eq!(lane.regions[1].id.idx, 1);
        assert!((lane.regions[1].pos.ticks - 3840.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_catches_link_mismatch() {
        let mut p = project_with_track();
        let mut r = midi_region(&p, 0.0, 3840.0);
        r.id.link_group = Some(7);
        let lane = p.tracks[0].lane_mut(RegionType::Midi, 0);
        lane.insert_region(r);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let mut p = project_with_track();
        let r = midi_region(&p, 0.0, 3840.0);
        p.add_region(r).unwrap();
        p.markers
            .push(Marker::new("intro", Position::from_ticks(0.0, &p.tempo_map)));

        let json = p.to_json().unwrap();
        let back = Project::from_json(&json).unwrap();
        assert_eq!(back.tracks.len(), 1);
        assert_eq!(back.tracks[0].lanes[0].regions.len(), 1);
        assert_eq!(back.markers[0].name, "intro");
        assert_eq!(
            back.tracks[0].lanes[0].regions[0].end_pos.frames,
            p.tracks[0].lanes[0].regions[0].end_pos.frames
        );
    }

    #[test]
    fn test_update_frames_after_tempo_change() {
        let mut p = project_with_track();
        let r = midi_region(&p, 0.0, 3840.0);
        let id = p.add_region(r).unwrap();
        let before = p.find_region(&id).unwrap().end_pos.frames;
        p.tempo_map.set_tempo_at_tick(0, 60.0);
        p.update_frames();
        let after = p.find_region(&id).unwrap().end_pos.frames;
        assert_eq!(after, before * 2);
    }
}
