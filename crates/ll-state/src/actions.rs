//! Undoable actions
//!
//! Every user-visible mutation is an action object holding deep clones of
//! the objects it touches plus whatever it needs to reverse itself. An
//! action receives `&mut Project` on every call; it never caches pointers,
//! only stable ids, so do/undo/redo still resolve after the project has
//! been saved and reloaded in between.
//!
//! After a mutation that renumbers lanes, the action re-snapshots the new
//! ids into its stored clones so the inverse operation targets the right
//! slots.

use serde::{Deserialize, Serialize};

use ll_core::{ClipId, LinkGroupId, Position, RegionId, RegionType, TrackNameHash};

use crate::{
    merge_regions, ArrangerObject, AutomationPoint, Project, Region, RegionData, ResizeKind,
    Selection, StateError, StateResult,
};

// ═══════════════════════════════════════════════════════════════════════════════
// ACTION TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// A reversible project mutation.
///
/// `execute` is called for both the initial do and every redo. Implementors
/// keep enough state to make `undo` exact. `finalize` runs once when the
/// action falls off a bounded stack and is the place to release resources
/// held only for undo.
pub trait Action: Send {
    fn describe(&self) -> String;

    fn execute(&mut self, project: &mut Project) -> StateResult<()>;

    fn undo(&mut self, project: &mut Project) -> StateResult<()>;

    /// How many consecutive actions (this one included) collapse into a
    /// single undo step.
    fn num_actions(&self) -> usize {
        1
    }

    /// Pool clips this stored action still references for undo
    fn referenced_clips(&self) -> Vec<ClipId> {
        Vec::new()
    }

    /// Called when the action is evicted and will never run again.
    fn finalize(&mut self, _project: &mut Project) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Record of a link membership broken by delete/split, for undo
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinkRestore {
    group: LinkGroupId,
    /// Members orphaned because the group dissolved
    orphans: Vec<RegionId>,
}

/// Break a region's link membership, dissolving the group if it drops
/// below two members. Returns what undo needs to put it back.
fn unlink_region(project: &mut Project, id: &RegionId) -> Option<LinkRestore> {
    let group = id.link_group?;
    let orphans = project.link_groups.remove_member(group, id);
    for orphan in &orphans {
        if let Some(r) = project.find_region_mut(orphan) {
            r.id.link_group = None;
        }
    }
    if let Some(r) = project.find_region_mut(id) {
        r.id.link_group = None;
    }
    project.refresh_link_members();
    Some(LinkRestore { group, orphans })
}

/// Reverse of [`unlink_region`]: `member` is the region whose membership
/// was broken (already re-inserted with its original `link_group`).
fn restore_link(project: &mut Project, restore: &LinkRestore, member: &RegionId) {
    project.link_groups.restore_group(restore.group);
    if let Some(r) = project.find_region_mut(member) {
        r.id.link_group = Some(restore.group);
    }
    for orphan in &restore.orphans {
        if let Some(r) = project.find_region_mut(orphan) {
            r.id.link_group = Some(restore.group);
        }
    }
    project.refresh_link_members();
}

/// Copy a region's content onto every sibling in its link group.
fn propagate_region_content(project: &mut Project, id: &RegionId) {
    let Some(group) = id.link_group else { return };
    let Some(data) = project.find_region(id).map(|r| r.data.clone()) else {
        return;
    };
    for sibling in project.link_groups.siblings(group, id) {
        if let Some(r) = project.find_region_mut(&sibling) {
            r.data = data.clone();
        }
    }
}

/// Descending structural order so batch removals keep later ids valid
fn sort_ids_for_removal(ids: &mut [RegionId]) {
    ids.sort_by(|a, b| (b.track, b.lane, b.idx).cmp(&(a.track, a.lane, a.idx)));
}

fn shifted_track(
    project: &Project,
    hash: TrackNameHash,
    delta: isize,
    rtype: RegionType,
) -> StateResult<TrackNameHash> {
    if delta == 0 {
        return Ok(hash);
    }
    let idx = project
        .tracks
        .iter()
        .position(|t| t.name_hash == hash)
        .ok_or_else(|| StateError::ActionFailed(format!("unknown track {hash:#x}")))?;
    let new = idx as isize + delta;
    if new < 0 || new as usize >= project.tracks.len() {
        return Err(StateError::ActionFailed(
            "track shift out of range".to_string(),
        ));
    }
    let target = &project.tracks[new as usize];
    if rtype != RegionType::Automation && target.lane_region_type() != rtype {
        return Err(StateError::ActionFailed(format!(
            "track '{}' cannot hold this region type",
            target.name
        )));
    }
    Ok(target.name_hash)
}

fn shifted_lane(lane: usize, delta: isize) -> StateResult<usize> {
    let new = lane as isize + delta;
    if new < 0 {
        return Err(StateError::ActionFailed("lane shift below zero".to_string()));
    }
    Ok(new as usize)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CREATE / DELETE
// ═══════════════════════════════════════════════════════════════════════════════

/// Create regions from clones, or delete live regions, reversibly.
pub struct CreateOrDeleteAction {
    create: bool,
    regions: Vec<Region>,
    link_restores: Vec<(usize, LinkRestore)>,
    num_actions: usize,
}

impl CreateOrDeleteAction {
    pub fn create(regions: Vec<Region>) -> Self {
        Self {
            create: true,
            regions,
            link_restores: Vec::new(),
            num_actions: 1,
        }
    }

    pub fn delete(selection: &Selection) -> Self {
        Self {
            create: false,
            regions: selection.regions().cloned().collect(),
            link_restores: Vec::new(),
            num_actions: 1,
        }
    }

    pub fn with_num_actions(mut self, n: usize) -> Self {
        self.num_actions = n.max(1);
        self
    }

    fn insert_all(&mut self, project: &mut Project) -> StateResult<()> {
        // ascending position keeps later inserts from shifting earlier
        // ones; iterate by index so link_restores stay aligned
        let mut order: Vec<usize> = (0..self.regions.len()).collect();
        order.sort_by(|&a, &b| {
            self.regions[a]
                .pos
                .ticks
                .total_cmp(&self.regions[b].pos.ticks)
        });
        for i in order {
            let id = project.add_region(self.regions[i].clone())?;
            self.regions[i].id = id;
        }
        Ok(())
    }

    fn remove_all(&mut self, project: &mut Project) -> StateResult<()> {
        self.link_restores.clear();
        let mut order: Vec<usize> = (0..self.regions.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&self.regions[a].id, &self.regions[b].id);
            (rb.track, rb.lane, rb.idx).cmp(&(ra.track, ra.lane, ra.idx))
        });
        for i in order {
            let id = self.regions[i].id;
            if let Some(restore) = unlink_region(project, &id) {
                self.link_restores.push((i, restore));
            }
            let mut removed_id = id;
            removed_id.link_group = None;
            let removed = project.remove_region(&removed_id)?;
            // keep the live state for re-creation, but remember membership
            let group = id.link_group;
            self.regions[i] = removed;
            self.regions[i].id.link_group = group;
        }
        Ok(())
    }
}

impl Action for CreateOrDeleteAction {
    fn describe(&self) -> String {
        let verb = if self.create { "Create" } else { "Delete" };
        format!("{verb} {} region(s)", self.regions.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        if self.create {
            self.insert_all(project)
        } else {
            self.remove_all(project)
        }
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        if self.create {
            self.remove_all(project)
        } else {
            self.insert_all(project)?;
            let restores = std::mem::take(&mut self.link_restores);
            for (i, restore) in &restores {
                let member = self.regions[*i].id;
                restore_link(project, restore, &member);
            }
            self.link_restores = restores;
            Ok(())
        }
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn referenced_clips(&self) -> Vec<ClipId> {
        self.regions
            .iter()
            .filter_map(|r| match &r.data {
                RegionData::Audio { clip_id, .. } => Some(*clip_id),
                _ => None,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOVE / DUPLICATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Move a selection by deltas, or insert shifted copies of it.
pub struct MoveOrDuplicateAction {
    duplicate: bool,
    objects: Vec<ArrangerObject>,
    tick_delta: f64,
    track_delta: isize,
    lane_delta: isize,
    /// The caller already applied the move to the live objects (drag
    /// semantics); the first execute only records.
    already_moved: bool,
    first_run: bool,
    created: Vec<ArrangerObject>,
    num_actions: usize,
}

impl MoveOrDuplicateAction {
    pub fn r#move(selection: &Selection, tick_delta: f64) -> Self {
        Self::new(false, selection, tick_delta)
    }

    pub fn duplicate(selection: &Selection, tick_delta: f64) -> Self {
        Self::new(true, selection, tick_delta)
    }

    fn new(duplicate: bool, selection: &Selection, tick_delta: f64) -> Self {
        Self {
            duplicate,
            objects: selection.objects().to_vec(),
            tick_delta,
            track_delta: 0,
            lane_delta: 0,
            already_moved: false,
            first_run: true,
            created: Vec::new(),
            num_actions: 1,
        }
    }

    pub fn with_track_delta(mut self, delta: isize) -> Self {
        self.track_delta = delta;
        self
    }

    pub fn with_lane_delta(mut self, delta: isize) -> Self {
        self.lane_delta = delta;
        self
    }

    /// Mark the live objects as already sitting at the target position.
    pub fn already_moved(mut self) -> Self {
        self.already_moved = true;
        self
    }

    pub fn with_num_actions(mut self, n: usize) -> Self {
        self.num_actions = n.max(1);
        self
    }

    fn apply_delta(&mut self, project: &mut Project, sign: i32) -> StateResult<()> {
        let tick_delta = self.tick_delta * sign as f64;
        let track_delta = self.track_delta * sign as isize;
        let lane_delta = self.lane_delta * sign as isize;

        // reject before touching anything so a bad delta cannot leave the
        // project half-mutated
        for obj in &self.objects {
            if obj.pos().ticks + tick_delta < -ll_core::POSITION_EPSILON {
                return Err(StateError::Core(ll_core::CoreError::InvalidPosition(
                    format!("move would land at {}", obj.pos().ticks + tick_delta),
                )));
            }
            if let ArrangerObject::Region(r) = obj {
                shifted_track(project, r.id.track, track_delta, r.id.rtype)?;
                shifted_lane(r.id.lane, lane_delta)?;
            }
        }

        // regions get pulled out, shifted, re-inserted so lane order and
        // ids stay consistent
        let mut region_slots: Vec<usize> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o, ArrangerObject::Region(_)))
            .map(|(i, _)| i)
            .collect();
        region_slots.sort_by(|&a, &b| {
            let (ArrangerObject::Region(ra), ArrangerObject::Region(rb)) =
                (&self.objects[a], &self.objects[b])
            else {
                unreachable!()
            };
            (rb.id.track, rb.id.lane, rb.id.idx).cmp(&(ra.id.track, ra.id.lane, ra.id.idx))
        });

        let mut pulled: Vec<(usize, Region)> = Vec::new();
        for i in region_slots {
            let ArrangerObject::Region(r) = &self.objects[i] else {
                unreachable!()
            };
            let removed = project.remove_region(&r.id)?;
            pulled.push((i, removed));
        }
        for (_, region) in pulled.iter_mut() {
            region.id.track =
                shifted_track(project, region.id.track, track_delta, region.id.rtype)?;
            region.id.lane = shifted_lane(region.id.lane, lane_delta)?;
            region.move_by_ticks(tick_delta, &project.tempo_map);
            region.pos.validate()?;
        }
        // re-insert ascending so earlier inserts keep their ids
        pulled.sort_by(|a, b| a.1.pos.ticks.total_cmp(&b.1.pos.ticks));
        for (i, mut region) in pulled {
            let id = project.add_region(region.clone())?;
            region.id = id;
            self.objects[i] = ArrangerObject::Region(region);
        }

        // children and timeline-global objects move in place
        let map = project.tempo_map.clone();
        for obj in &mut self.objects {
            match obj {
                ArrangerObject::Region(_) => {}
                ArrangerObject::MidiNote { owner, note } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("note owner vanished".to_string())
                    })?;
                    let RegionData::Midi { notes } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not MIDI".to_string()));
                    };
                    let live = notes.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("note index vanished".to_string())
                    })?;
                    live.pos.add_ticks(tick_delta, &map);
                    live.end_pos.add_ticks(tick_delta, &map);
                    *note = *live;
                }
                ArrangerObject::AutomationPoint { owner, point } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("point owner vanished".to_string())
                    })?;
                    let RegionData::Automation { points } = &mut region.data else {
                        return Err(StateError::ActionFailed(
                            "owner is not automation".to_string(),
                        ));
                    };
                    let live = points.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("point index vanished".to_string())
                    })?;
                    live.pos.add_ticks(tick_delta, &map);
                    *point = *live;
                }
                ArrangerObject::ChordHit { owner, hit } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("hit owner vanished".to_string())
                    })?;
                    let RegionData::Chord { hits } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not chord".to_string()));
                    };
                    let live = hits.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("hit index vanished".to_string())
                    })?;
                    live.pos.add_ticks(tick_delta, &map);
                    *hit = *live;
                }
                ArrangerObject::Marker { index, marker } => {
                    let live = project.markers.get_mut(*index).ok_or_else(|| {
                        StateError::ActionFailed("marker vanished".to_string())
                    })?;
                    live.pos.add_ticks(tick_delta, &map);
                    *marker = live.clone();
                }
                ArrangerObject::ScaleObject { index, scale } => {
                    let live = project.scales.get_mut(*index).ok_or_else(|| {
                        StateError::ActionFailed("scale vanished".to_string())
                    })?;
                    live.pos.add_ticks(tick_delta, &map);
                    *scale = *live;
                }
            }
        }
        Ok(())
    }

    fn insert_copies(&mut self, project: &mut Project) -> StateResult<()> {
        self.created.clear();
        let map = project.tempo_map.clone();
        for obj in &self.objects {
            match obj {
                ArrangerObject::Region(r) => {
                    let mut copy = r.clone();
                    copy.id.link_group = None;
                    copy.id.track =
                        shifted_track(project, copy.id.track, self.track_delta, copy.id.rtype)?;
                    copy.id.lane = shifted_lane(copy.id.lane, self.lane_delta)?;
                    copy.move_by_ticks(self.tick_delta, &map);
                    copy.pos.validate()?;
                    let id = project.add_region(copy.clone())?;
                    copy.id = id;
                    self.created.push(ArrangerObject::Region(copy));
                }
                ArrangerObject::MidiNote { owner, note } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("note owner vanished".to_string())
                    })?;
                    let RegionData::Midi { notes } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not MIDI".to_string()));
                    };
                    let mut copy = *note;
                    copy.pos.add_ticks(self.tick_delta, &map);
                    copy.end_pos.add_ticks(self.tick_delta, &map);
                    notes.push(copy);
                    self.created.push(ArrangerObject::MidiNote {
                        owner: ll_core::ChildId {
                            region: owner.region,
                            index: notes.len() - 1,
                        },
                        note: copy,
                    });
                }
                ArrangerObject::AutomationPoint { owner, point } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("point owner vanished".to_string())
                    })?;
                    let RegionData::Automation { points } = &mut region.data else {
                        return Err(StateError::ActionFailed(
                            "owner is not automation".to_string(),
                        ));
                    };
                    let mut copy = *point;
                    copy.pos.add_ticks(self.tick_delta, &map);
                    points.push(copy);
                    self.created.push(ArrangerObject::AutomationPoint {
                        owner: ll_core::ChildId {
                            region: owner.region,
                            index: points.len() - 1,
                        },
                        point: copy,
                    });
                }
                ArrangerObject::ChordHit { owner, hit } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("hit owner vanished".to_string())
                    })?;
                    let RegionData::Chord { hits } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not chord".to_string()));
                    };
                    let mut copy = *hit;
                    copy.pos.add_ticks(self.tick_delta, &map);
                    hits.push(copy);
                    self.created.push(ArrangerObject::ChordHit {
                        owner: ll_core::ChildId {
                            region: owner.region,
                            index: hits.len() - 1,
                        },
                        hit: copy,
                    });
                }
                ArrangerObject::Marker { marker, .. } => {
                    let mut copy = marker.clone();
                    copy.pos.add_ticks(self.tick_delta, &map);
                    project.markers.push(copy.clone());
                    self.created.push(ArrangerObject::Marker {
                        index: project.markers.len() - 1,
                        marker: copy,
                    });
                }
                ArrangerObject::ScaleObject { scale, .. } => {
                    let mut copy = *scale;
                    copy.pos.add_ticks(self.tick_delta, &map);
                    project.scales.push(copy);
                    self.created.push(ArrangerObject::ScaleObject {
                        index: project.scales.len() - 1,
                        scale: copy,
                    });
                }
            }
        }
        Ok(())
    }

    fn remove_copies(&mut self, project: &mut Project) -> StateResult<()> {
        let mut created = std::mem::take(&mut self.created);
        // descending structural order; see sort_for_removal
        created.sort_by(|a, b| removal_key(b).cmp(&removal_key(a)));
        for obj in &created {
            match obj {
                ArrangerObject::Region(r) => {
                    project.remove_region(&r.id)?;
                }
                ArrangerObject::MidiNote { owner, .. } => {
                    if let Some(region) = project.find_region_mut(&owner.region) {
                        if let RegionData::Midi { notes } = &mut region.data {
                            notes.remove(owner.index);
                        }
                    }
                }
                ArrangerObject::AutomationPoint { owner, .. } => {
                    if let Some(region) = project.find_region_mut(&owner.region) {
                        if let RegionData::Automation { points } = &mut region.data {
                            points.remove(owner.index);
                        }
                    }
                }
                ArrangerObject::ChordHit { owner, .. } => {
                    if let Some(region) = project.find_region_mut(&owner.region) {
                        if let RegionData::Chord { hits } = &mut region.data {
                            hits.remove(owner.index);
                        }
                    }
                }
                ArrangerObject::Marker { index, .. } => {
                    project.markers.remove(*index);
                }
                ArrangerObject::ScaleObject { index, .. } => {
                    project.scales.remove(*index);
                }
            }
        }
        Ok(())
    }
}

fn removal_key(o: &ArrangerObject) -> (u32, usize, usize, usize) {
    match o {
        ArrangerObject::Region(r) => (r.id.track, r.id.lane, r.id.idx, 0),
        ArrangerObject::MidiNote { owner, .. }
        | ArrangerObject::AutomationPoint { owner, .. }
        | ArrangerObject::ChordHit { owner, .. } => (
            owner.region.track,
            owner.region.lane,
            owner.region.idx,
            owner.index,
        ),
        ArrangerObject::Marker { index, .. } | ArrangerObject::ScaleObject { index, .. } => {
            (0, 0, 0, *index)
        }
    }
}

impl Action for MoveOrDuplicateAction {
    fn describe(&self) -> String {
        let verb = if self.duplicate { "Duplicate" } else { "Move" };
        format!("{verb} {} object(s)", self.objects.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        if self.duplicate {
            return self.insert_copies(project);
        }
        if self.already_moved && self.first_run {
            self.first_run = false;
            return Ok(());
        }
        self.first_run = false;
        self.apply_delta(project, 1)
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        if self.duplicate {
            self.remove_copies(project)
        } else {
            self.apply_delta(project, -1)
        }
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINK
// ═══════════════════════════════════════════════════════════════════════════════

/// Insert a shifted clone of every selected region and link each clone
/// with its original in a shared content group. Originals that were
/// already linked get the clone added to their existing group; unlinked
/// originals are paired with the clone in a fresh group.
pub struct LinkAction {
    regions: Vec<Region>,
    tick_delta: f64,
    track_delta: isize,
    lane_delta: isize,
    created: Vec<RegionId>,
    /// Groups allocated for previously unlinked originals, by index into
    /// `regions`; reused on redo so group ids stay stable across cycles.
    new_groups: Vec<(usize, LinkGroupId)>,
    num_actions: usize,
}

impl LinkAction {
    pub fn new(selection: &Selection, tick_delta: f64) -> StateResult<Self> {
        let regions: Vec<Region> = selection.regions().cloned().collect();
        if regions.is_empty() {
            return Err(StateError::ActionFailed(
                "linking needs at least 1 region".to_string(),
            ));
        }
        Ok(Self {
            regions,
            tick_delta,
            track_delta: 0,
            lane_delta: 0,
            created: Vec::new(),
            new_groups: Vec::new(),
            num_actions: 1,
        })
    }

    pub fn with_track_delta(mut self, delta: isize) -> Self {
        self.track_delta = delta;
        self
    }

    pub fn with_lane_delta(mut self, delta: isize) -> Self {
        self.lane_delta = delta;
        self
    }

    pub fn with_num_actions(mut self, n: usize) -> Self {
        self.num_actions = n.max(1);
        self
    }
}

/// Inserting into a lane shifts every stored id at or after the new slot.
fn bump_after_insert(id: &mut RegionId, inserted: &RegionId) {
    if id.rtype == inserted.rtype
        && id.track == inserted.track
        && id.lane == inserted.lane
        && id.idx >= inserted.idx
    {
        id.idx += 1;
    }
}

/// Removing from a lane shifts every stored id after the freed slot.
fn drop_after_remove(id: &mut RegionId, removed: &RegionId) {
    if id.rtype == removed.rtype
        && id.track == removed.track
        && id.lane == removed.lane
        && id.idx > removed.idx
    {
        id.idx -= 1;
    }
}

impl Action for LinkAction {
    fn describe(&self) -> String {
        format!("Link {} region(s)", self.regions.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        self.created.clear();
        let map = project.tempo_map.clone();
        for i in 0..self.regions.len() {
            let orig_id = self.regions[i].id;
            let recorded = self
                .new_groups
                .iter()
                .find(|(j, _)| *j == i)
                .map(|&(_, g)| g);
            let group = match orig_id.link_group.or(recorded) {
                Some(g) => {
                    project.link_groups.restore_group(g);
                    g
                }
                None => {
                    let g = project.link_groups.add_group();
                    self.new_groups.push((i, g));
                    g
                }
            };
            let live = project.find_region_mut(&orig_id).ok_or_else(|| {
                StateError::ActionFailed(format!("region to link vanished at idx {}", orig_id.idx))
            })?;
            live.id.link_group = Some(group);
            let mut copy = live.clone();
            self.regions[i].id.link_group = Some(group);
            copy.id.track =
                shifted_track(project, copy.id.track, self.track_delta, copy.id.rtype)?;
            copy.id.lane = shifted_lane(copy.id.lane, self.lane_delta)?;
            copy.move_by_ticks(self.tick_delta, &map);
            copy.pos.validate()?;
            let inserted = project.add_region(copy)?;
            for r in &mut self.regions {
                bump_after_insert(&mut r.id, &inserted);
            }
            for c in &mut self.created {
                bump_after_insert(c, &inserted);
            }
            self.created.push(inserted);
        }
        project.refresh_link_members();
        project.validate()?;
        log::info!("linked {} region pair(s)", self.regions.len());
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        let mut order: Vec<usize> = (0..self.created.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&self.created[a], &self.created[b]);
            (rb.track, rb.lane, rb.idx).cmp(&(ra.track, ra.lane, ra.idx))
        });
        for i in order {
            let id = self.created[i];
            // breaking the clone's membership dissolves the pairs this
            // action formed and shrinks pre-existing groups back down
            unlink_region(project, &id);
            let removed = project.remove_region(&id)?;
            for r in &mut self.regions {
                drop_after_remove(&mut r.id, &removed.id);
            }
            for c in &mut self.created {
                drop_after_remove(c, &removed.id);
            }
        }
        self.created.clear();
        for (i, _) in &self.new_groups {
            self.regions[*i].id.link_group = None;
        }
        project.refresh_link_members();
        project.validate()?;
        Ok(())
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn referenced_clips(&self) -> Vec<ClipId> {
        self.regions
            .iter()
            .filter_map(|r| match &r.data {
                RegionData::Audio { clip_id, .. } => Some(*clip_id),
                _ => None,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESIZE
// ═══════════════════════════════════════════════════════════════════════════════

/// Resize regions (edges, loop edges, stretch) or trim MIDI notes.
pub struct ResizeAction {
    kind: ResizeKind,
    objects: Vec<ArrangerObject>,
    delta_ticks: f64,
}

impl ResizeAction {
    pub fn new(selection: &Selection, kind: ResizeKind, delta_ticks: f64) -> Self {
        Self {
            kind,
            objects: selection.objects().to_vec(),
            delta_ticks,
        }
    }

    fn apply(&mut self, project: &mut Project, delta: f64) -> StateResult<()> {
        let map = project.tempo_map.clone();
        for obj in &mut self.objects {
            match obj {
                ArrangerObject::Region(stored) => {
                    let mut region = project.remove_region(&stored.id)?;
                    region.resize(self.kind, delta, &map)?;
                    let id = project.add_region(region.clone())?;
                    region.id = id;
                    *stored = region;
                }
                ArrangerObject::MidiNote { owner, note } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("note owner vanished".to_string())
                    })?;
                    let RegionData::Midi { notes } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not MIDI".to_string()));
                    };
                    let live = notes.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("note index vanished".to_string())
                    })?;
                    match self.kind {
                        ResizeKind::StartEdge => live.pos.add_ticks(delta, &map),
                        ResizeKind::EndEdge => live.end_pos.add_ticks(delta, &map),
                        _ => {
                            return Err(StateError::ActionFailed(
                                "notes only support edge resizes".to_string(),
                            ))
                        }
                    }
                    if live.length_ticks() <= 0.0 {
                        return Err(StateError::Core(ll_core::CoreError::InvalidRange(
                            "note resized to non-positive length".to_string(),
                        )));
                    }
                    *note = *live;
                }
                _ => {
                    return Err(StateError::ActionFailed(
                        "object kind cannot be resized".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

impl Action for ResizeAction {
    fn describe(&self) -> String {
        format!("Resize {} object(s)", self.objects.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        self.apply(project, self.delta_ticks)
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        let delta = -self.delta_ticks;
        self.apply(project, delta)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPLIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Split one region into two at a timeline position.
pub struct SplitAction {
    region: Region,
    pos: Position,
    halves: Vec<Region>,
    link_restore: Option<LinkRestore>,
}

impl SplitAction {
    pub fn new(region: Region, pos: Position) -> Self {
        Self {
            region,
            pos,
            halves: Vec::new(),
            link_restore: None,
        }
    }
}

impl Action for SplitAction {
    fn describe(&self) -> String {
        format!("Split region '{}'", self.region.name)
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        let id = self.region.id;
        self.link_restore = unlink_region(project, &id);
        let mut live_id = id;
        live_id.link_group = None;
        let removed = project.remove_region(&live_id)?;
        let group = id.link_group;
        self.region = removed;
        self.region.id.link_group = group;

        let (mut r1, mut r2) = self.region.split_at(self.pos, &project.tempo_map)?;
        let id1 = project.add_region(r1.clone())?;
        r1.id = id1;
        let id2 = project.add_region(r2.clone())?;
        r2.id = id2;
        self.halves = vec![r1, r2];
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        let mut ids: Vec<RegionId> = self.halves.iter().map(|r| r.id).collect();
        sort_ids_for_removal(&mut ids);
        for id in ids {
            project.remove_region(&id)?;
        }
        self.halves.clear();
        let id = project.add_region(self.region.clone())?;
        let group = self.region.id.link_group;
        self.region.id = id;
        self.region.id.link_group = group;
        if let Some(restore) = self.link_restore.take() {
            restore_link(project, &restore, &self.region.id);
            self.link_restore = Some(restore);
        }
        Ok(())
    }

    fn referenced_clips(&self) -> Vec<ClipId> {
        match &self.region.data {
            RegionData::Audio { clip_id, .. } => vec![*clip_id],
            _ => Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Merge contiguous regions into one; for audio the audible content is
/// rendered into a fresh pool clip.
pub struct MergeAction {
    regions: Vec<Region>,
    merged: Option<Region>,
    rendered_clip: Option<ClipId>,
}

impl MergeAction {
    pub fn new(selection: &Selection) -> StateResult<Self> {
        let mut regions: Vec<Region> = selection.regions().cloned().collect();
        if regions.len() < 2 {
            return Err(StateError::ActionFailed(
                "merge needs at least 2 regions".to_string(),
            ));
        }
        regions.sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks));
        Ok(Self {
            regions,
            merged: None,
            rendered_clip: None,
        })
    }

    /// Unroll each source region's audible audio through its loop window
    /// into one flat clip.
    fn render_audio(&self, project: &Project) -> StateResult<(Vec<f32>, u16, u32)> {
        let mut channels = 2;
        let mut rate = project.tempo_map.sample_rate();
        let mut out = Vec::new();
        for r in &self.regions {
            let RegionData::Audio { clip_id, gain, .. } = &r.data else {
                return Err(StateError::ActionFailed(
                    "mixed data types in audio merge".to_string(),
                ));
            };
            let clip = project.pool.get(*clip_id).ok_or_else(|| {
                StateError::ActionFailed(format!("pool clip {clip_id} missing"))
            })?;
            channels = clip.channels;
            rate = clip.sample_rate;
            for f in 0..r.length_frames() {
                let local = r.timeline_frames_to_local(r.pos.frames + f, true).max(0);
                for ch in 0..channels {
                    out.push(clip.sample(ch, local as usize) * gain);
                }
            }
        }
        Ok((out, channels, rate))
    }
}

impl Action for MergeAction {
    fn describe(&self) -> String {
        format!("Merge {} regions", self.regions.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        // resolve live state before touching anything
        for r in &mut self.regions {
            let live = project.find_region(&r.id).ok_or_else(|| {
                StateError::ActionFailed(format!("merge input vanished at idx {}", r.id.idx))
            })?;
            *r = live.clone();
        }
        let mut merged = merge_regions(&self.regions, &project.tempo_map)?;

        if merged.id.rtype == RegionType::Audio {
            let (frames, channels, rate) = self.render_audio(project)?;
            let clip_id = match self.rendered_clip {
                // redo reuses the clip rendered the first time round
                Some(id) if project.pool.contains(id) => id,
                _ => {
                    let id = project.pool.add(crate::AudioClip::new(
                        format!("{} (merged)", merged.name),
                        channels,
                        rate,
                        frames,
                    ));
                    self.rendered_clip = Some(id);
                    id
                }
            };
            if let RegionData::Audio {
                clip_id: c,
                stretch_ratio,
                ..
            } = &mut merged.data
            {
                *c = clip_id;
                *stretch_ratio = 1.0;
            }
        }

        let mut ids: Vec<RegionId> = self.regions.iter().map(|r| r.id).collect();
        sort_ids_for_removal(&mut ids);
        for id in ids {
            project.remove_region(&id)?;
        }
        let id = project.add_region(merged.clone())?;
        merged.id = id;
        self.merged = Some(merged);
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        let merged = self
            .merged
            .take()
            .ok_or_else(|| StateError::ActionFailed("merge not executed".to_string()))?;
        project.remove_region(&merged.id)?;
        self.regions
            .sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks));
        for r in &mut self.regions {
            let id = project.add_region(r.clone())?;
            r.id = id;
        }
        Ok(())
    }

    fn referenced_clips(&self) -> Vec<ClipId> {
        let mut clips: Vec<ClipId> = self
            .regions
            .iter()
            .chain(self.merged.iter())
            .filter_map(|r| match &r.data {
                RegionData::Audio { clip_id, .. } => Some(*clip_id),
                _ => None,
            })
            .collect();
        clips.extend(self.rendered_clip);
        clips
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EDIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Overwrite non-positional fields (name, mute, velocity, value, region
/// content) with before/after snapshots. Content edits on a linked region
/// are mirrored onto its group siblings.
pub struct EditAction {
    before: Vec<ArrangerObject>,
    after: Vec<ArrangerObject>,
}

impl EditAction {
    /// `after` holds the desired end state; the matching live objects are
    /// snapshotted as the before state.
    pub fn new(project: &Project, after: Vec<ArrangerObject>) -> StateResult<Self> {
        let mut before = Vec::with_capacity(after.len());
        for obj in &after {
            let live = project.resolve(obj).ok_or_else(|| {
                StateError::ActionFailed("edit target does not exist".to_string())
            })?;
            before.push(live);
        }
        Ok(Self { before, after })
    }

    fn apply(project: &mut Project, objs: &[ArrangerObject]) -> StateResult<()> {
        for obj in objs {
            match obj {
                ArrangerObject::Region(r) => {
                    let live = project.find_region_mut(&r.id).ok_or_else(|| {
                        StateError::ActionFailed("edited region vanished".to_string())
                    })?;
                    live.name = r.name.clone();
                    live.muted = r.muted;
                    live.data = r.data.clone();
                    let id = live.id;
                    propagate_region_content(project, &id);
                }
                ArrangerObject::MidiNote { owner, note } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("note owner vanished".to_string())
                    })?;
                    let RegionData::Midi { notes } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not MIDI".to_string()));
                    };
                    let live = notes.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("note index vanished".to_string())
                    })?;
                    live.pitch = note.pitch;
                    live.velocity = note.velocity;
                    live.muted = note.muted;
                    propagate_region_content(project, &owner.region);
                }
                ArrangerObject::AutomationPoint { owner, point } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("point owner vanished".to_string())
                    })?;
                    let RegionData::Automation { points } = &mut region.data else {
                        return Err(StateError::ActionFailed(
                            "owner is not automation".to_string(),
                        ));
                    };
                    let live = points.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("point index vanished".to_string())
                    })?;
                    live.value = point.value.clamp(0.0, 1.0);
                    live.tension = point.tension;
                    propagate_region_content(project, &owner.region);
                }
                ArrangerObject::ChordHit { owner, hit } => {
                    let region = project.find_region_mut(&owner.region).ok_or_else(|| {
                        StateError::ActionFailed("hit owner vanished".to_string())
                    })?;
                    let RegionData::Chord { hits } = &mut region.data else {
                        return Err(StateError::ActionFailed("owner is not chord".to_string()));
                    };
                    let live = hits.get_mut(owner.index).ok_or_else(|| {
                        StateError::ActionFailed("hit index vanished".to_string())
                    })?;
                    live.chord_index = hit.chord_index;
                    propagate_region_content(project, &owner.region);
                }
                ArrangerObject::Marker { index, marker } => {
                    let live = project.markers.get_mut(*index).ok_or_else(|| {
                        StateError::ActionFailed("marker vanished".to_string())
                    })?;
                    live.name = marker.name.clone();
                    live.muted = marker.muted;
                }
                ArrangerObject::ScaleObject { index, scale } => {
                    let live = project.scales.get_mut(*index).ok_or_else(|| {
                        StateError::ActionFailed("scale vanished".to_string())
                    })?;
                    live.root = scale.root;
                    live.kind = scale.kind;
                    live.muted = scale.muted;
                }
            }
        }
        Ok(())
    }
}

impl Action for EditAction {
    fn describe(&self) -> String {
        format!("Edit {} object(s)", self.after.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        Self::apply(project, &self.after)
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        Self::apply(project, &self.before)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUANTIZE
// ═══════════════════════════════════════════════════════════════════════════════

/// Snap object starts (and optionally note ends) toward a tick grid.
pub struct QuantizeAction {
    objects: Vec<ArrangerObject>,
    before: Vec<ArrangerObject>,
    grid_ticks: f64,
    /// 0.0 = no movement, 1.0 = fully on the grid
    amount: f64,
    quantize_ends: bool,
}

impl QuantizeAction {
    pub fn new(selection: &Selection, grid_ticks: f64, amount: f64) -> StateResult<Self> {
        if grid_ticks <= 0.0 {
            return Err(StateError::ActionFailed(
                "quantize grid must be positive".to_string(),
            ));
        }
        Ok(Self {
            objects: selection.objects().to_vec(),
            before: Vec::new(),
            grid_ticks,
            amount: amount.clamp(0.0, 1.0),
            quantize_ends: false,
        })
    }

    pub fn with_quantized_ends(mut self) -> Self {
        self.quantize_ends = true;
        self
    }
}

fn snapped(ticks: f64, grid: f64, amount: f64) -> f64 {
    let target = (ticks / grid).round() * grid;
    (ticks + (target - ticks) * amount).max(0.0)
}

impl Action for QuantizeAction {
    fn describe(&self) -> String {
        format!("Quantize {} object(s)", self.objects.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        self.before.clear();
        let map = project.tempo_map.clone();
        let (grid, amount) = (self.grid_ticks, self.amount);
        for obj in &mut self.objects {
            let live = project.resolve(obj).ok_or_else(|| {
                StateError::ActionFailed("quantize target does not exist".to_string())
            })?;
            self.before.push(live.clone());

            let mut updated = live;
            let delta = snapped(updated.pos().ticks, grid, amount) - updated.pos().ticks;
            match &mut updated {
                ArrangerObject::Region(r) => {
                    r.move_by_ticks(delta, &map);
                }
                ArrangerObject::MidiNote { note, .. } => {
                    note.pos.add_ticks(delta, &map);
                    if self.quantize_ends {
                        let end = snapped(note.end_pos.ticks, grid, amount);
                        if end > note.pos.ticks {
                            note.end_pos = Position::from_ticks(end, &map);
                        }
                    } else {
                        note.end_pos.add_ticks(delta, &map);
                    }
                }
                ArrangerObject::AutomationPoint { point, .. } => point.pos.add_ticks(delta, &map),
                ArrangerObject::ChordHit { hit, .. } => hit.pos.add_ticks(delta, &map),
                ArrangerObject::Marker { marker, .. } => marker.pos.add_ticks(delta, &map),
                ArrangerObject::ScaleObject { scale, .. } => scale.pos.add_ticks(delta, &map),
            }
            write_back(project, &mut updated)?;
            *obj = updated;
        }
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        let mut before = std::mem::take(&mut self.before);
        for (obj, prev) in self.objects.iter_mut().zip(before.iter_mut()) {
            write_back(project, prev)?;
            *obj = prev.clone();
        }
        self.before = before;
        Ok(())
    }
}

/// Write an object clone's positional state over its live counterpart.
/// Regions are pulled and re-inserted so lane order survives; the clone's
/// id is updated to the post-insert id.
fn write_back(project: &mut Project, obj: &mut ArrangerObject) -> StateResult<()> {
    match obj {
        ArrangerObject::Region(r) => {
            let mut live = project.remove_region(&r.id)?;
            live.pos = r.pos;
            live.end_pos = r.end_pos;
            let id = project.add_region(live.clone())?;
            live.id = id;
            *r = live;
        }
        ArrangerObject::MidiNote { owner, note } => {
            let region = project
                .find_region_mut(&owner.region)
                .ok_or_else(|| StateError::ActionFailed("note owner vanished".to_string()))?;
            let RegionData::Midi { notes } = &mut region.data else {
                return Err(StateError::ActionFailed("owner is not MIDI".to_string()));
            };
            let live = notes
                .get_mut(owner.index)
                .ok_or_else(|| StateError::ActionFailed("note index vanished".to_string()))?;
            live.pos = note.pos;
            live.end_pos = note.end_pos;
        }
        ArrangerObject::AutomationPoint { owner, point } => {
            let region = project
                .find_region_mut(&owner.region)
                .ok_or_else(|| StateError::ActionFailed("point owner vanished".to_string()))?;
            let RegionData::Automation { points } = &mut region.data else {
                return Err(StateError::ActionFailed("owner is not automation".to_string()));
            };
            let live = points
                .get_mut(owner.index)
                .ok_or_else(|| StateError::ActionFailed("point index vanished".to_string()))?;
            live.pos = point.pos;
        }
        ArrangerObject::ChordHit { owner, hit } => {
            let region = project
                .find_region_mut(&owner.region)
                .ok_or_else(|| StateError::ActionFailed("hit owner vanished".to_string()))?;
            let RegionData::Chord { hits } = &mut region.data else {
                return Err(StateError::ActionFailed("owner is not chord".to_string()));
            };
            let live = hits
                .get_mut(owner.index)
                .ok_or_else(|| StateError::ActionFailed("hit index vanished".to_string()))?;
            live.pos = hit.pos;
        }
        ArrangerObject::Marker { index, marker } => {
            let live = project
                .markers
                .get_mut(*index)
                .ok_or_else(|| StateError::ActionFailed("marker vanished".to_string()))?;
            live.pos = marker.pos;
        }
        ArrangerObject::ScaleObject { index, scale } => {
            let live = project
                .scales
                .get_mut(*index)
                .ok_or_else(|| StateError::ActionFailed("scale vanished".to_string()))?;
            live.pos = scale.pos;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTOMATION FILL
// ═══════════════════════════════════════════════════════════════════════════════

/// Replace the point set of an automation region wholesale (curve drawing,
/// line tools, LFO fills).
pub struct AutomationFillAction {
    region_id: RegionId,
    before: Vec<AutomationPoint>,
    after: Vec<AutomationPoint>,
}

impl AutomationFillAction {
    pub fn new(region_id: RegionId, after: Vec<AutomationPoint>) -> Self {
        Self {
            region_id,
            before: Vec::new(),
            after,
        }
    }

    fn set_points(
        project: &mut Project,
        id: &RegionId,
        points: &[AutomationPoint],
    ) -> StateResult<Vec<AutomationPoint>> {
        let region = project
            .find_region_mut(id)
            .ok_or_else(|| StateError::ActionFailed("fill target vanished".to_string()))?;
        let RegionData::Automation { points: live } = &mut region.data else {
            return Err(StateError::ActionFailed(
                "fill target is not an automation region".to_string(),
            ));
        };
        let mut new_points = points.to_vec();
        new_points.sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks));
        let old = std::mem::replace(live, new_points);
        propagate_region_content(project, id);
        Ok(old)
    }
}

impl Action for AutomationFillAction {
    fn describe(&self) -> String {
        format!("Fill automation ({} points)", self.after.len())
    }

    fn execute(&mut self, project: &mut Project) -> StateResult<()> {
        self.before = Self::set_points(project, &self.region_id, &self.after)?;
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        Self::set_points(project, &self.region_id, &self.before)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
