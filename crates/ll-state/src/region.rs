//! Regions
//!
//! A region owns a rectangular window on its track plus an internal loop
//! window. Local content space is anchored at the region start:
//! `clip_start` selects the phase offset into the content at the region
//! start, and `[loop_start, loop_end)` is the window that repeats until the
//! region's outer end is reached. Children live in content space.
//!
//! Split, merge and resize keep the content-continuity law: splitting a
//! region and merging the halves back reproduces the original audible
//! content tick-for-tick.

use serde::{Deserialize, Serialize};

use ll_core::{ClipId, CoreError, CoreResult, Position, RegionId, RegionType, TempoMap};

use crate::{AutomationPoint, ChordHit, MidiNote};

// ═══════════════════════════════════════════════════════════════════════════════
// FADES
// ═══════════════════════════════════════════════════════════════════════════════

/// Fade curve types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FadeCurve {
    Linear,
    #[default]
    EqualPower,
    SCurve,
}

/// Non-destructive fade on an audio region edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FadeSettings {
    /// Fade length in frames (0 = no fade)
    pub length: u64,
    pub curve: FadeCurve,
}

impl FadeSettings {
    /// Gain at a frame offset into the fade (0.0 at the silent edge)
    pub fn gain_at(&self, position_in_fade: u64) -> f32 {
        if self.length == 0 {
            return 1.0;
        }
        let t = (position_in_fade as f64 / self.length as f64).clamp(0.0, 1.0);
        let g = match self.curve {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * std::f64::consts::FRAC_PI_2).sin(),
            FadeCurve::SCurve => (1.0 - (t * std::f64::consts::PI).cos()) * 0.5,
        };
        g as f32
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGION DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed region payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionData {
    Midi {
        notes: Vec<MidiNote>,
    },
    Audio {
        /// Opaque pool clip reference; the core never decodes files
        clip_id: ClipId,
        /// Linear gain
        gain: f32,
        fade_in: FadeSettings,
        fade_out: FadeSettings,
        /// Last applied time-stretch ratio (resample delegated externally)
        stretch_ratio: f64,
    },
    Automation {
        points: Vec<AutomationPoint>,
    },
    Chord {
        hits: Vec<ChordHit>,
    },
}

impl RegionData {
    pub fn region_type(&self) -> RegionType {
        match self {
            RegionData::Midi { .. } => RegionType::Midi,
            RegionData::Audio { .. } => RegionType::Audio,
            RegionData::Automation { .. } => RegionType::Automation,
            RegionData::Chord { .. } => RegionType::Chord,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGION
// ═══════════════════════════════════════════════════════════════════════════════

/// Resize handle for [`Region::resize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeKind {
    /// Move the start edge; content stays put on the timeline (trim)
    StartEdge,
    /// Move the end edge; content stays put on the timeline (trim)
    EndEdge,
    /// Move the loop-start edge; outer boundaries fixed
    LoopStart,
    /// Move the loop-end edge; outer boundaries fixed
    LoopEnd,
    /// Scale content to a new length (audio resample delegated externally)
    Stretch,
}

/// Timeline region with a loop window and typed children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    /// Timeline start
    pub pos: Position,
    /// Timeline end (exclusive)
    pub end_pos: Position,
    /// Phase offset into content at the region start (local)
    pub clip_start: Position,
    /// Loop window start (local)
    pub loop_start: Position,
    /// Loop window end (local, exclusive)
    pub loop_end: Position,
    pub muted: bool,
    pub data: RegionData,
}

impl Region {
    /// New region with the loop window covering the whole length (unlooped).
    pub fn new(
        id: RegionId,
        name: impl Into<String>,
        pos: Position,
        end_pos: Position,
        data: RegionData,
        map: &TempoMap,
    ) -> Self {
        let length = Position::from_ticks(end_pos.ticks - pos.ticks, map);
        Self {
            id,
            name: name.into(),
            pos,
            end_pos,
            clip_start: Position::ZERO,
            loop_start: Position::ZERO,
            loop_end: length,
            muted: false,
            data,
        }
    }

    pub fn length_ticks(&self) -> f64 {
        self.end_pos.ticks - self.pos.ticks
    }

    pub fn length_frames(&self) -> i64 {
        self.end_pos.frames - self.pos.frames
    }

    pub fn loop_length_ticks(&self) -> f64 {
        self.loop_end.ticks - self.loop_start.ticks
    }

    pub fn loop_length_frames(&self) -> i64 {
        self.loop_end.frames - self.loop_start.frames
    }

    /// Whether any part of the loop window differs from the full length
    pub fn is_looped(&self) -> bool {
        self.clip_start.ticks > 0.0
            || self.loop_start.ticks > 0.0
            || self.loop_end.ticks + ll_core::POSITION_EPSILON < self.length_ticks()
    }

    /// Check structural invariants.
    pub fn validate(&self) -> CoreResult<()> {
        self.pos.validate()?;
        if self.end_pos <= self.pos {
            return Err(CoreError::InvalidRange(format!(
                "region '{}' has non-positive length",
                self.name
            )));
        }
        if self.loop_end < self.loop_start {
            return Err(CoreError::InvalidRange(format!(
                "region '{}' has loop_end before loop_start",
                self.name
            )));
        }
        if self.id.rtype != self.data.region_type() {
            return Err(CoreError::InvalidRange(format!(
                "region '{}' id/data type mismatch",
                self.name
            )));
        }
        Ok(())
    }

    /// Shift the region on the timeline; children stay in local space.
    pub fn move_by_ticks(&mut self, delta: f64, map: &TempoMap) {
        self.pos.add_ticks(delta, map);
        self.end_pos.add_ticks(delta, map);
    }

    /// Re-derive every cached frame count after a tempo map change.
    pub fn update_frames(&mut self, map: &TempoMap) {
        self.pos.update_frames(map);
        self.end_pos.update_frames(map);
        self.clip_start.update_frames(map);
        self.loop_start.update_frames(map);
        self.loop_end.update_frames(map);
        match &mut self.data {
            RegionData::Midi { notes } => {
                for n in notes {
                    n.pos.update_frames(map);
                    n.end_pos.update_frames(map);
                }
            }
            RegionData::Automation { points } => {
                for p in points {
                    p.pos.update_frames(map);
                }
            }
            RegionData::Chord { hits } => {
                for h in hits {
                    h.pos.update_frames(map);
                }
            }
            RegionData::Audio { .. } => {}
        }
    }

    /// Whether the region covers a timeline frame (end exclusive)
    pub fn contains_frame(&self, frame: i64) -> bool {
        self.pos.frames <= frame && frame < self.end_pos.frames
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Loop-space mapping
    // ─────────────────────────────────────────────────────────────────────────────

    /// Map a timeline frame into local content space.
    ///
    /// With `normalize` the offset is folded through the loop window: the
    /// clip-start phase is added and whole loop lengths are subtracted
    /// until the result lies below `loop_end`. A frame exactly at the
    /// region end maps to the raw (unfolded) offset so end-boundary
    /// note-offs land at the region edge instead of wrapping.
    pub fn timeline_frames_to_local(&self, timeline_frames: i64, normalize: bool) -> i64 {
        let mut diff = timeline_frames - self.pos.frames;
        if !normalize {
            return diff;
        }
        if timeline_frames == self.end_pos.frames {
            return diff;
        }
        let loop_size = self.loop_length_frames();
        if loop_size <= 0 {
            return diff;
        }
        diff += self.clip_start.frames;
        while diff >= self.loop_end.frames {
            diff -= loop_size;
        }
        diff
    }

    /// Frames from a timeline frame until the next loop wrap or the region
    /// end, whichever comes first. Returns `(frames, wrap_is_loop)`.
    pub fn frames_till_next_loop_or_end(&self, timeline_frames: i64) -> (i64, bool) {
        let loop_size = self.loop_length_frames();
        let frames_till_end = self.end_pos.frames - timeline_frames;
        if loop_size <= 0 {
            return (frames_till_end, false);
        }
        let mut local = timeline_frames - self.pos.frames + self.clip_start.frames;
        while local >= self.loop_end.frames {
            local -= loop_size;
        }
        let frames_till_loop = self.loop_end.frames - local;
        if frames_till_loop < frames_till_end {
            (frames_till_loop, true)
        } else {
            (frames_till_end, false)
        }
    }

    /// Number of loop iterations audible within the region footprint
    pub fn num_loop_repeats(&self) -> usize {
        let loop_len = self.loop_length_ticks();
        if loop_len <= 0.0 {
            return 1;
        }
        ((self.length_ticks() - self.loop_start.ticks + self.clip_start.ticks) / loop_len).ceil()
            as usize
    }

    /// Whether a child at this content position is audible at all given the
    /// loop window (inside the window, or in the pre-loop lead-in).
    pub fn is_child_audible(&self, content_ticks: f64) -> bool {
        (content_ticks >= self.loop_start.ticks && content_ticks < self.loop_end.ticks)
            || (content_ticks >= self.clip_start.ticks && content_ticks < self.loop_start.ticks)
    }

    /// Audible local spans of a child, unrolled through loop repeats and
    /// clipped to the region footprint. Spans are (start, end) tick pairs
    /// relative to the region start.
    pub fn unrolled_child_spans(&self, child_start: f64, child_end: f64) -> Vec<(f64, f64)> {
        let mut spans = Vec::new();
        let loop_len = self.loop_length_ticks();
        if loop_len <= 0.0 {
            return spans;
        }
        let length = self.length_ticks();
        let in_loop_window =
            child_start >= self.loop_start.ticks && child_start < self.loop_end.ticks;
        let repeats = if in_loop_window {
            self.num_loop_repeats()
        } else {
            1
        };

        for mut k in 0..repeats {
            let mut s = child_start;
            let mut e = child_end.min(self.loop_end.ticks);
            if s < self.clip_start.ticks {
                k += 1;
            }
            s += loop_len * k as f64 - self.clip_start.ticks;
            e += loop_len * k as f64 - self.clip_start.ticks;
            s = s.max(0.0);
            e = e.min(length);
            if e > s && s < length {
                spans.push((s, e));
            }
        }
        spans
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Split
    // ─────────────────────────────────────────────────────────────────────────────

    /// Split at a timeline position strictly inside the region.
    ///
    /// The right half's clip-start is set to the local (loop-normalized)
    /// split offset so its content picks up exactly where the left half
    /// stops. Unlooped regions come out unlooped on both sides, with MIDI
    /// notes clipped at the boundary and automation points reassigned by
    /// position. Split halves never inherit a link group.
    pub fn split_at(&self, pos: Position, map: &TempoMap) -> CoreResult<(Region, Region)> {
        if pos <= self.pos || pos >= self.end_pos {
            return Err(CoreError::InvalidRange(format!(
                "split position {} outside region ({}, {})",
                pos.ticks, self.pos.ticks, self.end_pos.ticks
            )));
        }

        let local_frames = self.timeline_frames_to_local(pos.frames, true);
        let local = Position::from_frames(local_frames, map);
        let was_looped = self.is_looped();

        let mut r1 = self.clone();
        let mut r2 = self.clone();
        r1.id.link_group = None;
        r2.id.link_group = None;

        // left half: keep start, end at the split point
        r1.end_pos = pos;
        if !was_looped {
            r1.loop_end = local;
            match &mut r1.data {
                RegionData::Midi { notes } => {
                    notes.retain(|n| n.pos.ticks < local.ticks);
                    for n in notes.iter_mut() {
                        if n.end_pos.ticks > local.ticks {
                            n.end_pos = local;
                        }
                    }
                }
                RegionData::Automation { points } => {
                    points.retain(|p| p.pos.ticks < local.ticks);
                }
                RegionData::Chord { hits } => {
                    hits.retain(|h| h.pos.ticks < local.ticks);
                }
                RegionData::Audio { .. } => {}
            }
        }

        // right half: start at the split point, content phase continues
        r2.pos = pos;
        r2.clip_start = local;
        if !was_looped {
            let r2_len = Position::from_ticks(r2.end_pos.ticks - r2.pos.ticks, map);
            r2.clip_start = Position::ZERO;
            r2.loop_start = Position::ZERO;
            r2.loop_end = r2_len;
            let shift = -local.ticks;
            match &mut r2.data {
                RegionData::Midi { notes } => {
                    notes.retain(|n| n.end_pos.ticks > local.ticks);
                    for n in notes.iter_mut() {
                        n.pos.add_ticks(shift, map);
                        n.end_pos.add_ticks(shift, map);
                        if n.pos.ticks < 0.0 {
                            n.pos = Position::ZERO;
                        }
                    }
                }
                RegionData::Automation { points } => {
                    points.retain(|p| p.pos.ticks >= local.ticks);
                    for p in points.iter_mut() {
                        p.pos.add_ticks(shift, map);
                    }
                }
                RegionData::Chord { hits } => {
                    hits.retain(|h| h.pos.ticks >= local.ticks);
                    for h in hits.iter_mut() {
                        h.pos.add_ticks(shift, map);
                    }
                }
                RegionData::Audio { .. } => {}
            }
        }

        r1.validate()?;
        r2.validate()?;
        Ok((r1, r2))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Resize
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resize an edge or loop edge by a tick delta, or stretch content.
    pub fn resize(&mut self, kind: ResizeKind, delta_ticks: f64, map: &TempoMap) -> CoreResult<()> {
        match kind {
            ResizeKind::StartEdge => {
                let new_pos = self.pos.ticks + delta_ticks;
                if new_pos >= self.end_pos.ticks {
                    return Err(CoreError::InvalidRange(
                        "start edge would cross end".to_string(),
                    ));
                }
                self.pos.add_ticks(delta_ticks, map);
                // trim: content keeps its timeline location
                let new_clip_start = (self.clip_start.ticks + delta_ticks).max(0.0);
                self.clip_start = Position::from_ticks(new_clip_start, map);
            }
            ResizeKind::EndEdge => {
                let new_end = self.end_pos.ticks + delta_ticks;
                if new_end <= self.pos.ticks {
                    return Err(CoreError::InvalidRange(
                        "end edge would cross start".to_string(),
                    ));
                }
                let was_looped = self.is_looped();
                self.end_pos.add_ticks(delta_ticks, map);
                if !was_looped {
                    self.loop_end = Position::from_ticks(self.length_ticks(), map);
                }
            }
            ResizeKind::LoopStart => {
                let new_start = (self.loop_start.ticks + delta_ticks).max(0.0);
                if new_start >= self.loop_end.ticks {
                    return Err(CoreError::InvalidRange(
                        "loop start would cross loop end".to_string(),
                    ));
                }
                self.loop_start = Position::from_ticks(new_start, map);
            }
            ResizeKind::LoopEnd => {
                let new_end = self.loop_end.ticks + delta_ticks;
                if new_end <= self.loop_start.ticks {
                    return Err(CoreError::InvalidRange(
                        "loop end would cross loop start".to_string(),
                    ));
                }
                self.loop_end = Position::from_ticks(new_end, map);
            }
            ResizeKind::Stretch => {
                let old_len = self.length_ticks();
                let new_len = old_len + delta_ticks;
                if new_len <= 0.0 {
                    return Err(CoreError::InvalidRange(
                        "stretch to non-positive length".to_string(),
                    ));
                }
                let ratio = new_len / old_len;
                self.end_pos = Position::from_ticks(self.pos.ticks + new_len, map);
                self.clip_start = Position::from_ticks(self.clip_start.ticks * ratio, map);
                self.loop_start = Position::from_ticks(self.loop_start.ticks * ratio, map);
                self.loop_end = Position::from_ticks(self.loop_end.ticks * ratio, map);
                match &mut self.data {
                    RegionData::Midi { notes } => {
                        for n in notes {
                            n.pos = Position::from_ticks(n.pos.ticks * ratio, map);
                            n.end_pos = Position::from_ticks(n.end_pos.ticks * ratio, map);
                        }
                    }
                    RegionData::Automation { points } => {
                        for p in points {
                            p.pos = Position::from_ticks(p.pos.ticks * ratio, map);
                        }
                    }
                    RegionData::Chord { hits } => {
                        for h in hits {
                            h.pos = Position::from_ticks(h.pos.ticks * ratio, map);
                        }
                    }
                    RegionData::Audio { stretch_ratio, .. } => {
                        // frame-length contract preserved here; the resample
                        // itself is done by an external time-stretch routine
                        *stretch_ratio *= ratio;
                    }
                }
            }
        }
        self.validate()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Merge contiguous same-type regions into one.
///
/// The inputs must be sorted by ascending position, gapless, on the same
/// track and lane. The result spans the combined range with its loop
/// window unrolled: it auditions identically to playing the originals
/// back-to-back, and it carries no link group.
pub fn merge_regions(regions: &[Region], map: &TempoMap) -> CoreResult<Region> {
    if regions.len() < 2 {
        return Err(CoreError::InvalidRange(
            "merge needs at least 2 regions".to_string(),
        ));
    }
    let first = &regions[0];
    let rtype = first.id.rtype;
    for pair in regions.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.id.rtype != rtype || b.id.track != first.id.track || b.id.lane != first.id.lane {
            return Err(CoreError::InvalidRange(
                "merge inputs must share type, track and lane".to_string(),
            ));
        }
        if b.pos != a.end_pos {
            return Err(CoreError::InvalidRange(format!(
                "merge inputs not contiguous at tick {}",
                a.end_pos.ticks
            )));
        }
    }

    let last = &regions[regions.len() - 1];
    let mut merged = Region::new(
        RegionId::new(rtype, first.id.track, first.id.lane, first.id.idx),
        first.name.clone(),
        first.pos,
        last.end_pos,
        match rtype {
            RegionType::Midi => RegionData::Midi { notes: Vec::new() },
            RegionType::Automation => RegionData::Automation { points: Vec::new() },
            RegionType::Chord => RegionData::Chord { hits: Vec::new() },
            RegionType::Audio => first.data.clone(),
        },
        map,
    );

    // unroll children of every source into the merged local space
    for r in regions {
        let base = r.pos.ticks - merged.pos.ticks;
        match (&r.data, &mut merged.data) {
            (RegionData::Midi { notes }, RegionData::Midi { notes: out }) => {
                for n in notes {
                    for (s, e) in r.unrolled_child_spans(n.pos.ticks, n.end_pos.ticks) {
                        let mut nn = *n;
                        nn.pos = Position::from_ticks(base + s, map);
                        nn.end_pos = Position::from_ticks(base + e, map);
                        out.push(nn);
                    }
                }
            }
            (RegionData::Automation { points }, RegionData::Automation { points: out }) => {
                for p in points {
                    for (s, _) in r.unrolled_child_spans(p.pos.ticks, p.pos.ticks + 1.0) {
                        let mut pp = *p;
                        pp.pos = Position::from_ticks(base + s, map);
                        out.push(pp);
                    }
                }
            }
            (RegionData::Chord { hits }, RegionData::Chord { hits: out }) => {
                for h in hits {
                    for (s, _) in r.unrolled_child_spans(h.pos.ticks, h.pos.ticks + 1.0) {
                        let mut hh = *h;
                        hh.pos = Position::from_ticks(base + s, map);
                        out.push(hh);
                    }
                }
            }
            (RegionData::Audio { .. }, RegionData::Audio { .. }) => {
                // audio merge keeps the first clip reference; the pool-level
                // render concatenation happens in the action layer
            }
            _ => unreachable!("merge inputs type-checked above"),
        }
    }

    match &mut merged.data {
        RegionData::Midi { notes } => {
            notes.sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks))
        }
        RegionData::Automation { points } => {
            points.sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks))
        }
        RegionData::Chord { hits } => {
            hits.sort_by(|a, b| a.pos.ticks.total_cmp(&b.pos.ticks))
        }
        RegionData::Audio { .. } => {}
    }

    merged.validate()?;
    Ok(merged)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use ll_core::track_name_hash;

    fn midi_region(map: &TempoMap, start_tick: f64, end_tick: f64) -> Region {
        Region::new(
            RegionId::new(RegionType::Midi, track_name_hash("Piano"), 0, 0),
            "r1",
            Position::from_ticks(start_tick, map),
            Position::from_ticks(end_tick, map),
            RegionData::Midi { notes: Vec::new() },
            map,
        )
    }

    fn add_note(r: &mut Region, map: &TempoMap, s: f64, e: f64, pitch: u8) {
        let note = MidiNote::new(
            Position::from_ticks(s, map),
            Position::from_ticks(e, map),
            pitch,
            100,
        );
        if let RegionData::Midi { notes } = &mut r.data {
            notes.push(note);
        }
    }

    #[test]
    fn test_local_mapping_without_loop() {
        let map = TempoMap::new(48000);
        let r = midi_region(&map, 3840.0, 7680.0); // bar 2..3
        assert_eq!(r.timeline_frames_to_local(r.pos.frames, true), 0);
        assert_eq!(r.timeline_frames_to_local(r.pos.frames + 100, true), 100);
        // exactly at the end maps to the raw offset, not a wrap
        assert_eq!(
            r.timeline_frames_to_local(r.end_pos.frames, true),
            r.length_frames()
        );
    }

    #[test]
    fn test_local_mapping_with_loop_wrap() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 7680.0); // two bars
        r.loop_end = Position::from_ticks(3840.0, &map); // loop every bar
        let bar_frames = r.loop_end.frames;
        assert_eq!(r.timeline_frames_to_local(bar_frames, true), 0);
        assert_eq!(r.timeline_frames_to_local(bar_frames + 7, true), 7);
    }

    #[test]
    fn test_frames_till_next_loop_or_end() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 7680.0);
        r.loop_end = Position::from_ticks(3840.0, &map);
        let bar = r.loop_end.frames;
        let (n, is_loop) = r.frames_till_next_loop_or_end(bar - 10);
        assert_eq!(n, 10);
        assert!(is_loop);
        // in the last iteration the region end comes first
        let (n, is_loop) = r.frames_till_next_loop_or_end(2 * bar - 10);
        assert_eq!(n, 10);
        assert!(!is_loop);
    }

    #[test]
    fn test_split_unlooped_clips_notes() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 3840.0);
        add_note(&mut r, &map, 0.0, 1920.0, 60); // left only
        add_note(&mut r, &map, 960.0, 2880.0, 62); // spans the split
        add_note(&mut r, &map, 2880.0, 3840.0, 64); // right only

        let split = Position::from_ticks(1920.0, &map);
        let (left, right) = r.split_at(split, &map).unwrap();

        assert!((left.end_pos.ticks - 1920.0).abs() < 1e-9);
        assert!((right.pos.ticks - 1920.0).abs() < 1e-9);

        let RegionData::Midi { notes: ln } = &left.data else {
            panic!()
        };
        let RegionData::Midi { notes: rn } = &right.data else {
            panic!()
        };
        // spanning note clipped into two shortened notes
        assert_eq!(ln.len(), 2);
        assert!((ln[1].end_pos.ticks - 1920.0).abs() < 1e-9);
        assert_eq!(rn.len(), 2);
        assert!((rn[0].pos.ticks - 0.0).abs() < 1e-9);
        assert!((rn[0].end_pos.ticks - 960.0).abs() < 1e-9);
        assert!((rn[1].pos.ticks - 960.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_looped_preserves_phase() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 7680.0);
        r.loop_end = Position::from_ticks(3840.0, &map); // loop every bar
        // split mid second iteration
        let split = Position::from_ticks(4800.0, &map);
        let (left, right) = r.split_at(split, &map).unwrap();
        // right half continues at local phase 960 into the loop
        assert!((right.clip_start.ticks - 960.0).abs() < 1e-6);
        assert!((left.loop_end.ticks - 3840.0).abs() < 1e-9);
        assert_eq!(right.id.link_group, None);
    }

    #[test]
    fn test_split_rejects_boundary() {
        let map = TempoMap::new(48000);
        let r = midi_region(&map, 0.0, 3840.0);
        assert!(r.split_at(Position::from_ticks(0.0, &map), &map).is_err());
        assert!(
            r.split_at(Position::from_ticks(3840.0, &map), &map)
                .is_err()
        );
    }

    #[test]
    fn test_split_merge_round_trip() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 3840.0);
        add_note(&mut r, &map, 0.0, 960.0, 60);
        add_note(&mut r, &map, 1920.0, 2880.0, 64);

        let (left, right) = r.split_at(Position::from_ticks(1920.0, &map), &map).unwrap();
        let merged = merge_regions(&[left, right], &map).unwrap();

        assert_eq!(merged.pos, r.pos);
        assert_eq!(merged.end_pos, r.end_pos);
        let RegionData::Midi { notes } = &merged.data else {
            panic!()
        };
        assert_eq!(notes.len(), 2);
        assert!((notes[0].pos.ticks - 0.0).abs() < 1e-6);
        assert!((notes[0].end_pos.ticks - 960.0).abs() < 1e-6);
        assert!((notes[1].pos.ticks - 1920.0).abs() < 1e-6);
        assert!((notes[1].end_pos.ticks - 2880.0).abs() < 1e-6);
    }

    #[test]
    fn test_merge_unrolls_loops() {
        let map = TempoMap::new(48000);
        let mut r1 = midi_region(&map, 0.0, 7680.0);
        r1.loop_end = Position::from_ticks(3840.0, &map);
        add_note(&mut r1, &map, 0.0, 960.0, 60);
        let mut r2 = midi_region(&map, 7680.0, 11520.0);
        r2.id.idx = 1;
        add_note(&mut r2, &map, 0.0, 960.0, 72);

        let merged = merge_regions(&[r1, r2], &map).unwrap();
        let RegionData::Midi { notes } = &merged.data else {
            panic!()
        };
        // looped note unrolled twice, plus the second region's note
        assert_eq!(notes.len(), 3);
        assert!((notes[0].pos.ticks - 0.0).abs() < 1e-6);
        assert!((notes[1].pos.ticks - 3840.0).abs() < 1e-6);
        assert!((notes[2].pos.ticks - 7680.0).abs() < 1e-6);
        assert!(!merged.is_looped());
    }

    #[test]
    fn test_merge_rejects_gaps() {
        let map = TempoMap::new(48000);
        let r1 = midi_region(&map, 0.0, 3840.0);
        let mut r2 = midi_region(&map, 4000.0, 7680.0);
        r2.id.idx = 1;
        assert!(merge_regions(&[r1, r2], &map).is_err());
    }

    #[test]
    fn test_resize_start_edge_trims() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 3840.0);
        r.resize(ResizeKind::StartEdge, 960.0, &map).unwrap();
        assert!((r.pos.ticks - 960.0).abs() < 1e-9);
        assert!((r.clip_start.ticks - 960.0).abs() < 1e-9);
        assert!((r.end_pos.ticks - 3840.0).abs() < 1e-9);
    }

    #[test]
    fn test_resize_loop_edges_keep_footprint() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 3840.0);
        r.resize(ResizeKind::LoopEnd, -1920.0, &map).unwrap();
        assert!((r.loop_end.ticks - 1920.0).abs() < 1e-9);
        assert!((r.end_pos.ticks - 3840.0).abs() < 1e-9);
        assert!(r.is_looped());
        r.resize(ResizeKind::LoopStart, 480.0, &map).unwrap();
        assert!((r.loop_start.ticks - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_resize_rejects_degenerate() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 3840.0);
        assert!(r.resize(ResizeKind::EndEdge, -3840.0, &map).is_err());
        assert!(r.resize(ResizeKind::LoopEnd, -3840.0, &map).is_err());
    }

    #[test]
    fn test_stretch_scales_children() {
        let map = TempoMap::new(48000);
        let mut r = midi_region(&map, 0.0, 3840.0);
        add_note(&mut r, &map, 960.0, 1920.0, 60);
        r.resize(ResizeKind::Stretch, 3840.0, &map).unwrap(); // double
        let RegionData::Midi { notes } = &r.data else {
            panic!()
        };
        assert!((r.length_ticks() - 7680.0).abs() < 1e-9);
        assert!((notes[0].pos.ticks - 1920.0).abs() < 1e-9);
        assert!((notes[0].end_pos.ticks - 3840.0).abs() < 1e-9);
        assert!((r.loop_end.ticks - 7680.0).abs() < 1e-9);
    }
}
