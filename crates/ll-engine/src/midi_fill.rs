//! MIDI event generation
//!
//! Fills per-cycle event buffers from MIDI and chord regions. A segment is
//! walked in chunks bounded by the region's next loop wrap or its end, so
//! every event lands on its exact frame even when the loop window repeats
//! several times inside one block.
//!
//! Timing rules:
//! - note-ons fire on the frame the note starts
//! - note-offs fire one frame before the exclusive end
//! - a loop wrap or the region end forces note-offs for everything still
//!   sounding on the last frame before the boundary

use ll_core::{MidiChannel, MidiEventBuffer};
use ll_state::{ChordDescriptor, Region, RegionData};

use crate::CycleTimeInfo;

/// Channel used for generated events
pub const DEFAULT_MIDI_CHANNEL: MidiChannel = 1;

/// Fill events from a MIDI region for one cycle segment.
///
/// Muted regions and notes contribute nothing. The caller sorts the
/// buffer once after all regions are filled.
pub fn fill_region_midi_events(
    region: &Region,
    cycle: &CycleTimeInfo,
    events: &mut MidiEventBuffer,
) {
    let RegionData::Midi { notes } = &region.data else {
        return;
    };
    if region.muted {
        return;
    }

    for_each_chunk(region, cycle, |chunk| {
        let chunk_len = chunk.nframes as i64;
        for note in notes.iter().filter(|n| !n.muted) {
            let on = note.pos.frames;
            if on >= chunk.r_local && on < chunk.r_local + chunk_len {
                events.add_note_on(
                    DEFAULT_MIDI_CHANNEL,
                    note.pitch,
                    note.velocity,
                    chunk.buf_base + (on - chunk.r_local) as u32,
                );
            }
            // inclusive upper bound: a note ending exactly on the chunk
            // boundary releases on the boundary's last frame; the strict
            // lower bound keeps the next chunk from re-emitting that off
            let off = note.end_pos.frames;
            let off_in_chunk = off > chunk.r_local && off <= chunk.r_local + chunk_len;
            let zero_length = off == on && on >= chunk.r_local && on < chunk.r_local + chunk_len;
            if off_in_chunk || zero_length {
                let mut time = chunk.buf_base + (off - chunk.r_local) as u32;
                if time > 0 {
                    time -= 1;
                }
                events.add_note_off(DEFAULT_MIDI_CHANNEL, note.pitch, time);
            }
        }
        if chunk.at_boundary {
            // notes sounding past the boundary stop on its last frame;
            // notes ending exactly on it were released above
            let last_local = chunk.r_local + chunk_len - 1;
            for note in notes.iter().filter(|n| !n.muted) {
                if note.is_hit(last_local) && note.end_pos.frames > chunk.r_local + chunk_len {
                    events.add_note_off(
                        DEFAULT_MIDI_CHANNEL,
                        note.pitch,
                        chunk.buf_base + chunk.nframes - 1,
                    );
                }
            }
        }
    });
}

/// Fill events from a chord region. Each hit retriggers: the previous
/// chord is released on the hit frame, then the palette pitches start.
pub fn fill_chord_midi_events(
    region: &Region,
    palette: &[ChordDescriptor],
    cycle: &CycleTimeInfo,
    events: &mut MidiEventBuffer,
) {
    let RegionData::Chord { hits } = &region.data else {
        return;
    };
    if region.muted {
        return;
    }

    for_each_chunk(region, cycle, |chunk| {
        let chunk_len = chunk.nframes as i64;
        for hit in hits {
            let at = hit.pos.frames;
            if at < chunk.r_local || at >= chunk.r_local + chunk_len {
                continue;
            }
            let Some(chord) = palette.get(hit.chord_index) else {
                continue;
            };
            let time = chunk.buf_base + (at - chunk.r_local) as u32;
            events.add_all_notes_off(DEFAULT_MIDI_CHANNEL, time);
            for &pitch in &chord.notes {
                events.add_note_on(DEFAULT_MIDI_CHANNEL, pitch, ll_core::VELOCITY_DEFAULT, time);
            }
        }
        if chunk.at_boundary {
            events.add_all_notes_off(DEFAULT_MIDI_CHANNEL, chunk.buf_base + chunk.nframes - 1);
        }
    });
}

/// Release everything a region still has sounding when the playhead
/// jumps, as at the transport loop point. `g_frame` is the last rendered
/// timeline frame before the jump; offs land on buffer frame `time`.
pub fn fill_region_note_offs(
    region: &Region,
    g_frame: i64,
    time: u32,
    events: &mut MidiEventBuffer,
) {
    if region.muted || !region.contains_frame(g_frame) {
        return;
    }
    // a region boundary right after g_frame already released these
    let (till, _) = region.frames_till_next_loop_or_end(g_frame);
    if till == 1 {
        return;
    }
    match &region.data {
        RegionData::Midi { notes } => {
            let local = region.timeline_frames_to_local(g_frame, true);
            for note in notes.iter().filter(|n| !n.muted) {
                // notes ending exactly on the jump were released by the
                // segment fill on the same frame
                if note.is_hit(local) && note.end_pos.frames > local + 1 {
                    events.add_note_off(DEFAULT_MIDI_CHANNEL, note.pitch, time);
                }
            }
        }
        RegionData::Chord { .. } => {
            events.add_all_notes_off(DEFAULT_MIDI_CHANNEL, time);
        }
        _ => {}
    }
}

/// One loop-contiguous chunk of a cycle segment, in region-local terms
pub(crate) struct LocalChunk {
    /// Local content frame at the chunk start
    pub(crate) r_local: i64,
    /// Chunk length in frames
    pub(crate) nframes: u32,
    /// Offset of the chunk start within the host buffer
    pub(crate) buf_base: u32,
    /// The chunk ends exactly at a loop wrap or the region end
    pub(crate) at_boundary: bool,
}

/// Walk a cycle segment in chunks that never cross a loop wrap.
pub(crate) fn for_each_chunk(region: &Region, cycle: &CycleTimeInfo, mut f: impl FnMut(&LocalChunk)) {
    let mut offset: u32 = 0;
    while offset < cycle.nframes {
        let g_start = cycle.start_frame + offset as i64;
        if g_start >= region.end_pos.frames || cycle.end_frame() <= region.pos.frames {
            return;
        }
        if g_start < region.pos.frames {
            // segment starts before the region: skip the silent lead-in
            offset += (region.pos.frames - g_start) as u32;
            continue;
        }
        let (till, _is_loop) = region.frames_till_next_loop_or_end(g_start);
        if till <= 0 {
            return;
        }
        let remaining = (cycle.nframes - offset) as i64;
        let chunk = till.min(remaining) as u32;
        f(&LocalChunk {
            r_local: region.timeline_frames_to_local(g_start, true),
            nframes: chunk,
            buf_base: cycle.local_offset + offset,
            at_boundary: chunk as i64 == till,
        });
        offset += chunk;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
