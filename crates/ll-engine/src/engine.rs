//! Audio-side engine
//!
//! Glues the transport, the snapshot receiver and the fill paths into one
//! per-callback entry point. The callback drains control requests, splits
//! the block at the transport loop, renders every audible region of the
//! newest snapshot into the output buffers, then advances the playhead.

use ll_core::{MidiEventBuffer, RegionType};

use crate::{
    fill_chord_midi_events, fill_region_audio, fill_region_midi_events, fill_region_note_offs,
    SnapshotReceiver, Transport, TransportHandle, DEFAULT_MIDI_CHANNEL,
};

/// Audio-thread half of the engine
pub struct Engine {
    transport: Transport,
    snapshots: SnapshotReceiver,
    was_playing: bool,
}

impl Engine {
    pub fn new(snapshots: SnapshotReceiver) -> (Self, TransportHandle) {
        let (transport, handle) = Transport::new();
        (
            Self {
                transport,
                snapshots,
                was_playing: false,
            },
            handle,
        )
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Render one audio callback.
    ///
    /// `out_l`/`out_r` are overwritten; `midi_out` is cleared, filled and
    /// sorted. Lengths below `nframes` truncate the render.
    pub fn process(
        &mut self,
        nframes: u32,
        out_l: &mut [f32],
        out_r: &mut [f32],
        midi_out: &mut MidiEventBuffer,
    ) {
        let n_l = (nframes as usize).min(out_l.len());
        let n_r = (nframes as usize).min(out_r.len());
        out_l[..n_l].fill(0.0);
        out_r[..n_r].fill(0.0);
        midi_out.clear();

        self.transport.process_requests();

        // pause/stop between callbacks: release everything still sounding
        if self.was_playing && !self.transport.is_playing() {
            midi_out.add_all_notes_off(DEFAULT_MIDI_CHANNEL, 0);
        }
        self.was_playing = self.transport.is_playing();

        let segments = self.transport.split_cycle(nframes);
        if let Some(snapshot) = self.snapshots.latest() {
            for (i, segment) in segments.iter().enumerate() {
                for region in snapshot.regions_of_type(RegionType::Midi) {
                    fill_region_midi_events(region, segment, midi_out);
                }
                for region in snapshot.regions_of_type(RegionType::Chord) {
                    fill_chord_midi_events(region, &snapshot.chord_palette, segment, midi_out);
                }
                for region in snapshot.regions_of_type(RegionType::Audio) {
                    fill_region_audio(region, &snapshot.pool, segment, out_l, out_r);
                }
                // the transport loop jump releases whatever still sounds
                // on the last frame before the wrap
                if i + 1 < segments.len() && segment.nframes > 0 {
                    let last_frame = segment.end_frame() - 1;
                    let time = segment.local_offset + segment.nframes - 1;
                    for region in snapshot.regions_of_type(RegionType::Midi) {
                        fill_region_note_offs(region, last_frame, time, midi_out);
                    }
                    for region in snapshot.regions_of_type(RegionType::Chord) {
                        fill_region_note_offs(region, last_frame, time, midi_out);
                    }
                }
            }
        }
        midi_out.sort();

        self.transport.advance(nframes);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
