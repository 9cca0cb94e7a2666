//! End-to-end playback tests: project edits on the control side, event
//! generation on the audio side, with the snapshot handoff in between.

use ll_core::{MidiEventBuffer, MidiEventKind, Position, RegionId, RegionType, TempoMap};
use ll_engine::{
    fill_region_midi_events, snapshot_channel, CycleTimeInfo, Engine, PlaybackSnapshot,
    ProjectService,
};
use ll_state::{
    CreateOrDeleteAction, LinkAction, MidiNote, MoveOrDuplicateAction, Project, Region,
    RegionData, Selection, Track, TrackKind, UndoManager,
};

fn project_with_piano() -> Project {
    let mut p = Project::new("song", 48000);
    p.tracks.push(Track::new("Piano", TrackKind::Midi));
    p
}

fn midi_region(p: &Project, start: f64, end: f64, notes: Vec<MidiNote>) -> Region {
    Region::new(
        RegionId::new(RegionType::Midi, p.tracks[0].name_hash, 0, 0),
        "r",
        Position::from_ticks(start, &p.tempo_map),
        Position::from_ticks(end, &p.tempo_map),
        RegionData::Midi { notes },
        &p.tempo_map,
    )
}

fn note(map: &TempoMap, start: f64, end: f64, pitch: u8) -> MidiNote {
    MidiNote::new(
        Position::from_ticks(start, map),
        Position::from_ticks(end, map),
        pitch,
        100,
    )
}

/// A region looping every bar with a note covering the whole loop window:
/// a cycle straddling the wrap must stop the note one frame before the
/// wrap and restart it exactly on it.
#[test]
fn loop_wrap_stops_and_retriggers_sample_accurately() {
    let map = TempoMap::new(48000);
    let mut p = project_with_piano();
    let mut r = midi_region(&p, 0.0, 7680.0, vec![note(&map, 0.0, 3840.0, 60)]);
    r.loop_end = Position::from_ticks(3840.0, &map);
    let wrap = r.loop_end.frames;
    p.add_region(r).unwrap();

    let region = &p.tracks[0].lanes[0].regions[0];
    let mut buf = MidiEventBuffer::new();
    fill_region_midi_events(region, &CycleTimeInfo::new(wrap - 10, 20, 0), &mut buf);
    buf.sort();

    let ev = buf.events();
    assert_eq!(ev.len(), 2);
    assert_eq!(
        (ev[0].time, ev[0].kind),
        (9, MidiEventKind::NoteOff { pitch: 60 })
    );
    assert_eq!(
        (ev[1].time, ev[1].kind),
        (
            10,
            MidiEventKind::NoteOn {
                pitch: 60,
                velocity: 100
            }
        )
    );
}

/// Moving a region by 400 ticks, undoing and redoing keeps the stack
/// counts and the region position consistent at every step.
#[test]
fn move_undo_redo_round_trip() {
    let mut p = project_with_piano();
    let id = p
        .add_region(midi_region(&p, 0.0, 3840.0, Vec::new()))
        .unwrap();
    let mut undo = UndoManager::default();

    let mut sel = Selection::timeline();
    sel.add_region(p.find_region(&id).unwrap().clone());
    undo.perform(
        Box::new(MoveOrDuplicateAction::r#move(&sel, 400.0)),
        &mut p,
    )
    .unwrap();

    let pos = p.tracks[0].lanes[0].regions[0].pos;
    assert!((pos.ticks - 400.0).abs() < 1e-9);
    assert_eq!(pos.frames, p.tempo_map.ticks_to_frames(400.0));
    assert_eq!((undo.undo_len(), undo.redo_len()), (1, 0));

    undo.undo(&mut p).unwrap();
    assert!((p.tracks[0].lanes[0].regions[0].pos.ticks - 0.0).abs() < 1e-9);
    assert_eq!((undo.undo_len(), undo.redo_len()), (0, 1));

    undo.redo(&mut p).unwrap();
    assert!((p.tracks[0].lanes[0].regions[0].pos.ticks - 400.0).abs() < 1e-9);
    assert_eq!((undo.undo_len(), undo.redo_len()), (1, 0));
    p.validate().unwrap();
}

/// Linking a region produces a linked clone; deleting the clone dissolves
/// the pair, and undoing restores both the region and the membership.
#[test]
fn link_delete_undo_restores_group() {
    let mut p = project_with_piano();
    let a = p
        .add_region(midi_region(&p, 0.0, 3840.0, Vec::new()))
        .unwrap();
    let mut undo = UndoManager::default();

    let mut sel = Selection::timeline();
    sel.add_region(p.find_region(&a).unwrap().clone());
    undo.perform(Box::new(LinkAction::new(&sel, 3840.0).unwrap()), &mut p)
        .unwrap();
    assert_eq!(p.link_groups.num_groups(), 1);
    assert_eq!(p.tracks[0].lanes[0].regions.len(), 2);

    let mut del_sel = Selection::timeline();
    del_sel.add_region(p.tracks[0].lanes[0].regions[1].clone());
    undo.perform(Box::new(CreateOrDeleteAction::delete(&del_sel)), &mut p)
        .unwrap();
    assert_eq!(p.link_groups.num_groups(), 0);
    assert_eq!(p.tracks[0].lanes[0].regions[0].id.link_group, None);

    undo.undo(&mut p).unwrap();
    assert_eq!(p.link_groups.num_groups(), 1);
    assert_eq!(p.tracks[0].lanes[0].regions.len(), 2);
    assert!(p.tracks[0].lanes[0].regions[0].id.link_group.is_some());
    assert!(p.tracks[0].lanes[0].regions[1].id.link_group.is_some());
    p.validate().unwrap();
}

/// The undo stack is bounded: pushing past the depth drops the oldest
/// steps, and unwinding stops at the bound.
#[test]
fn undo_depth_is_bounded() {
    let mut p = project_with_piano();
    let mut undo = UndoManager::new(4);

    for i in 0..10 {
        let start = i as f64 * 3840.0;
        undo.perform(
            Box::new(CreateOrDeleteAction::create(vec![midi_region(
                &p,
                start,
                start + 3840.0,
                Vec::new(),
            )])),
            &mut p,
        )
        .unwrap();
    }
    assert_eq!(undo.undo_len(), 4);

    let mut unwound = 0;
    while undo.can_undo() {
        undo.undo(&mut p).unwrap();
        unwound += 1;
    }
    assert_eq!(unwound, 4);
    assert_eq!(p.tracks[0].lanes[0].regions.len(), 6);
}

/// Full path: edit through the service, render through the engine.
#[test]
fn service_edit_reaches_audio_thread() {
    let (tx, rx) = snapshot_channel();
    let mut p = project_with_piano();
    let map = p.tempo_map.clone();
    let region = midi_region(&p, 0.0, 3840.0, vec![note(&map, 0.0, 960.0, 72)]);
    p.add_region(region).unwrap();

    let mut service = ProjectService::new(p, tx);
    let (mut engine, handle) = Engine::new(rx);
    handle.play();

    let mut l = vec![0.0f32; 128];
    let mut r = vec![0.0f32; 128];
    let mut midi = MidiEventBuffer::new();
    engine.process(128, &mut l, &mut r, &mut midi);
    assert!(midi
        .events()
        .iter()
        .any(|e| matches!(e.kind, MidiEventKind::NoteOn { pitch: 72, .. })));

    // delete the region on the control side; the engine falls silent
    let sel = {
        let proj = service.project();
        let proj = proj.read();
        let mut sel = Selection::timeline();
        sel.add_region(proj.tracks[0].lanes[0].regions[0].clone());
        sel
    };
    service
        .perform(Box::new(CreateOrDeleteAction::delete(&sel)))
        .unwrap();
    handle.locate(0);
    engine.process(128, &mut l, &mut r, &mut midi);
    assert!(midi.is_empty());
}

/// Tempo changes re-derive frame images; the same musical cycle covers
/// different frame spans before and after.
#[test]
fn tempo_change_shifts_event_frames() {
    let mut p = project_with_piano();
    let map = p.tempo_map.clone();
    p.add_region(midi_region(&p, 0.0, 3840.0, vec![note(&map, 960.0, 1920.0, 60)]))
        .unwrap();

    let frames_at_120 = p.tracks[0].lanes[0].regions[0].data.clone();
    let RegionData::Midi { notes } = &frames_at_120 else {
        panic!()
    };
    assert_eq!(notes[0].pos.frames, 24000);

    p.tempo_map.set_tempo_at_tick(0, 60.0);
    p.update_frames();
    let RegionData::Midi { notes } = &p.tracks[0].lanes[0].regions[0].data else {
        panic!()
    };
    assert_eq!(notes[0].pos.frames, 48000);

    // events now land at the new frame positions
    let mut buf = MidiEventBuffer::new();
    let region = &p.tracks[0].lanes[0].regions[0];
    fill_region_midi_events(region, &CycleTimeInfo::new(47990, 20, 0), &mut buf);
    buf.sort();
    assert_eq!(buf.len(), 1);
    assert_eq!(buf.events()[0].time, 10);
}

/// Snapshot cloning is shallow for clip audio: publishing does not copy
/// sample data.
#[test]
fn snapshots_share_clip_buffers() {
    let mut p = Project::new("song", 48000);
    p.tracks.push(Track::new("Drums", TrackKind::Audio));
    let clip_id = p.pool.add(ll_state::AudioClip::new(
        "beat",
        2,
        48000,
        vec![0.1; 96000],
    ));
    let snapshot = PlaybackSnapshot::of(&p);
    let original = p.pool.get(clip_id).unwrap();
    let copy = snapshot.pool.get(clip_id).unwrap();
    assert!(std::sync::Arc::ptr_eq(&original.frames, &copy.frames));
}
