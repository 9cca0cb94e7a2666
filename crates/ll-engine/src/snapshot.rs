//! Playback snapshots
//!
//! The audio thread never reads the live project. After every committed
//! edit the control thread clones the playback-relevant state into an
//! immutable snapshot and pushes an `Arc` to it through a wait-free ring.
//! The audio thread drains the ring at the top of each callback and keeps
//! the newest; clip sample data is shared through inner `Arc`s, so the
//! clone is shallow where it matters.

use std::sync::Arc;

use ll_core::{RegionType, TempoMap};
use ll_state::{ChordDescriptor, ClipPool, Project, Region, Track};

const SNAPSHOT_RING_CAPACITY: usize = 8;

/// Immutable playback image of a project
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub tempo_map: TempoMap,
    pub tracks: Vec<Track>,
    pub pool: ClipPool,
    pub chord_palette: Vec<ChordDescriptor>,
}

impl PlaybackSnapshot {
    pub fn of(project: &Project) -> Self {
        Self {
            tempo_map: project.tempo_map.clone(),
            tracks: project.tracks.clone(),
            pool: project.pool.clone(),
            chord_palette: project.chord_palette.clone(),
        }
    }

    /// Regions of one type on unmuted tracks, for the fill paths
    pub fn regions_of_type(&self, rtype: RegionType) -> impl Iterator<Item = &Region> {
        self.tracks
            .iter()
            .filter(|t| !t.muted)
            .flat_map(move |t| {
                let lanes = if rtype == RegionType::Automation {
                    t.automation_lanes.iter()
                } else {
                    t.lanes.iter()
                };
                lanes.flat_map(|l| l.regions.iter())
            })
            .filter(move |r| r.id.rtype == rtype)
    }
}

/// Control-side publisher
pub struct SnapshotSender {
    producer: rtrb::Producer<Arc<PlaybackSnapshot>>,
}

impl SnapshotSender {
    /// Publish a snapshot; a full ring (audio thread stalled or absent)
    /// drops the update and reports false.
    pub fn publish(&mut self, snapshot: PlaybackSnapshot) -> bool {
        match self.producer.push(Arc::new(snapshot)) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("snapshot ring full, dropping update");
                false
            }
        }
    }
}

/// Audio-side receiver keeping the newest snapshot
pub struct SnapshotReceiver {
    consumer: rtrb::Consumer<Arc<PlaybackSnapshot>>,
    current: Option<Arc<PlaybackSnapshot>>,
}

impl SnapshotReceiver {
    /// Drain the ring and return the newest snapshot, if any arrived yet.
    pub fn latest(&mut self) -> Option<&Arc<PlaybackSnapshot>> {
        while let Ok(snapshot) = self.consumer.pop() {
            self.current = Some(snapshot);
        }
        self.current.as_ref()
    }
}

/// Build a connected sender/receiver pair.
pub fn snapshot_channel() -> (SnapshotSender, SnapshotReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(SNAPSHOT_RING_CAPACITY);
    (
        SnapshotSender { producer },
        SnapshotReceiver {
            consumer,
            current: None,
        },
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
