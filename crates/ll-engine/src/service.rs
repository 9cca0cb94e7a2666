//! Control-side project service
//!
//! Owns the live project behind a lock, routes every mutation through the
//! undo manager, and publishes a fresh playback snapshot after each
//! committed change so the audio thread always renders the latest state.

use std::sync::Arc;

use parking_lot::RwLock;

use ll_state::{Action, Project, StateResult, UndoManager};

use crate::{PlaybackSnapshot, SnapshotSender};

pub struct ProjectService {
    project: Arc<RwLock<Project>>,
    undo: UndoManager,
    snapshots: SnapshotSender,
}

impl ProjectService {
    pub fn new(project: Project, snapshots: SnapshotSender) -> Self {
        let mut service = Self {
            project: Arc::new(RwLock::new(project)),
            undo: UndoManager::default(),
            snapshots,
        };
        service.publish();
        service
    }

    /// Shared read handle for UI threads
    pub fn project(&self) -> Arc<RwLock<Project>> {
        Arc::clone(&self.project)
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// Execute and record an action, then publish the resulting state.
    pub fn perform(&mut self, action: Box<dyn Action>) -> StateResult<()> {
        {
            let mut project = self.project.write();
            self.undo.perform(action, &mut project)?;
        }
        self.publish();
        Ok(())
    }

    pub fn undo(&mut self) -> StateResult<()> {
        {
            let mut project = self.project.write();
            self.undo.undo(&mut project)?;
        }
        self.publish();
        Ok(())
    }

    pub fn redo(&mut self) -> StateResult<()> {
        {
            let mut project = self.project.write();
            self.undo.redo(&mut project)?;
        }
        self.publish();
        Ok(())
    }

    /// Push the current state to the audio thread.
    pub fn publish(&mut self) {
        let snapshot = PlaybackSnapshot::of(&self.project.read());
        self.snapshots.publish(snapshot);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_channel;
    use ll_core::{Position, RegionId, RegionType};
    use ll_state::{CreateOrDeleteAction, Region, RegionData, Track, TrackKind};

    fn service() -> (ProjectService, crate::SnapshotReceiver) {
        let (tx, rx) = snapshot_channel();
        let mut p = Project::new("test", 48000);
        p.tracks.push(Track::new("Piano", TrackKind::Midi));
        (ProjectService::new(p, tx), rx)
    }

    fn region_for(service: &ProjectService) -> Region {
        let p = service.project();
        let p = p.read();
        Region::new(
            RegionId::new(RegionType::Midi, p.tracks[0].name_hash, 0, 0),
            "r",
            Position::from_ticks(0.0, &p.tempo_map),
            Position::from_ticks(3840.0, &p.tempo_map),
            RegionData::Midi { notes: Vec::new() },
            &p.tempo_map,
        )
    }

    #[test]
    fn test_perform_publishes_snapshot() {
        let (mut service, mut rx) = service();
        let region = region_for(&service);
        service
            .perform(Box::new(CreateOrDeleteAction::create(vec![region])))
            .unwrap();

        let snapshot = rx.latest().unwrap();
        assert_eq!(snapshot.tracks[0].lanes[0].regions.len(), 1);
    }

    #[test]
    fn test_undo_redo_republish() {
        let (mut service, mut rx) = service();
        let region = region_for(&service);
        service
            .perform(Box::new(CreateOrDeleteAction::create(vec![region])))
            .unwrap();

        service.undo().unwrap();
        assert!(rx.latest().unwrap().tracks[0].lanes[0].regions.is_empty());

        service.redo().unwrap();
        assert_eq!(rx.latest().unwrap().tracks[0].lanes[0].regions.len(), 1);
    }
}
