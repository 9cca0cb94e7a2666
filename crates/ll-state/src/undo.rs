//! Undo manager
//!
//! Two bounded stacks of undo steps, each step holding one or more actions
//! that do/undo together. A new action clears the redo stack; exceeding
//! the depth bound evicts the oldest step and finalizes its actions so
//! resources held only for undo (pool clips of deleted audio regions) can
//! be reclaimed.

use std::collections::VecDeque;

use ll_core::ClipId;

use crate::{Action, Project, StateError, StateResult};

/// Default stack depth
pub const DEFAULT_UNDO_DEPTH: usize = 128;

/// One undoable unit: actions undone in reverse, redone in order
pub struct UndoStep {
    actions: Vec<Box<dyn Action>>,
}

impl UndoStep {
    pub fn describe(&self) -> String {
        match self.actions.as_slice() {
            [single] => single.describe(),
            many => format!("{} ({} actions)", many[0].describe(), many.len()),
        }
    }
}

/// Bounded undo/redo engine
pub struct UndoManager {
    undo_stack: VecDeque<UndoStep>,
    redo_stack: Vec<UndoStep>,
    max_depth: usize,
    /// Actions still owed to the currently open step (num_actions grouping)
    pending_group: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl UndoManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
            pending_group: 0,
        }
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Description of the step `undo` would revert
    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|s| s.describe())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(|s| s.describe())
    }

    /// Execute an action and record it.
    ///
    /// If the previous action declared `num_actions() == k`, the next
    /// `k - 1` actions join its undo step instead of opening new ones.
    pub fn perform(
        &mut self,
        mut action: Box<dyn Action>,
        project: &mut Project,
    ) -> StateResult<()> {
        action.execute(project)?;
        log::debug!("performed: {}", action.describe());

        if !self.redo_stack.is_empty() {
            let dropped: Vec<UndoStep> = self.redo_stack.drain(..).collect();
            for mut step in dropped {
                for a in &mut step.actions {
                    a.finalize(project);
                }
            }
            self.gc(project);
        }

        let group_len = action.num_actions();
        if self.pending_group > 0 {
            self.pending_group -= 1;
            if let Some(step) = self.undo_stack.back_mut() {
                step.actions.push(action);
                return Ok(());
            }
        }
        self.pending_group = group_len.saturating_sub(1);
        self.undo_stack.push_back(UndoStep {
            actions: vec![action],
        });

        while self.undo_stack.len() > self.max_depth {
            if let Some(mut evicted) = self.undo_stack.pop_front() {
                log::debug!("evicting undo step: {}", evicted.describe());
                for a in &mut evicted.actions {
                    a.finalize(project);
                }
            }
            self.gc(project);
        }
        Ok(())
    }

    /// Revert the most recent step.
    pub fn undo(&mut self, project: &mut Project) -> StateResult<()> {
        let mut step = self.undo_stack.pop_back().ok_or(StateError::NothingToUndo)?;
        self.pending_group = 0;
        for action in step.actions.iter_mut().rev() {
            action.undo(project)?;
        }
        log::debug!("undone: {}", step.describe());
        self.redo_stack.push(step);
        Ok(())
    }

    /// Re-apply the most recently undone step.
    pub fn redo(&mut self, project: &mut Project) -> StateResult<()> {
        let mut step = self.redo_stack.pop().ok_or(StateError::NothingToRedo)?;
        for action in step.actions.iter_mut() {
            action.execute(project)?;
        }
        log::debug!("redone: {}", step.describe());
        self.undo_stack.push_back(step);
        Ok(())
    }

    /// Drop both stacks, finalizing everything (project close).
    pub fn clear(&mut self, project: &mut Project) {
        let mut steps: Vec<UndoStep> = self.undo_stack.drain(..).collect();
        steps.extend(self.redo_stack.drain(..));
        for step in &mut steps {
            for a in &mut step.actions {
                a.finalize(project);
            }
        }
        self.pending_group = 0;
        self.gc(project);
    }

    /// Release pool clips referenced by neither the live project nor any
    /// stored action.
    fn gc(&self, project: &mut Project) {
        let mut held: Vec<ClipId> = Vec::new();
        for step in self.undo_stack.iter().chain(self.redo_stack.iter()) {
            for a in &step.actions {
                held.extend(a.referenced_clips());
            }
        }
        for t in &project.tracks {
            for lane in t.lanes.iter().chain(t.automation_lanes.iter()) {
                for r in &lane.regions {
                    if let crate::RegionData::Audio { clip_id, .. } = &r.data {
                        held.push(*clip_id);
                    }
                }
            }
        }
        let released = project.pool.remove_unused(|id| held.contains(&id));
        if released > 0 {
            log::info!("released {released} unused pool clip(s)");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CreateOrDeleteAction, MoveOrDuplicateAction, Region, RegionData, Selection, Track,
        TrackKind,
    };
    use ll_core::{Position, RegionId, RegionType};

    fn project() -> Project {
        let mut p = Project::new("test", 48000);
        p.tracks.push(Track::new("Piano", TrackKind::Midi));
        p
    }

    fn midi_region(p: &Project, start: f64, end: f64) -> Region {
        Region::new(
            RegionId::new(RegionType::Midi, p.tracks[0].name_hash, 0, 0),
            "r",
            Position::from_ticks(start, &p.tempo_map),
            Position::from_ticks(end, &p.tempo_map),
            RegionData::Midi { notes: Vec::new() },
            &p.tempo_map,
        )
    }

    fn region_count(p: &Project) -> usize {
        p.tracks[0].lanes.iter().map(|l| l.regions.len()).sum()
    }

    #[test]
    fn test_perform_undo_redo() {
        let mut p = project();
        let mut mgr = UndoManager::default();

        let action = CreateOrDeleteAction::create(vec![midi_region(&p, 0.0, 3840.0)]);
        mgr.perform(Box::new(action), &mut p).unwrap();
        assert_eq!(region_count(&p), 1);
        assert!(mgr.can_undo());

        mgr.undo(&mut p).unwrap();
        assert_eq!(region_count(&p), 0);
        assert!(mgr.can_redo());

        mgr.redo(&mut p).unwrap();
        assert_eq!(region_count(&p), 1);
        p.validate().unwrap();
    }

    #[test]
    fn test_undo_empty_errors() {
        let mut p = project();
        let mut mgr = UndoManager::default();
        assert!(matches!(mgr.undo(&mut p), Err(StateError::NothingToUndo)));
        assert!(matches!(mgr.redo(&mut p), Err(StateError::NothingToRedo)));
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut p = project();
        let mut mgr = UndoManager::default();

        mgr.perform(
            Box::new(CreateOrDeleteAction::create(vec![midi_region(
                &p, 0.0, 3840.0,
            )])),
            &mut p,
        )
        .unwrap();
        mgr.undo(&mut p).unwrap();
        assert!(mgr.can_redo());

        mgr.perform(
            Box::new(CreateOrDeleteAction::create(vec![midi_region(
                &p, 3840.0, 7680.0,
            )])),
            &mut p,
        )
        .unwrap();
        assert!(!mgr.can_redo());
    }

    #[test]
    fn test_num_actions_groups_into_one_step() {
        let mut p = project();
        let mut mgr = UndoManager::default();

        // two creates collapsed into one undo step
        mgr.perform(
            Box::new(
                CreateOrDeleteAction::create(vec![midi_region(&p, 0.0, 3840.0)])
                    .with_num_actions(2),
            ),
            &mut p,
        )
        .unwrap();
        mgr.perform(
            Box::new(CreateOrDeleteAction::create(vec![midi_region(
                &p, 3840.0, 7680.0,
            )])),
            &mut p,
        )
        .unwrap();

        assert_eq!(mgr.undo_len(), 1);
        assert_eq!(region_count(&p), 2);

        mgr.undo(&mut p).unwrap();
        assert_eq!(region_count(&p), 0);
        mgr.redo(&mut p).unwrap();
        assert_eq!(region_count(&p), 2);
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let mut p = project();
        let mut mgr = UndoManager::new(3);

        for i in 0..5 {
            let start = i as f64 * 3840.0;
            mgr.perform(
                Box::new(CreateOrDeleteAction::create(vec![midi_region(
                    &p,
                    start,
                    start + 3840.0,
                )])),
                &mut p,
            )
            .unwrap();
        }
        assert_eq!(mgr.undo_len(), 3);
        assert_eq!(region_count(&p), 5);

        // only the last 3 creates can be unwound
        while mgr.can_undo() {
            mgr.undo(&mut p).unwrap();
        }
        assert_eq!(region_count(&p), 2);
    }

    #[test]
    fn test_move_undo_redo_counting() {
        let mut p = project();
        let mut mgr = UndoManager::default();
        let id = p.add_region(midi_region(&p, 0.0, 3840.0)).unwrap();
        let mut sel = Selection::timeline();
        sel.add_region(p.find_region(&id).unwrap().clone());

        mgr.perform(
            Box::new(MoveOrDuplicateAction::r#move(&sel, 400.0)),
            &mut p,
        )
        .unwrap();
        assert!((p.tracks[0].lanes[0].regions[0].pos.ticks - 400.0).abs() < 1e-9);
        assert_eq!(mgr.undo_len(), 1);

        mgr.undo(&mut p).unwrap();
        assert!((p.tracks[0].lanes[0].regions[0].pos.ticks - 0.0).abs() < 1e-9);
        assert_eq!(mgr.undo_len(), 0);
        assert_eq!(mgr.redo_len(), 1);

        mgr.redo(&mut p).unwrap();
        assert!((p.tracks[0].lanes[0].regions[0].pos.ticks - 400.0).abs() < 1e-9);
        assert_eq!(mgr.undo_len(), 1);
        assert_eq!(mgr.redo_len(), 0);
    }

    #[test]
    fn test_descriptions() {
        let mut p = project();
        let mut mgr = UndoManager::default();
        assert!(mgr.undo_description().is_none());
        mgr.perform(
            Box::new(CreateOrDeleteAction::create(vec![midi_region(
                &p, 0.0, 3840.0,
            )])),
            &mut p,
        )
        .unwrap();
        assert!(mgr.undo_description().unwrap().contains("Create"));
    }
}
