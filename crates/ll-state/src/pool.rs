//! Audio clip pool
//!
//! Regions never own sample data; they hold a [`ClipId`] into the pool.
//! Clip frames sit behind an `Arc` so playback snapshots clone the whole
//! project cheaply. Deleted regions keep their clips alive until the
//! owning undo step is evicted, at which point `finalize` releases them
//! through [`ClipPool::remove_unused`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ll_core::ClipId;

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO CLIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable interleaved audio material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    /// Interleaved samples. Skipped on serialize; the host re-reads the
    /// source file on project load.
    #[serde(skip)]
    pub frames: Arc<Vec<f32>>,
}

impl AudioClip {
    pub fn new(
        name: impl Into<String>,
        channels: u16,
        sample_rate: u32,
        frames: Vec<f32>,
    ) -> Self {
        Self {
            name: name.into(),
            channels,
            sample_rate,
            frames: Arc::new(frames),
        }
    }

    /// Length in frames (samples per channel)
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.frames.len() / self.channels as usize
    }

    /// Sample for one channel at a frame index, 0.0 past the end
    pub fn sample(&self, channel: u16, frame: usize) -> f32 {
        let idx = frame * self.channels as usize + channel as usize;
        self.frames.get(idx).copied().unwrap_or(0.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Project-wide clip registry with monotonically increasing ids
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClipPool {
    clips: BTreeMap<ClipId, AudioClip>,
    next_id: ClipId,
}

impl ClipPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip, returning its stable id.
    pub fn add(&mut self, clip: AudioClip) -> ClipId {
        let id = self.next_id;
        self.next_id += 1;
        self.clips.insert(id, clip);
        id
    }

    pub fn get(&self, id: ClipId) -> Option<&AudioClip> {
        self.clips.get(&id)
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.clips.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Drop every clip whose id is not in `in_use`. Returns how many were
    /// released. Ids are never reused, so a later undo referencing a
    /// released clip fails loudly instead of resolving to the wrong data.
    pub fn remove_unused(&mut self, in_use: impl Fn(ClipId) -> bool) -> usize {
        let before = self.clips.len();
        self.clips.retain(|id, _| in_use(*id));
        before - self.clips.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_monotonic_never_reused() {
        let mut pool = ClipPool::new();
        let a = pool.add(AudioClip::new("a", 2, 48000, vec![0.0; 96]));
        let b = pool.add(AudioClip::new("b", 2, 48000, vec![0.0; 96]));
        assert_ne!(a, b);
        pool.remove_unused(|id| id == b);
        let c = pool.add(AudioClip::new("c", 2, 48000, vec![0.0; 96]));
        assert!(c > b);
        assert!(!pool.contains(a));
    }

    #[test]
    fn test_sample_access_past_end_is_silent() {
        let clip = AudioClip::new("a", 2, 48000, vec![0.5, -0.5, 0.25, -0.25]);
        assert_eq!(clip.num_frames(), 2);
        assert_eq!(clip.sample(0, 0), 0.5);
        assert_eq!(clip.sample(1, 1), -0.25);
        assert_eq!(clip.sample(0, 2), 0.0);
    }
}
