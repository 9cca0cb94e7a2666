//! Stable identities
//!
//! Every cross-entity reference in the model is a value identity that
//! survives serialization: tracks are referenced by a hash of their name,
//! regions by a path-like id (track hash, lane, index), children by their
//! owning region id plus index. Actions store these ids, never pointers,
//! so undo/redo still resolves after a full save/reload.

use serde::{Deserialize, Serialize};

/// Stable hash of a track name
pub type TrackNameHash = u32;

/// FNV-1a over the track name. Stable across platforms and reloads.
pub fn track_name_hash(name: &str) -> TrackNameHash {
    const FNV_OFFSET: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;
    let mut hash = FNV_OFFSET;
    for b in name.as_bytes() {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable handle for a pool clip. Never reused within a project lifetime.
pub type ClipId = u64;

/// Region content/behavior type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionType {
    Midi,
    Audio,
    Automation,
    Chord,
}

/// Link group index into the registry
pub type LinkGroupId = usize;

/// Stable region identity
///
/// `link_group` is carried in the id (as in the serialized project) so a
/// cloned selection remembers membership without consulting the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId {
    pub rtype: RegionType,
    pub track: TrackNameHash,
    /// Lane index within the track (automation lane for automation regions)
    pub lane: usize,
    /// Index within the lane, ascending by position
    pub idx: usize,
    pub link_group: Option<LinkGroupId>,
}

impl RegionId {
    pub fn new(rtype: RegionType, track: TrackNameHash, lane: usize, idx: usize) -> Self {
        Self {
            rtype,
            track,
            lane,
            idx,
            link_group: None,
        }
    }

    /// Identity equality ignoring link membership (moves/links restamp the
    /// group without making it a different region).
    pub fn same_slot(&self, other: &RegionId) -> bool {
        self.rtype == other.rtype
            && self.track == other.track
            && self.lane == other.lane
            && self.idx == other.idx
    }
}

/// Stable identity of a region-owned child (note, automation point, chord hit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildId {
    pub region: RegionId,
    pub index: usize,
}
