//! Link groups
//!
//! Linked regions share content: editing the children of one member is
//! mirrored onto its siblings, while position, name and mute state stay
//! per-member. Membership is recorded twice, on the region id and in this
//! registry, and the two views are cross-checked by project validation.
//!
//! A group below two members is meaningless and dissolves automatically;
//! the registry reports which regions must have their membership cleared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ll_core::{LinkGroupId, RegionId};

/// One group of content-linked regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkGroup {
    pub members: Vec<RegionId>,
}

/// Registry of link groups, ids monotonic and never reused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkGroupManager {
    groups: BTreeMap<LinkGroupId, LinkGroup>,
    next_id: LinkGroupId,
}

impl LinkGroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty group and return its id.
    pub fn add_group(&mut self) -> LinkGroupId {
        let id = self.next_id;
        self.next_id += 1;
        self.groups.insert(id, LinkGroup::default());
        id
    }

    /// Re-create a group under a previously used id, for undo restores.
    /// Fails silently into a fresh insert if the id is already live.
    pub fn restore_group(&mut self, id: LinkGroupId) {
        self.groups.entry(id).or_default();
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    pub fn group(&self, id: LinkGroupId) -> Option<&LinkGroup> {
        self.groups.get(&id)
    }

    pub fn group_ids(&self) -> impl Iterator<Item = LinkGroupId> + '_ {
        self.groups.keys().copied()
    }

    pub fn contains(&self, id: LinkGroupId) -> bool {
        self.groups.contains_key(&id)
    }

    /// Add a member, ignoring duplicates by slot.
    pub fn add_member(&mut self, id: LinkGroupId, region: RegionId) {
        let group = self.groups.entry(id).or_default();
        if !group.members.iter().any(|m| m.same_slot(&region)) {
            group.members.push(region);
        }
    }

    /// Remove a member by slot. If the group drops below two members it
    /// dissolves; the returned ids are the orphans whose regions must have
    /// `link_group` cleared by the caller.
    pub fn remove_member(&mut self, id: LinkGroupId, region: &RegionId) -> Vec<RegionId> {
        let Some(group) = self.groups.get_mut(&id) else {
            return Vec::new();
        };
        group.members.retain(|m| !m.same_slot(region));
        if group.members.len() < 2 {
            let orphans = self.groups.remove(&id).map(|g| g.members).unwrap_or_default();
            log::debug!("link group {id} dissolved ({} orphan(s))", orphans.len());
            orphans
        } else {
            Vec::new()
        }
    }

    /// Siblings of a region within its group (the region itself excluded)
    pub fn siblings(&self, id: LinkGroupId, region: &RegionId) -> Vec<RegionId> {
        self.groups
            .get(&id)
            .map(|g| {
                g.members
                    .iter()
                    .filter(|m| !m.same_slot(region))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rebuild every group's member list from the live regions' own
    /// membership fields. Run after renumbering; groups are kept even if
    /// momentarily empty (dissolve is an explicit action).
    pub fn refresh_members(&mut self, live: impl IntoIterator<Item = RegionId>) {
        for g in self.groups.values_mut() {
            g.members.clear();
        }
        for id in live {
            if let Some(gid) = id.link_group {
                if let Some(g) = self.groups.get_mut(&gid) {
                    g.members.push(id);
                }
            }
        }
    }

    /// Re-stamp a member id after the region moved slots (renumbering,
    /// track rename, lane move).
    pub fn update_member(&mut self, id: LinkGroupId, old: &RegionId, new: RegionId) {
        if let Some(group) = self.groups.get_mut(&id) {
            for m in &mut group.members {
                if m.same_slot(old) {
                    *m = new;
                }
            }
        }
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use ll_core::{track_name_hash, RegionType};

    fn rid(idx: usize) -> RegionId {
        RegionId::new(RegionType::Midi, track_name_hash("Piano"), 0, idx)
    }

    #[test]
    fn test_group_ids_monotonic() {
        let mut mgr = LinkGroupManager::new();
        let a = mgr.add_group();
        let b = mgr.add_group();
        assert_ne!(a, b);
        mgr.add_member(a, rid(0));
        // a dissolves (single member), its id is not reused
        assert!(mgr.remove_member(a, &rid(1)).len() <= 1);
        let c = mgr.add_group();
        assert!(c > b);
    }

    #[test]
    fn test_dissolve_below_two_members() {
        let mut mgr = LinkGroupManager::new();
        let g = mgr.add_group();
        mgr.add_member(g, rid(0));
        mgr.add_member(g, rid(1));
        mgr.add_member(g, rid(2));

        assert!(mgr.remove_member(g, &rid(2)).is_empty());
        assert!(mgr.contains(g));

        let orphans = mgr.remove_member(g, &rid(1));
        assert_eq!(orphans.len(), 1);
        assert!(orphans[0].same_slot(&rid(0)));
        assert!(!mgr.contains(g));
    }

    #[test]
    fn test_siblings_excludes_self() {
        let mut mgr = LinkGroupManager::new();
        let g = mgr.add_group();
        mgr.add_member(g, rid(0));
        mgr.add_member(g, rid(1));
        mgr.add_member(g, rid(2));
        let sibs = mgr.siblings(g, &rid(1));
        assert_eq!(sibs.len(), 2);
        assert!(sibs.iter().all(|m| !m.same_slot(&rid(1))));
    }

    #[test]
    fn test_restore_group_for_undo() {
        let mut mgr = LinkGroupManager::new();
        let g = mgr.add_group();
        mgr.add_member(g, rid(0));
        mgr.add_member(g, rid(1));
        mgr.remove_member(g, &rid(1));
        assert!(!mgr.contains(g));

        mgr.restore_group(g);
        mgr.add_member(g, rid(0));
        mgr.add_member(g, rid(1));
        assert_eq!(mgr.group(g).unwrap().members.len(), 2);
    }
}
