//! Token equivalence classes
//!
//! An equivalence class (EC) groups every source token position that must
//! name the same program entity. Classes live in an arena and are addressed
//! by stable [`EcId`] indices; union-by-rank with path compression makes
//! `merge` cheap, and the process-wide `Tokid -> EcId` map is the only
//! cross-cutting structure. The map covers every byte offset of every
//! member span, so streaming passes can probe it per byte.
//!
//! Invariants maintained here:
//! - all members of a class span byte ranges of identical length;
//! - every mapped Tokid resolves to the class that lists it as a member;
//! - no two live classes share a byte.

use crate::ec::attr::{AttrSet, ATTR_CSCOPE, ATTR_LSCOPE, ATTR_READONLY};
use crate::source::fileid::FileId;
use crate::source::tokid::Tokid;
use std::collections::{BTreeSet, HashMap};

/// Stable arena index of an equivalence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EcId(pub u32);

/// Payload of a live class root.
#[derive(Debug, Clone)]
pub struct EcData {
    /// Byte length of every member's lexeme
    pub len: u32,
    pub attrs: AttrSet,
    pub members: BTreeSet<Tokid>,
}

#[derive(Debug)]
struct EcNode {
    parent: u32,
    rank: u8,
    data: Option<EcData>,
}

/// Arena of equivalence classes plus the process-wide Tokid map.
#[derive(Debug, Default)]
pub struct EcStore {
    nodes: Vec<EcNode>,
    map: HashMap<Tokid, EcId>,
}

impl EcStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical root of `id`, with path compression.
    pub fn find(&mut self, id: EcId) -> EcId {
        let mut root = id.0;
        while self.nodes[root as usize].parent != root {
            root = self.nodes[root as usize].parent;
        }
        // Second walk: point every node on the path at the root
        let mut cur = id.0;
        while self.nodes[cur as usize].parent != root {
            let next = self.nodes[cur as usize].parent;
            self.nodes[cur as usize].parent = root;
            cur = next;
        }
        EcId(root)
    }

    /// Canonical root without compression, for read-only contexts.
    pub fn find_ro(&self, id: EcId) -> EcId {
        let mut root = id.0;
        while self.nodes[root as usize].parent != root {
            root = self.nodes[root as usize].parent;
        }
        EcId(root)
    }

    /// Whether the class behind `id` still exists.
    pub fn live(&self, id: EcId) -> bool {
        self.nodes[self.find_ro(id).0 as usize].data.is_some()
    }

    pub fn data(&self, id: EcId) -> &EcData {
        self.nodes[self.find_ro(id).0 as usize]
            .data
            .as_ref()
            .expect("dead equivalence class")
    }

    pub fn data_mut(&mut self, id: EcId) -> &mut EcData {
        let root = self.find(id);
        self.nodes[root.0 as usize]
            .data
            .as_mut()
            .expect("dead equivalence class")
    }

    /// The live class covering `t`, if any.
    pub fn lookup(&mut self, t: Tokid) -> Option<EcId> {
        let id = *self.map.get(&t)?;
        let root = self.find(id);
        self.nodes[root.0 as usize].data.as_ref().map(|_| root)
    }

    /// Read-only probe of the map.
    pub fn lookup_ro(&self, t: Tokid) -> Option<EcId> {
        let id = *self.map.get(&t)?;
        let root = self.find_ro(id);
        self.nodes[root.0 as usize].data.as_ref().map(|_| root)
    }

    /// Return the class covering `tokid`, allocating a fresh singleton if
    /// none exists.
    ///
    /// A pre-existing longer class is split first, keeping classes
    /// byte-aligned; coverage never partially overlaps.
    pub fn ec_for(
        &mut self,
        tokid: Tokid,
        len: u32,
        readonly: bool,
        project: Option<usize>,
    ) -> EcId {
        if let Some(existing) = self.lookup(tokid) {
            let have = self.data(existing).len;
            if have == len {
                if let Some(p) = project {
                    self.data_mut(existing).attrs.set(p);
                }
                return existing;
            }
            if have > len {
                let (left, _) = self.split(existing, len);
                if let Some(p) = project {
                    self.data_mut(left).attrs.set(p);
                }
                return left;
            }
            debug_assert!(false, "shorter class already covers {tokid}");
            return existing;
        }

        let mut attrs = AttrSet::new();
        if readonly {
            attrs.set(ATTR_READONLY);
        }
        if let Some(p) = project {
            attrs.set(p);
        }
        let id = EcId(self.nodes.len() as u32);
        let mut members = BTreeSet::new();
        members.insert(tokid);
        self.nodes.push(EcNode {
            parent: id.0,
            rank: 0,
            data: Some(EcData { len, attrs, members }),
        });
        for i in 0..len {
            self.map.insert(tokid.advance(i as u64), id);
        }
        id
    }

    /// Split a class at `new_len`, fanning every member into a left class
    /// of `new_len` bytes and a right class holding the remainder.
    pub fn split(&mut self, id: EcId, new_len: u32) -> (EcId, EcId) {
        let left = self.find(id);
        let (old_len, attrs, members) = {
            let d = self.nodes[left.0 as usize]
                .data
                .as_ref()
                .expect("split of dead class");
            (d.len, d.attrs.clone(), d.members.clone())
        };
        assert!(new_len > 0 && new_len < old_len, "split length out of range");

        let right = EcId(self.nodes.len() as u32);
        let right_members: BTreeSet<Tokid> =
            members.iter().map(|t| t.advance(new_len as u64)).collect();
        self.nodes.push(EcNode {
            parent: right.0,
            rank: 0,
            data: Some(EcData {
                len: old_len - new_len,
                attrs,
                members: right_members,
            }),
        });
        // Rewrite the map for the tail of every member span
        for t in &members {
            for i in new_len..old_len {
                self.map.insert(t.advance(i as u64), right);
            }
        }
        let d = self.nodes[left.0 as usize].data.as_mut().unwrap();
        d.len = new_len;
        (left, right)
    }

    /// Union two classes of equal length; returns the surviving root.
    /// Idempotent when both resolve to the same class.
    pub fn merge(&mut self, a: EcId, b: EcId) -> EcId {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        debug_assert_eq!(
            self.data(ra).len,
            self.data(rb).len,
            "merging classes of different lengths"
        );
        if self.data(ra).len != self.data(rb).len {
            return ra;
        }

        let (winner, loser) = if self.nodes[ra.0 as usize].rank >= self.nodes[rb.0 as usize].rank {
            (ra, rb)
        } else {
            (rb, ra)
        };
        if self.nodes[winner.0 as usize].rank == self.nodes[loser.0 as usize].rank {
            self.nodes[winner.0 as usize].rank += 1;
        }
        let dissolved = self.nodes[loser.0 as usize].data.take().unwrap();
        self.nodes[loser.0 as usize].parent = winner.0;
        let d = self.nodes[winner.0 as usize].data.as_mut().unwrap();
        d.attrs.merge(&dissolved.attrs);
        d.members.extend(dissolved.members);
        winner
    }

    /// Destroy a class: drop its payload and unmap every member byte.
    pub fn remove(&mut self, id: EcId) {
        let root = self.find(id);
        let data = match self.nodes[root.0 as usize].data.take() {
            Some(d) => d,
            None => return,
        };
        for t in &data.members {
            for i in 0..data.len {
                self.map.remove(&t.advance(i as u64));
            }
        }
    }

    pub fn set_attr(&mut self, id: EcId, attr: usize) {
        self.data_mut(id).attrs.set(attr);
    }

    pub fn test_attr(&self, id: EcId, attr: usize) -> bool {
        self.data(id).attrs.test(attr)
    }

    /// A class is unused when it has a single member and names something
    /// with file or project scope.
    pub fn is_unused(&self, id: EcId) -> bool {
        let d = self.data(id);
        d.members.len() == 1 && (d.attrs.test(ATTR_CSCOPE) || d.attrs.test(ATTR_LSCOPE))
    }

    /// Distinct files containing members of this class, sorted.
    pub fn sorted_files(&self, id: EcId) -> BTreeSet<FileId> {
        self.data(id).members.iter().map(|t| t.file).collect()
    }

    /// Resolve an untrusted raw index (for example from a URL) to a live
    /// class root.
    pub fn resolve(&self, raw: u32) -> Option<EcId> {
        if (raw as usize) >= self.nodes.len() {
            return None;
        }
        let root = self.find_ro(EcId(raw));
        self.nodes[root.0 as usize].data.as_ref().map(|_| root)
    }

    /// Number of entries in the Tokid map.
    pub fn map_size(&self) -> usize {
        self.map.len()
    }

    /// Snapshot of the mapped Tokids within one file, sorted.
    pub fn mapped_tokids_in_file(&self, fid: FileId) -> Vec<(Tokid, EcId)> {
        let mut v: Vec<(Tokid, EcId)> = self
            .map
            .iter()
            .filter(|(t, _)| t.file == fid)
            .map(|(t, id)| (*t, *id))
            .collect();
        v.sort();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(file: u32, off: u64) -> Tokid {
        Tokid::new(FileId(file), off)
    }

    #[test]
    fn ec_for_is_idempotent_and_covers_every_byte() {
        let mut s = EcStore::new();
        let a = s.ec_for(t(0, 10), 3, false, None);
        let b = s.ec_for(t(0, 10), 3, false, None);
        assert_eq!(a, b);
        for i in 0..3 {
            assert_eq!(s.lookup(t(0, 10 + i)), Some(a));
        }
        assert_eq!(s.lookup(t(0, 13)), None);
    }

    #[test]
    fn every_mapped_tokid_resolves_to_a_class_listing_it() {
        let mut s = EcStore::new();
        let a = s.ec_for(t(0, 0), 4, false, None);
        let b = s.ec_for(t(1, 7), 4, false, None);
        s.merge(a, b);
        let root = s.find(a);
        for start in [t(0, 0), t(1, 7)] {
            assert!(s.data(root).members.contains(&start));
            for i in 0..4 {
                assert_eq!(s.lookup(start.advance(i)), Some(root));
            }
        }
    }

    #[test]
    fn merge_is_commutative_associative_idempotent() {
        // Build the same three-way union in two different orders and
        // compare the resulting member sets.
        let build = |order: &[(usize, usize)]| {
            let mut s = EcStore::new();
            let ecs = [
                s.ec_for(t(0, 0), 2, false, None),
                s.ec_for(t(0, 10), 2, false, None),
                s.ec_for(t(0, 20), 2, false, None),
            ];
            for &(i, j) in order {
                s.merge(ecs[i], ecs[j]);
            }
            let root = s.find(ecs[0]);
            s.data(root).members.clone()
        };
        let forward = build(&[(0, 1), (1, 2)]);
        let reverse = build(&[(2, 1), (0, 2), (0, 1)]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 3);
    }

    #[test]
    fn merge_unions_attributes() {
        let mut s = EcStore::new();
        let a = s.ec_for(t(0, 0), 2, true, None);
        let b = s.ec_for(t(0, 10), 2, false, Some(crate::ec::attr::ATTR_BASE));
        let r = s.merge(a, b);
        assert!(s.test_attr(r, ATTR_READONLY));
        assert!(s.test_attr(r, crate::ec::attr::ATTR_BASE));
    }

    #[test]
    fn split_fans_members_and_rewrites_the_map() {
        let mut s = EcStore::new();
        let a = s.ec_for(t(0, 0), 6, false, None);
        let b = s.ec_for(t(0, 100), 6, false, None);
        s.merge(a, b);
        let (left, right) = s.split(a, 2);
        assert_eq!(s.data(left).len, 2);
        assert_eq!(s.data(right).len, 4);
        assert!(s.data(right).members.contains(&t(0, 2)));
        assert!(s.data(right).members.contains(&t(0, 102)));
        assert_eq!(s.lookup(t(0, 1)), Some(s.find(left)));
        assert_eq!(s.lookup(t(0, 3)), Some(s.find(right)));
        assert_eq!(s.lookup(t(0, 103)), Some(s.find(right)));
    }

    #[test]
    fn ec_for_shorter_lexeme_splits_existing_class() {
        let mut s = EcStore::new();
        let whole = s.ec_for(t(0, 0), 5, false, None);
        let head = s.ec_for(t(0, 0), 2, false, None);
        assert_eq!(s.data(head).len, 2);
        assert_eq!(s.find(head), s.find(whole));
        let tail = s.lookup(t(0, 2)).unwrap();
        assert_eq!(s.data(tail).len, 3);
    }

    #[test]
    fn remove_unmaps_every_member_byte() {
        let mut s = EcStore::new();
        let a = s.ec_for(t(0, 0), 3, false, None);
        let b = s.ec_for(t(1, 0), 3, false, None);
        s.merge(a, b);
        s.remove(a);
        assert!(!s.live(a));
        assert_eq!(s.lookup(t(0, 1)), None);
        assert_eq!(s.lookup(t(1, 2)), None);
    }

    #[test]
    fn unused_requires_singleton_and_scope() {
        let mut s = EcStore::new();
        let a = s.ec_for(t(0, 0), 3, false, None);
        assert!(!s.is_unused(a));
        s.set_attr(a, ATTR_LSCOPE);
        assert!(s.is_unused(a));
        let b = s.ec_for(t(0, 10), 3, false, None);
        s.merge(a, b);
        assert!(!s.is_unused(a));
    }
}
