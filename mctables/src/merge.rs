// Copyright 2022 Oxide Computer Company

use crate::bitset::BitSet;
use crate::table::{KeyMask, Table};

/// A candidate merge: a set of table indices that could be replaced by a
/// single entry matching the union of their patterns, together with that
/// entry's folded keymask. The table is supplied to `add`/`remove`
/// rather than stored so that the caller can keep mutating the table
/// while merges against it exist.
///
/// All included entries are expected to share a route; the ordered
/// covering search enforces that externally.
#[derive(Debug, Clone)]
pub struct Merge {
    entries: BitSet,
    keymask: KeyMask,
}

impl Merge {
    pub fn new(table: &Table) -> Self {
        Self { entries: BitSet::new(table.len()), keymask: KeyMask::NONE }
    }

    /// The pattern the merged entry would carry. `KeyMask::NONE` while
    /// the merge is empty.
    pub fn keymask(&self) -> KeyMask {
        self.keymask
    }

    /// Number of entries included in the merge.
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A merge of k entries replaces k table slots by one, so its
    /// goodness is k - 1. The empty merge has goodness -1.
    pub fn goodness(&self) -> i32 {
        self.entries.count() as i32 - 1
    }

    pub fn contains(&self, i: usize) -> bool {
        self.entries.contains(i)
    }

    /// The included indices, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter()
    }

    /// Include entry `i`, folding its pattern into the merge keymask.
    /// Out-of-range indices are ignored.
    pub fn add(&mut self, table: &Table, i: usize) {
        if self.entries.add(i) {
            let km = table.entries[i].keymask;
            if self.keymask == KeyMask::NONE {
                self.keymask = km;
            } else {
                self.keymask = self.keymask.merge(&km);
            }
        }
    }

    /// Exclude entry `i`. The folded keymask is rebuilt from scratch
    /// over the remaining entries: merging is not invertible, removing
    /// a pattern can make the fold strictly narrower.
    pub fn remove(&mut self, table: &Table, i: usize) {
        if self.entries.remove(i) {
            let mut km = KeyMask::NONE;
            for j in self.entries.iter() {
                let other = table.entries[j].keymask;
                if km == KeyMask::NONE {
                    km = other;
                } else {
                    km = km.merge(&other);
                }
            }
            self.keymask = km;
        }
    }

    /// Reset to the empty merge.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keymask = KeyMask::NONE;
    }
}
