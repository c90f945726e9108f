// Copyright 2022 Oxide Computer Company

//! m-Trie minimisation. Patterns sharing a route are inserted one at a
//! time into a ternary trie; whenever two sibling subtrees both come to
//! contain the pattern being inserted the subtrees are collapsed into
//! the wildcard sibling, introducing an X at that bit. At steady state
//! the leaves are a minimum-cardinality ternary decomposition of the
//! inserted set.

use crate::bitset::BitSet;
use crate::table::{Entry, KeyMask, Table};

#[derive(Debug, Clone, Copy)]
enum Digit {
    Zero,
    One,
    X,
}

// The ternary digit of (key, mask) at `bit`, or None for `!`.
fn digit(key: u32, mask: u32, bit: u32) -> Option<Digit> {
    match (key & bit != 0, mask & bit != 0) {
        (false, true) => Some(Digit::Zero),
        (true, true) => Some(Digit::One),
        (false, false) => Some(Digit::X),
        (true, false) => None,
    }
}

/// One trie level. `bit` is the single mask bit this level decides;
/// the root decides 0x8000_0000, halving at each level down to the
/// leaves, which carry bit 0. A root-to-leaf path is one pattern.
#[derive(Debug)]
struct Node {
    bit: u32,
    child_0: Option<Box<Node>>,
    child_1: Option<Box<Node>>,
    child_x: Option<Box<Node>>,
}

impl Node {
    fn new(bit: u32) -> Self {
        Self { bit, child_0: None, child_1: None, child_x: None }
    }

    fn child_mut(&mut self, d: Digit) -> &mut Option<Box<Node>> {
        match d {
            Digit::Zero => &mut self.child_0,
            Digit::One => &mut self.child_1,
            Digit::X => &mut self.child_x,
        }
    }

    fn child(&self, d: Digit) -> &Option<Box<Node>> {
        match d {
            Digit::Zero => &self.child_0,
            Digit::One => &self.child_1,
            Digit::X => &self.child_x,
        }
    }

    // True iff following the digits of (key, mask) from this node
    // reaches a leaf.
    fn path_exists(&self, key: u32, mask: u32) -> bool {
        if self.bit == 0 {
            return true;
        }
        match digit(key, mask, self.bit) {
            Some(d) => self
                .child(d)
                .as_ref()
                .map_or(false, |n| n.path_exists(key, mask)),
            None => false,
        }
    }

    // Create the path of (key, mask) below this node, reusing whatever
    // prefix already exists.
    fn ensure_path(&mut self, key: u32, mask: u32) {
        if self.bit == 0 {
            return;
        }
        let bit = self.bit;
        if let Some(d) = digit(key, mask, bit) {
            self.child_mut(d)
                .get_or_insert_with(|| Box::new(Node::new(bit >> 1)))
                .ensure_path(key, mask);
        }
    }

    // Delete the path of (key, mask) under `slot`, freeing any interior
    // node left childless. Other paths through the same prefix are
    // untouched.
    fn untraverse(slot: &mut Option<Box<Node>>, key: u32, mask: u32) {
        let node = match slot.as_deref_mut() {
            Some(n) => n,
            None => return,
        };
        if node.bit == 0 {
            *slot = None;
            return;
        }
        if let Some(d) = digit(key, mask, node.bit) {
            Self::untraverse(node.child_mut(d), key, mask);
        }
        if node.child_0.is_none()
            && node.child_1.is_none()
            && node.child_x.is_none()
        {
            *slot = None;
        }
    }

    // Insert the path of (key, mask), then on the way back up apply the
    // sibling collapses. The pair is threaded mutably: each collapse
    // turns this level's digit into an X, which the levels above then
    // see.
    fn insert_path(&mut self, key: &mut u32, mask: &mut u32) {
        if self.bit == 0 {
            return;
        }
        let bit = self.bit;
        let d = match digit(*key, *mask, bit) {
            Some(d) => d,
            None => return,
        };
        self.child_mut(d)
            .get_or_insert_with(|| Box::new(Node::new(bit >> 1)))
            .insert_path(key, mask);
        self.collapse(key, mask);
    }

    fn collapse(&mut self, key: &mut u32, mask: &mut u32) {
        let bit = self.bit;
        let in_0 = self
            .child_0
            .as_ref()
            .map_or(false, |n| n.path_exists(*key, *mask));
        let in_1 = self
            .child_1
            .as_ref()
            .map_or(false, |n| n.path_exists(*key, *mask));
        let in_x = self
            .child_x
            .as_ref()
            .map_or(false, |n| n.path_exists(*key, *mask));

        if in_0 && in_1 {
            // Both the 0 and 1 subtrees hold the path: move it into the
            // X subtree and drop the two copies.
            self.child_x
                .get_or_insert_with(|| Box::new(Node::new(bit >> 1)))
                .ensure_path(*key, *mask);
            Self::untraverse(&mut self.child_0, *key, *mask);
            Self::untraverse(&mut self.child_1, *key, *mask);
            *key &= !bit;
            *mask &= !bit;
        } else if in_x && in_0 {
            Self::untraverse(&mut self.child_0, *key, *mask);
            *key &= !bit;
            *mask &= !bit;
        } else if in_x && in_1 {
            Self::untraverse(&mut self.child_1, *key, *mask);
            *key &= !bit;
            *mask &= !bit;
        }
    }

    fn count(&self) -> usize {
        if self.bit == 0 {
            return 1;
        }
        self.child_0.as_ref().map_or(0, |n| n.count())
            + self.child_1.as_ref().map_or(0, |n| n.count())
            + self.child_x.as_ref().map_or(0, |n| n.count())
    }

    // Emit the leaves below this node in child_0, child_1, child_x
    // order. `pkey` carries the 1-edges of the path so far, `pmask` the
    // 0- and 1-edges.
    fn collect(&self, pkey: u32, pmask: u32, out: &mut Vec<KeyMask>) {
        if self.bit == 0 {
            out.push(KeyMask::new(pkey, pmask));
            return;
        }
        let bit = self.bit;
        if let Some(n) = &self.child_0 {
            n.collect(pkey, pmask | bit, out);
        }
        if let Some(n) = &self.child_1 {
            n.collect(pkey | bit, pmask | bit, out);
        }
        if let Some(n) = &self.child_x {
            n.collect(pkey, pmask, out);
        }
    }
}

/// A ternary trie over full 32-bit patterns with on-insert collapsing.
#[derive(Debug)]
pub struct MTrie {
    root: Node,
}

impl Default for MTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl MTrie {
    pub fn new() -> Self {
        Self { root: Node::new(1 << 31) }
    }

    /// Insert a pattern. Invalid keymasks are ignored.
    pub fn insert(&mut self, km: KeyMask) {
        if !km.is_valid() {
            return;
        }
        let mut key = km.key;
        let mut mask = km.mask;
        self.root.insert_path(&mut key, &mut mask);
    }

    /// Number of patterns currently held.
    pub fn count(&self) -> usize {
        self.root.count()
    }

    /// The held patterns in tree-walk order (0, then 1, then X at every
    /// level).
    pub fn entries(&self) -> Vec<KeyMask> {
        let mut out = Vec::with_capacity(self.count());
        self.root.collect(0x0, 0x0, &mut out);
        out
    }
}

/// Minimise a table by building one trie per distinct route. Output
/// partitions appear in first-appearance order of their routes; within a
/// partition entries appear in tree-walk order. Sources are discarded: a
/// collapsed pattern has no single meaningful inbound link, so every
/// output entry carries `source = 0`.
pub fn minimise(table: &mut Table) {
    let mut visited = BitSet::new(table.len());
    let mut out = Vec::with_capacity(table.len());

    for i in 0..table.len() {
        if visited.contains(i) {
            continue;
        }

        // Collect every entry sharing this route into a fresh trie
        let route = table.entries[i].route;
        let mut trie = MTrie::new();
        for j in i..table.len() {
            if table.entries[j].route == route {
                visited.add(j);
                trie.insert(table.entries[j].keymask);
            }
        }

        out.extend(
            trie.entries()
                .into_iter()
                .map(|km| Entry::new(km, route, 0x0)),
        );
    }

    table.entries = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_count() {
        let mut trie = MTrie::new();

        // Empty to begin with
        assert_eq!(trie.count(), 0);

        trie.insert(KeyMask::new(0x00000000, 0xffffffff));
        assert_eq!(trie.count(), 1);

        trie.insert(KeyMask::new(0x00000011, 0xffffffff));
        assert_eq!(trie.count(), 2);

        trie.insert(KeyMask::new(0x00000111, 0xfffff7ff));
        assert_eq!(trie.count(), 3);
    }

    #[test]
    fn entries_in_walk_order() {
        let mut trie = MTrie::new();
        trie.insert(KeyMask::new(0x00000000, 0xffffffff));
        trie.insert(KeyMask::new(0x00000011, 0xffffffff));
        trie.insert(KeyMask::new(0x00000111, 0xfffff7ff));

        let entries = trie.entries();
        assert_eq!(
            entries,
            vec![
                KeyMask::new(0x000, 0xffffffff),
                KeyMask::new(0x011, 0xffffffff),
                KeyMask::new(0x111, 0xfffff7ff),
            ]
        );
    }

    // Pairs of patterns whose leaves merge into ...X
    const LEAF_STIMS: [(KeyMask, KeyMask); 6] = [
        // ...0 and ...1
        (
            KeyMask { key: 0x0, mask: 0xffffffff },
            KeyMask { key: 0x1, mask: 0xffffffff },
        ),
        // ...0 and ...X
        (
            KeyMask { key: 0x0, mask: 0xffffffff },
            KeyMask { key: 0x0, mask: 0xfffffffe },
        ),
        // ...X and ...0
        (
            KeyMask { key: 0x0, mask: 0xfffffffe },
            KeyMask { key: 0x0, mask: 0xffffffff },
        ),
        // ...1 and ...0
        (
            KeyMask { key: 0x1, mask: 0xffffffff },
            KeyMask { key: 0x0, mask: 0xffffffff },
        ),
        // ...1 and ...X
        (
            KeyMask { key: 0x1, mask: 0xffffffff },
            KeyMask { key: 0x0, mask: 0xfffffffe },
        ),
        // ...X and ...1
        (
            KeyMask { key: 0x0, mask: 0xfffffffe },
            KeyMask { key: 0x1, mask: 0xffffffff },
        ),
    ];

    #[test]
    fn insert_and_merge_leaves() {
        for (a, b) in LEAF_STIMS {
            let mut trie = MTrie::new();
            trie.insert(a);
            trie.insert(b);
            assert_eq!(trie.count(), 1, "stim {a} + {b}");
            assert_eq!(
                trie.entries(),
                vec![KeyMask::new(0x0, 0xfffffffe)],
                "stim {a} + {b}"
            );
        }
    }

    // Pairs whose merge point is one level above the leaves: ...X0
    const NODE_STIMS: [(KeyMask, KeyMask); 6] = [
        // ...00 and ...10
        (
            KeyMask { key: 0x0, mask: 0xffffffff },
            KeyMask { key: 0x2, mask: 0xffffffff },
        ),
        // ...00 and ...X0
        (
            KeyMask { key: 0x0, mask: 0xffffffff },
            KeyMask { key: 0x0, mask: 0xfffffffd },
        ),
        // ...X0 and ...00
        (
            KeyMask { key: 0x0, mask: 0xfffffffd },
            KeyMask { key: 0x0, mask: 0xffffffff },
        ),
        // ...10 and ...00
        (
            KeyMask { key: 0x2, mask: 0xffffffff },
            KeyMask { key: 0x0, mask: 0xffffffff },
        ),
        // ...10 and ...X0
        (
            KeyMask { key: 0x2, mask: 0xffffffff },
            KeyMask { key: 0x0, mask: 0xfffffffd },
        ),
        // ...X0 and ...10
        (
            KeyMask { key: 0x0, mask: 0xfffffffd },
            KeyMask { key: 0x2, mask: 0xffffffff },
        ),
    ];

    #[test]
    fn insert_and_merge_nodes() {
        for (a, b) in NODE_STIMS {
            let mut trie = MTrie::new();
            trie.insert(a);
            trie.insert(b);
            assert_eq!(trie.count(), 1, "stim {a} + {b}");
            assert_eq!(
                trie.entries(),
                vec![KeyMask::new(0x0, 0xfffffffd)],
                "stim {a} + {b}"
            );
        }
    }

    #[test]
    fn insert_and_merge_partial() {
        let mut trie = MTrie::new();

        // Only the latter two of these can merge
        trie.insert(KeyMask::new(0b0101, 0xf));
        trie.insert(KeyMask::new(0b0000, 0xf));
        trie.insert(KeyMask::new(0b1000, 0xf));
        assert_eq!(trie.count(), 2);

        assert_eq!(
            trie.entries(),
            vec![
                KeyMask::new(0b0101, 0b1111),
                KeyMask::new(0b0000, 0b0111),
            ]
        );
    }

    #[test]
    fn minimise_route_partitioned() {
        // Minimise the table (routes N=0b000100, E=0b000001 etc.):
        //
        //   0000 -> N NE
        //   0001 -> N NE
        //   0010 -> E
        //   0011 -> E
        //   010X -> SW
        //   0110 -> SW
        //   0111 -> SW
        //   1010 -> N
        //   1001 -> N
        //
        // worked out by hand, the result should be:
        //
        //   000X -> N NE
        //   001X -> E
        //   01XX -> SW
        //   1001 -> N
        //   1010 -> N
        let mut table = Table::new(vec![
            Entry::new(KeyMask::new(0b0000, 0xf), 0b000110, 0b100000),
            Entry::new(KeyMask::new(0b0001, 0xf), 0b000110, 0b010000),
            Entry::new(KeyMask::new(0b0010, 0xf), 0b000001, 0b000100),
            Entry::new(KeyMask::new(0b0011, 0xf), 0b000001, 0b100000),
            Entry::new(KeyMask::new(0b0100, 0xe), 0b010000, 0b000100),
            Entry::new(KeyMask::new(0b0110, 0xf), 0b010000, 0b000100),
            Entry::new(KeyMask::new(0b0111, 0xf), 0b010000, 0b000100),
            Entry::new(KeyMask::new(0b1010, 0xf), 0b000100, 0b001000),
            Entry::new(KeyMask::new(0b1001, 0xf), 0b000100, 0b001000),
        ]);

        minimise(&mut table);

        assert_eq!(
            table.entries,
            vec![
                Entry::new(KeyMask::new(0b0000, 0b1110), 0b000110, 0),
                Entry::new(KeyMask::new(0b0010, 0b1110), 0b000001, 0),
                Entry::new(KeyMask::new(0b0100, 0b1100), 0b010000, 0),
                Entry::new(KeyMask::new(0b1001, 0b1111), 0b000100, 0),
                Entry::new(KeyMask::new(0b1010, 0b1111), 0b000100, 0),
            ]
        );
    }

    #[test]
    fn minimise_preserves_matched_words() {
        // Union of matched words per route is unchanged by minimisation
        let original = Table::new(vec![
            Entry::new(KeyMask::new(0b0000, 0xf), 0b01, 0),
            Entry::new(KeyMask::new(0b0001, 0xf), 0b01, 0),
            Entry::new(KeyMask::new(0b0011, 0xf), 0b10, 0),
            Entry::new(KeyMask::new(0b0010, 0xf), 0b01, 0),
            Entry::new(KeyMask::new(0b1000, 0xf), 0b10, 0),
        ]);
        let mut table = original.clone();
        minimise(&mut table);
        assert!(table.len() <= original.len());

        // Within a route the output patterns are pairwise disjoint
        for (i, a) in table.entries.iter().enumerate() {
            for b in &table.entries[i + 1..] {
                if a.route == b.route {
                    assert!(!a.keymask.intersects(&b.keymask));
                }
            }
        }

        for w in 0u32..16 {
            let before: u32 = original
                .entries
                .iter()
                .filter(|e| e.keymask.matches(w))
                .map(|e| e.route)
                .fold(0, |acc, r| acc | r);
            let after: u32 = table
                .entries
                .iter()
                .filter(|e| e.keymask.matches(w))
                .map(|e| e.route)
                .fold(0, |acc, r| acc | r);
            assert_eq!(before, after, "word {w:04b}");
        }
    }
}
