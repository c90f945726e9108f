// Copyright 2022 Oxide Computer Company

use std::fmt;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// A ternary match pattern over a 32-bit multicast key, packed as a
/// (key, mask) pair. Each bit position encodes one ternary digit:
///
/// +----------+---------+-------+
/// | mask bit | key bit | digit |
/// +----------+---------+-------+
/// | 1        | 0       | 0     |
/// | 1        | 1       | 1     |
/// | 0        | 0       | X     |
/// | 0        | 1       | !     |
/// +----------+---------+-------+
///
/// The `!` digit means "no value" and never appears in a valid pattern,
/// so `key & !mask == 0` holds for every valid keymask.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct KeyMask {
    pub key: u32,
    pub mask: u32,
}

impl KeyMask {
    /// The pattern that matches nothing. Acts as the identity for
    /// [`KeyMask::merge`] folds.
    pub const NONE: Self = Self { key: 0xffff_ffff, mask: 0x0000_0000 };

    pub fn new(key: u32, mask: u32) -> Self {
        Self { key, mask }
    }

    /// False iff the pattern contains a `!` digit.
    pub fn is_valid(&self) -> bool {
        self.key & !self.mask == 0
    }

    /// Bitmap of the X positions.
    pub fn xs(&self) -> u32 {
        !(self.key | self.mask)
    }

    /// Number of X positions, i.e. the generality of the pattern: the
    /// log2 of how many 32-bit words it matches.
    pub fn count_xs(&self) -> u32 {
        self.xs().count_ones()
    }

    /// True iff `word` is matched by this pattern.
    pub fn matches(&self, word: u32) -> bool {
        word & self.mask == self.key
    }

    /// True iff some 32-bit word is matched by both patterns, i.e. the
    /// keys agree everywhere both masks are set.
    pub fn intersects(&self, other: &Self) -> bool {
        (self.key ^ other.key) & self.mask & other.mask == 0
    }

    /// True iff this pattern matches every word the other matches.
    pub fn covers(&self, other: &Self) -> bool {
        self.mask & !other.mask == 0
            && (self.key ^ other.key) & self.mask == 0
    }

    /// The least general pattern matching every word matched by either
    /// operand. A digit is X in the result iff it is X in either operand
    /// or it differs between the two.
    pub fn merge(&self, other: &Self) -> Self {
        let xs = self.xs() | other.xs() | (self.key ^ other.key);
        Self { key: self.key & !xs, mask: !xs }
    }
}

impl fmt::Display for KeyMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..32).rev() {
            let bit = 1u32 << i;
            let digit = match (self.key & bit != 0, self.mask & bit != 0) {
                (false, true) => '0',
                (true, true) => '1',
                (false, false) => 'X',
                (true, false) => '!',
            };
            f.write_char(digit)?;
        }
        Ok(())
    }
}

/// One routing table entry. `route` is the bitfield of outgoing links and
/// cores a matching packet is copied to. `source` is the bitfield of links
/// the packet is expected to arrive on; only the default-route filter
/// interprets it, everything else carries it through opaquely.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct Entry {
    pub keymask: KeyMask,
    pub route: u32,
    pub source: u32,
}

impl Entry {
    pub fn new(keymask: KeyMask, route: u32, source: u32) -> Self {
        Self { keymask, route, source }
    }
}

/// An ordered multicast routing table. Order is significant: the router
/// delivers a packet according to the first entry whose pattern matches
/// the packet key.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct Table {
    pub entries: Vec<Entry>,
}

impl Table {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort entries into ascending order of generality. Stable, so
    /// entries of equal generality keep their relative order. Ordered
    /// covering requires its input in this order.
    pub fn sort_by_generality(&mut self) {
        self.entries.sort_by_key(|e| e.keymask.count_xs());
    }

    /// True iff entries appear in non-decreasing order of generality.
    pub fn is_sorted_by_generality(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].keymask.count_xs() <= w[1].keymask.count_xs())
    }

    /// First-match lookup: the entry the router would select for `word`.
    pub fn lookup(&self, word: u32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.keymask.matches(word))
    }

    pub fn dump(&self) -> String {
        let mut s = String::new();
        for e in &self.entries {
            writeln!(
                s,
                "{} -> {:08x} (from {:08x})",
                e.keymask, e.route, e.source
            )
            .unwrap();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keymask_xs_and_count() {
        // Xs in all positions
        let mut km = KeyMask::new(0x0, 0x0);
        assert_eq!(km.xs(), 0xffff_ffff);
        assert_eq!(km.count_xs(), 32);

        // No Xs at all
        km.mask = 0xffff_ffff;
        assert_eq!(km.xs(), 0x0);
        assert_eq!(km.count_xs(), 0);

        km.key = km.mask;
        assert_eq!(km.xs(), 0x0);
        assert_eq!(km.count_xs(), 0);

        km.mask = 0x0;
        assert_eq!(km.xs(), 0x0);
        assert_eq!(km.count_xs(), 0);

        // Some Xs
        km.key = 0x0;
        km.mask = 0x7fff_ffff;
        assert_eq!(km.xs(), 0x8000_0000);
        assert_eq!(km.count_xs(), 1);

        km.mask = 0xffff_fffe;
        assert_eq!(km.xs(), 0x0000_0001);
        assert_eq!(km.count_xs(), 1);
    }

    #[test]
    fn keymask_intersect() {
        // All Xs intersects with all Xs
        let mut a = KeyMask::new(0x0, 0x0);
        let mut b = KeyMask::new(0x0, 0x0);
        assert!(a.intersects(&b));

        // All 0s intersects with all Xs
        a.mask = 0xffff_ffff;
        assert!(a.intersects(&b));

        // All 1s intersects with all Xs
        a.key = 0xffff_ffff;
        assert!(a.intersects(&b));

        // All 0s doesn't intersect with all 1s
        b.mask = a.mask;
        assert!(!a.intersects(&b));

        // 10XXXX... does not intersect 0XXXXX...
        let a = KeyMask::new(0x8000_0000, 0xc000_0000);
        let mut b = KeyMask::new(0x0000_0000, 0x8000_0000);
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));

        // ...but 1XXXXX... does
        b.key = a.key;
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn keymask_merge() {
        // All non-Xs merged with its complement is all Xs
        let a = KeyMask::new(0x0000_0000, 0xffff_ffff);
        let b = KeyMask::new(0xffff_ffff, 0xffff_ffff);

        let c = a.merge(&b);
        assert_eq!(c, KeyMask::new(0x0, 0x0));
        let c = b.merge(&a);
        assert_eq!(c, KeyMask::new(0x0, 0x0));

        // Mix of existing Xs and new Xs:
        //
        //   X01XX0011
        //   XXX010110
        //   ---------
        //   XXXXX0X1X
        let a = KeyMask::new(0b001000011, 0b011001111);
        let b = KeyMask::new(0b000010110, 0b000111111);
        let c = a.merge(&b);
        assert_eq!(c.key, 0b000000010);
        assert_eq!(c.mask, 0b000001010);
    }

    #[test]
    fn merge_covers_both_operands() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..1000 {
            // Random valid keymasks
            let mask_a: u32 = rng.random();
            let a = KeyMask::new(rng.random::<u32>() & mask_a, mask_a);
            let mask_b: u32 = rng.random();
            let b = KeyMask::new(rng.random::<u32>() & mask_b, mask_b);

            let c = a.merge(&b);
            assert!(c.is_valid());
            assert!(c.covers(&a));
            assert!(c.covers(&b));

            // Any word matched by either operand is matched by the merge
            let w: u32 = rng.random();
            let wa = (w & !a.mask) | a.key;
            let wb = (w & !b.mask) | b.key;
            assert!(a.matches(wa) && c.matches(wa));
            assert!(b.matches(wb) && c.matches(wb));
        }
    }

    #[test]
    fn intersect_iff_shared_word() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..200 {
            // Narrow patterns over the low byte so exhaustive word
            // enumeration is cheap.
            let mask_a = 0xffff_ff00 | (rng.random::<u32>() & 0xff);
            let a = KeyMask::new(rng.random::<u32>() & mask_a & 0xff, mask_a);
            let mask_b = 0xffff_ff00 | (rng.random::<u32>() & 0xff);
            let b = KeyMask::new(rng.random::<u32>() & mask_b & 0xff, mask_b);

            let shared =
                (0u32..256).any(|w| a.matches(w) && b.matches(w));
            assert_eq!(a.intersects(&b), shared);
            assert_eq!(b.intersects(&a), shared);
        }
    }

    #[test]
    fn table_lookup_is_first_match() {
        // 0000 -> E
        // 00XX -> N
        let table = Table::new(vec![
            Entry::new(KeyMask::new(0x0, 0xf), 0b000001, 0),
            Entry::new(KeyMask::new(0x0, 0xc), 0b000100, 0),
        ]);
        assert_eq!(table.lookup(0x0).unwrap().route, 0b000001);
        assert_eq!(table.lookup(0x2).unwrap().route, 0b000100);
        assert!(table.lookup(0x10).is_none());
    }

    #[test]
    fn sort_by_generality_is_stable() {
        let mut table = Table::new(vec![
            Entry::new(KeyMask::new(0x0, 0x3), 1, 0),
            Entry::new(KeyMask::new(0x1, 0xf), 2, 0),
            Entry::new(KeyMask::new(0x2, 0xf), 3, 0),
        ]);
        table.sort_by_generality();
        assert!(table.is_sorted_by_generality());
        let routes: Vec<u32> =
            table.entries.iter().map(|e| e.route).collect();
        assert_eq!(routes, vec![2, 3, 1]);
    }
}
