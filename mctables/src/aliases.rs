// Copyright 2022 Oxide Computer Company

//! The aliases map remembers, for each merged routing table entry, the
//! set of original patterns the entry stands in for. Ordered covering
//! consults it so that covering checks run against what was actually in
//! the table rather than against already-widened patterns. The map is a
//! trie over the 32 ternary digits of a keymask, which avoids any
//! rebalancing at the cost of some memory.

use crate::table::KeyMask;

/// One fixed-capacity block of an alias list.
#[derive(Debug, Clone)]
struct Chunk {
    capacity: usize,
    elements: Vec<KeyMask>,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self { capacity, elements: Vec::with_capacity(capacity) }
    }
}

/// A sequence of original keymasks, stored as a chain of fixed-capacity
/// chunks so that joining two lists moves whole chunks instead of
/// copying their contents. Logically the list is the flattening of its
/// chunks in chain order.
#[derive(Debug, Clone)]
pub struct AliasList {
    chunks: Vec<Chunk>,
}

impl AliasList {
    /// A list with one empty chunk able to hold `capacity` keymasks.
    pub fn new(capacity: usize) -> Self {
        Self { chunks: vec![Chunk::new(capacity)] }
    }

    /// Append to the head chunk. Reports false, without storing, when
    /// the head chunk is already full.
    pub fn append(&mut self, km: KeyMask) -> bool {
        let head = &mut self.chunks[0];
        if head.elements.len() < head.capacity {
            head.elements.push(km);
            true
        } else {
            false
        }
    }

    /// Move every chunk of `other` onto the end of this chain. The
    /// contents are not copied.
    pub fn join(&mut self, other: AliasList) {
        self.chunks.extend(other.chunks);
    }

    /// Total number of keymasks across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.elements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `i`th keymask of the flattened list.
    pub fn get(&self, mut i: usize) -> Option<KeyMask> {
        for chunk in &self.chunks {
            if i < chunk.elements.len() {
                return Some(chunk.elements[i]);
            }
            i -= chunk.elements.len();
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyMask> {
        self.chunks.iter().flat_map(|c| c.elements.iter())
    }

    /// Sizes of the chunks in chain order.
    pub fn chunk_lens(&self) -> Vec<usize> {
        self.chunks.iter().map(|c| c.elements.len()).collect()
    }
}

#[derive(Debug, Default)]
struct Node {
    child_0: Option<Box<Node>>,
    child_1: Option<Box<Node>>,
    child_x: Option<Box<Node>>,
    // Present on depth-32 nodes only
    value: Option<AliasList>,
}

impl Node {
    fn is_childless(&self) -> bool {
        self.child_0.is_none()
            && self.child_1.is_none()
            && self.child_x.is_none()
            && self.value.is_none()
    }

    fn child(&self, km: &KeyMask, bit: u32) -> Option<&Node> {
        match (km.key & bit != 0, km.mask & bit != 0) {
            (false, true) => self.child_0.as_deref(),
            (true, true) => self.child_1.as_deref(),
            (false, false) => self.child_x.as_deref(),
            (true, false) => None,
        }
    }

    fn child_slot(
        &mut self,
        km: &KeyMask,
        bit: u32,
    ) -> &mut Option<Box<Node>> {
        // Caller has rejected `!` digits already
        match (km.key & bit != 0, km.mask & bit != 0) {
            (false, true) => &mut self.child_0,
            (true, true) => &mut self.child_1,
            _ => &mut self.child_x,
        }
    }

    // Unlinks the value stored under `km` below this node, pruning any
    // interior node left childless on the way back up. Returns the
    // detached value.
    fn remove(&mut self, km: &KeyMask, bit: u32) -> Option<AliasList> {
        if bit == 0 {
            return self.value.take();
        }
        let slot = self.child_slot(km, bit);
        let child = slot.as_deref_mut()?;
        let value = child.remove(km, bit >> 1);
        if child.is_childless() {
            *slot = None;
        }
        value
    }
}

/// Trie from keymask to [`AliasList`], one level per ternary digit from
/// the most significant bit down.
#[derive(Debug, Default)]
pub struct Aliases {
    root: Node,
    len: usize,
}

impl Aliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keymasks with a stored list.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` under `km`, replacing any previous list. Inserting
    /// under a keymask containing a `!` digit silently does nothing.
    pub fn insert(&mut self, km: KeyMask, value: AliasList) {
        if !km.is_valid() {
            return;
        }
        let mut node = &mut self.root;
        let mut bit = 1u32 << 31;
        while bit > 0 {
            node = node
                .child_slot(&km, bit)
                .get_or_insert_with(Box::default)
                .as_mut();
            bit >>= 1;
        }
        if node.value.replace(value).is_none() {
            self.len += 1;
        }
    }

    pub fn find(&self, km: &KeyMask) -> Option<&AliasList> {
        let mut node = &self.root;
        let mut bit = 1u32 << 31;
        while bit > 0 {
            node = node.child(km, bit)?;
            bit >>= 1;
        }
        node.value.as_ref()
    }

    pub fn contains(&self, km: &KeyMask) -> bool {
        self.find(km).is_some()
    }

    /// Detach and return the list stored under `km`, releasing any
    /// interior nodes left childless.
    pub fn remove(&mut self, km: &KeyMask) -> Option<AliasList> {
        if !km.is_valid() {
            return None;
        }
        let value = self.root.remove(km, 1u32 << 31);
        if value.is_some() {
            self.len -= 1;
        }
        value
    }

    /// Release the entire trie, lists included.
    pub fn clear(&mut self) {
        self.root = Node::default();
        self.len = 0;
    }
}
