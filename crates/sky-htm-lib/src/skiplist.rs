//! Skip list index for ordered trixel keys
//!
//! A probabilistically balanced ordered map from signed 64-bit keys to 32-bit values.
//! Nodes live in an arena and link to each other by slot index, so the whole list is
//! a pair of vectors with no manual lifetime management. Slot 0 is the header: it
//! carries the list's current level and the first forward link of every level.
//!
//! Every operation runs in O(log n) expected time. Inserting an existing key
//! overwrites its value in place.

use crate::{HtmError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Ordered key type; trixel IDs are stored through [`crate::TrixelId::as_key`]
pub type Key = i64;

/// Opaque payload, typically a catalog segment reference
pub type Value = i32;

/// Number of forward links per node
pub const MAX_LEVEL: usize = 6;

/// Chance of promoting a node one level up
pub const DEFAULT_PROBABILITY: f64 = 0.5;

/// Key carried by the header node
pub const KEY_MAX: Key = Key::MAX;

const HEADER: usize = 0;

#[derive(Debug, Clone)]
struct Node {
    key: Key,
    value: Value,
    /// Highest level this node is linked at; assigned once at insertion
    level: usize,
    forward: [Option<usize>; MAX_LEVEL],
}

impl Node {
    fn new(key: Key, value: Value, level: usize) -> Self {
        Self {
            key,
            value,
            level,
            forward: [None; MAX_LEVEL],
        }
    }

    /// Forward link at `level`. Out-of-range levels read as a missing link.
    #[inline]
    fn next(&self, level: usize) -> Option<usize> {
        debug_assert!(level < MAX_LEVEL, "skip list level {level} out of range");
        match self.forward.get(level) {
            Some(link) => *link,
            None => {
                tracing::warn!(level, key = self.key, "skip list level out of range");
                None
            }
        }
    }

    #[inline]
    fn set_next(&mut self, level: usize, link: Option<usize>) {
        debug_assert!(level < MAX_LEVEL, "skip list level {level} out of range");
        match self.forward.get_mut(level) {
            Some(slot) => *slot = link,
            None => tracing::warn!(level, key = self.key, "skip list level out of range"),
        }
    }
}

/// Ordered map with probabilistic multi-level links
///
/// Carries a single shared cursor ([`reset`](SkipList::reset),
/// [`step`](SkipList::step)) for sequential traversal; use [`iter`](SkipList::iter)
/// when more than one traversal is needed at a time.
#[derive(Debug, Clone)]
pub struct SkipList {
    /// Arena of nodes, slot 0 is the header
    nodes: Vec<Node>,
    /// Freed slots ready for reuse
    vacant: Vec<usize>,
    len: usize,
    probability: f64,
    rng: ChaCha8Rng,
    cursor: Option<usize>,
}

/// Level histogram and link usage of a skip list
#[derive(Debug, Clone, PartialEq)]
pub struct SkipListStats {
    /// Number of nodes whose highest level is the index
    pub nodes_per_level: [usize; MAX_LEVEL],
    /// Forward links in use across all nodes
    pub links_used: usize,
    /// `links_used / (MAX_LEVEL * len)`, 0 for an empty list
    pub efficiency: f64,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SkipList {
    /// Create an empty list with the default probability and an entropy seed
    pub fn new() -> Self {
        Self::from_rng(DEFAULT_PROBABILITY, ChaCha8Rng::from_entropy())
    }

    /// Create an empty list with a custom promotion probability
    pub fn with_probability(probability: f64) -> Result<Self> {
        validate_probability(probability)?;
        Ok(Self::from_rng(probability, ChaCha8Rng::from_entropy()))
    }

    /// Create an empty list whose node levels are reproducible
    pub fn with_seed(probability: f64, seed: u64) -> Result<Self> {
        validate_probability(probability)?;
        Ok(Self::from_rng(probability, ChaCha8Rng::seed_from_u64(seed)))
    }

    fn from_rng(probability: f64, rng: ChaCha8Rng) -> Self {
        Self {
            nodes: vec![Node::new(KEY_MAX, 0, 0)],
            vacant: Vec::new(),
            len: 0,
            probability,
            rng,
            cursor: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Highest level currently linked from the header
    #[inline]
    pub fn level(&self) -> usize {
        self.nodes[HEADER].level
    }

    /// Insert or overwrite a value, returning the previous value for an existing key
    pub fn insert(&mut self, key: Key, value: Value) -> Option<Value> {
        let mut update = self.predecessors(key);

        if let Some(found) = self.successor_with_key(update[0], key) {
            return Some(std::mem::replace(&mut self.nodes[found].value, value));
        }

        let new_level = self.random_level();
        let list_level = self.level();
        if new_level > list_level {
            for slot in update.iter_mut().take(new_level + 1).skip(list_level + 1) {
                *slot = HEADER;
            }
            self.nodes[HEADER].level = new_level;
            tracing::trace!(level = new_level, "skip list level grew");
        }

        let index = self.allocate(Node::new(key, value, new_level));
        for (level, &prev) in update.iter().enumerate().take(new_level + 1) {
            let next = self.nodes[prev].next(level);
            self.nodes[index].set_next(level, next);
            self.nodes[prev].set_next(level, Some(index));
        }
        self.len += 1;
        None
    }

    /// Value stored under `key`
    pub fn search(&self, key: Key) -> Option<Value> {
        let before = self.descend(key, false);
        self.successor_with_key(before, key)
            .map(|index| self.nodes[index].value)
    }

    /// Value stored under `key`, scanning onto the key rather than up to it
    ///
    /// Same contract as [`search`](SkipList::search); the walk stops on the last node
    /// not greater than `key` and inspects that node.
    pub fn search_alt(&self, key: Key) -> Option<Value> {
        let at = self.descend(key, true);
        (at != HEADER && self.nodes[at].key == key).then(|| self.nodes[at].value)
    }

    #[inline]
    pub fn contains_key(&self, key: Key) -> bool {
        self.search(key).is_some()
    }

    /// Greatest key strictly less than `key`
    pub fn find_max(&self, key: Key) -> Option<Key> {
        let before = self.descend(key, false);
        (before != HEADER).then(|| self.nodes[before].key)
    }

    /// Smallest key strictly greater than `key`
    pub fn find_min(&self, key: Key) -> Option<Key> {
        let at = self.descend(key, true);
        self.nodes[at].next(0).map(|index| self.nodes[index].key)
    }

    /// Smallest key in the list
    pub fn first_key(&self) -> Option<Key> {
        self.nodes[HEADER].next(0).map(|index| self.nodes[index].key)
    }

    /// Largest key in the list
    pub fn last_key(&self) -> Option<Key> {
        let mut current = HEADER;
        for level in (0..=self.level()).rev() {
            while let Some(next) = self.nodes[current].next(level) {
                current = next;
            }
        }
        (current != HEADER).then(|| self.nodes[current].key)
    }

    /// Remove `key`, returning its value
    pub fn free(&mut self, key: Key) -> Option<Value> {
        let update = self.predecessors(key);
        let target = self.successor_with_key(update[0], key)?;

        for (level, &prev) in update.iter().enumerate().take(self.level() + 1) {
            if self.nodes[prev].next(level) != Some(target) {
                break;
            }
            let next = self.nodes[target].next(level);
            self.nodes[prev].set_next(level, next);
        }

        if self.cursor == Some(target) {
            self.cursor = self.nodes[target].next(0);
        }
        let value = self.nodes[target].value;
        self.release(target);

        let mut level = self.level();
        while level > 0 && self.nodes[HEADER].next(level).is_none() {
            level -= 1;
        }
        if level != self.level() {
            self.nodes[HEADER].level = level;
            tracing::trace!(level, "skip list level shrank");
        }

        self.len -= 1;
        Some(value)
    }

    /// Remove every key in `lo..=hi`, returning how many were removed
    pub fn free_range(&mut self, lo: Key, hi: Key) -> usize {
        if lo > hi {
            return 0;
        }
        let mut doomed = Vec::new();
        let mut next = self.nodes[self.descend(lo, false)].next(0);
        while let Some(index) = next {
            let node = &self.nodes[index];
            if node.key > hi {
                break;
            }
            doomed.push(node.key);
            next = node.next(0);
        }
        for &key in &doomed {
            self.free(key);
        }
        doomed.len()
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[HEADER] = Node::new(KEY_MAX, 0, 0);
        self.vacant.clear();
        self.len = 0;
        self.cursor = None;
    }

    /// Place the shared cursor on the lowest key
    pub fn reset(&mut self) {
        self.cursor = self.nodes[HEADER].next(0);
    }

    /// Advance the shared cursor; `false` once it runs past the last key
    pub fn step(&mut self) -> bool {
        self.cursor = self.cursor.and_then(|index| self.nodes[index].next(0));
        self.cursor.is_some()
    }

    /// Key under the shared cursor
    #[inline]
    pub fn key(&self) -> Option<Key> {
        self.cursor.map(|index| self.nodes[index].key)
    }

    /// Value under the shared cursor
    #[inline]
    pub fn value(&self) -> Option<Value> {
        self.cursor.map(|index| self.nodes[index].value)
    }

    /// Key `n` steps after the lowest key. Leaves the shared cursor alone.
    pub fn nth_key(&self, n: usize) -> Option<Key> {
        self.iter().nth(n).map(|(key, _)| key)
    }

    /// Iterate over `(key, value)` pairs in ascending key order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            next: self.nodes[HEADER].next(0),
        }
    }

    /// Level histogram and link usage, for tuning the probability
    pub fn stats(&self) -> SkipListStats {
        let mut nodes_per_level = [0; MAX_LEVEL];
        let mut links_used = 0;
        for (_, index) in self.indices() {
            let level = self.nodes[index].level;
            nodes_per_level[level] += 1;
            links_used += level + 1;
        }
        let efficiency = if self.len == 0 {
            0.0
        } else {
            links_used as f64 / (MAX_LEVEL * self.len) as f64
        };
        SkipListStats {
            nodes_per_level,
            links_used,
            efficiency,
        }
    }

    /// Last node whose key is below `key` (or not above it when `inclusive`)
    fn descend(&self, key: Key, inclusive: bool) -> usize {
        let mut current = HEADER;
        for level in (0..=self.level()).rev() {
            while let Some(next) = self.nodes[current].next(level) {
                let next_key = self.nodes[next].key;
                if next_key < key || (inclusive && next_key == key) {
                    current = next;
                } else {
                    break;
                }
            }
        }
        current
    }

    /// Per-level nodes whose forward link must change to splice `key` in or out
    fn predecessors(&self, key: Key) -> [usize; MAX_LEVEL] {
        let mut update = [HEADER; MAX_LEVEL];
        let mut current = HEADER;
        for level in (0..=self.level()).rev() {
            while let Some(next) = self.nodes[current].next(level) {
                if self.nodes[next].key < key {
                    current = next;
                } else {
                    break;
                }
            }
            update[level] = current;
        }
        update
    }

    #[inline]
    fn successor_with_key(&self, before: usize, key: Key) -> Option<usize> {
        self.nodes[before]
            .next(0)
            .filter(|&index| self.nodes[index].key == key)
    }

    fn random_level(&mut self) -> usize {
        let mut level = 0;
        while level < MAX_LEVEL - 1 && self.rng.gen_range(0.0..1.0) < self.probability {
            level += 1;
        }
        level
    }

    fn allocate(&mut self, node: Node) -> usize {
        match self.vacant.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index].forward = [None; MAX_LEVEL];
        self.vacant.push(index);
    }

    fn indices(&self) -> impl Iterator<Item = (Key, usize)> + '_ {
        std::iter::successors(self.nodes[HEADER].next(0), |&index| {
            self.nodes[index].next(0)
        })
        .map(|index| (self.nodes[index].key, index))
    }
}

fn validate_probability(probability: f64) -> Result<()> {
    if probability > 0.0 && probability < 1.0 {
        Ok(())
    } else {
        Err(HtmError::InvalidProbability(probability))
    }
}

/// Ascending iterator over a [`SkipList`]
pub struct Iter<'a> {
    list: &'a SkipList,
    next: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = (Key, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.list.nodes[self.next?];
        self.next = node.next(0);
        Some((node.key, node.value))
    }
}

impl<'a> IntoIterator for &'a SkipList {
    type Item = (Key, Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Extend<(Key, Value)> for SkipList {
    fn extend<I: IntoIterator<Item = (Key, Value)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl FromIterator<(Key, Value)> for SkipList {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        let mut list = SkipList::new();
        list.extend(iter);
        list
    }
}

impl fmt::Display for SkipListStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, count) in self.nodes_per_level.iter().enumerate() {
            writeln!(f, "level {level}: {count} nodes")?;
        }
        write!(
            f,
            "links used: {} (efficiency {:.3})",
            self.links_used, self.efficiency
        )
    }
}
