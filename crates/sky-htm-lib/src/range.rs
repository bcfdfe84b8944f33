//! Disjoint trixel ID ranges
//!
//! [`TrixelRanges`] keeps a sorted set of inclusive `[lo, hi]` key ranges as two
//! parallel skip lists: one keyed by range starts, one keyed by range ends. Because
//! ranges never overlap, the k-th start always pairs with the k-th end.

use crate::skiplist::{DEFAULT_PROBABILITY, Key, SkipList};
use crate::trixel::TrixelId;
use crate::Result;
use std::fmt;

/// How a queried range relates to the stored ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Entirely covered by one stored range
    Inside,
    /// Overlaps stored ranges without being covered by one
    Partial,
    /// Shares no key with any stored range
    Outside,
}

/// Sorted set of disjoint inclusive key ranges
#[derive(Debug, Clone, Default)]
pub struct TrixelRanges {
    los: SkipList,
    his: SkipList,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrixelRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a range set whose internal skip lists use reproducible levels
    pub fn with_seed(seed: u64) -> Result<Self> {
        Ok(Self {
            los: SkipList::with_seed(DEFAULT_PROBABILITY, seed)?,
            his: SkipList::with_seed(DEFAULT_PROBABILITY, seed.wrapping_add(1))?,
        })
    }

    /// Number of disjoint ranges
    #[inline]
    pub fn len(&self) -> usize {
        self.los.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.los.is_empty()
    }

    pub fn clear(&mut self) {
        self.los.clear();
        self.his.clear();
    }

    /// Add `[lo, hi]`, coalescing it with every overlapping or adjacent range
    pub fn merge_range(&mut self, lo: Key, hi: Key) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let mut new_lo = lo;
        let mut new_hi = hi;

        // Range reaching lo from below
        if let Some((start, end)) = self.range_at_or_before(lo)
            && end >= lo.saturating_sub(1)
        {
            new_lo = start;
            new_hi = new_hi.max(end);
        }

        // Last range starting inside or right after the merged span
        if let Some((start, end)) = self.range_at_or_before(new_hi.saturating_add(1))
            && start >= new_lo
        {
            new_hi = new_hi.max(end);
        }

        let swallowed = self.los.free_range(new_lo, new_hi);
        self.his.free_range(new_lo, new_hi);
        self.los.insert(new_lo, 0);
        self.his.insert(new_hi, 0);

        tracing::trace!(lo = new_lo, hi = new_hi, swallowed, "merged trixel range");
    }

    /// Add a single trixel
    pub fn add_trixel(&mut self, id: TrixelId) -> Result<()> {
        let key = id.as_key()?;
        self.merge_range(key, key);
        Ok(())
    }

    /// Add every descendant of `id` at `depth`
    pub fn add_descendants(&mut self, id: TrixelId, depth: usize) -> Result<()> {
        let (lo, hi) = id.descendant_range(depth)?;
        self.merge_range(lo.as_key()?, hi.as_key()?);
        Ok(())
    }

    /// Whether `key` falls inside one of the ranges
    pub fn contains(&self, key: Key) -> bool {
        self.range_at_or_before(key)
            .is_some_and(|(_, end)| key <= end)
    }

    /// Classify `[lo, hi]` against the stored ranges
    pub fn inclusion(&self, lo: Key, hi: Key) -> Inclusion {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        if let Some((_, end)) = self.range_at_or_before(lo) {
            if end >= hi {
                return Inclusion::Inside;
            }
            if end >= lo {
                return Inclusion::Partial;
            }
        }
        match self.los.find_min(lo) {
            Some(start) if start <= hi => Inclusion::Partial,
            _ => Inclusion::Outside,
        }
    }

    /// Smallest gap size whose closing leaves at most `desired` ranges
    ///
    /// Returns 0 when the set already holds `desired` ranges or fewer. A desired
    /// count of 0 is treated as 1.
    pub fn best_gap(&self, desired: usize) -> Key {
        let count = self.len();
        let desired = desired.max(1);
        if count <= desired {
            return 0;
        }
        let mut gaps = self.gaps();
        gaps.sort_unstable();
        gaps.get(count - desired - 1).copied().unwrap_or(0)
    }

    /// Merge consecutive ranges separated by at most `gap` missing keys
    pub fn defrag(&mut self, gap: Key) {
        let ranges = self.ranges();
        let Some(&(mut lo, mut hi)) = ranges.first() else {
            return;
        };
        let mut merged = Vec::with_capacity(ranges.len());
        for &(next_lo, next_hi) in &ranges[1..] {
            if gap_between(hi, next_lo) <= gap {
                hi = next_hi;
            } else {
                merged.push((lo, hi));
                lo = next_lo;
                hi = next_hi;
            }
        }
        merged.push((lo, hi));

        tracing::debug!(before = ranges.len(), after = merged.len(), gap, "defragmented ranges");

        self.clear();
        for (lo, hi) in merged {
            self.los.insert(lo, 0);
            self.his.insert(hi, 0);
        }
    }

    /// Position the shared cursor on the first range
    pub fn reset(&mut self) {
        self.los.reset();
        self.his.reset();
    }

    /// Range under the shared cursor, advancing past it
    pub fn next_range(&mut self) -> Option<(Key, Key)> {
        let lo = self.los.key()?;
        let hi = self.his.key()?;
        self.los.step();
        self.his.step();
        Some((lo, hi))
    }

    /// Ranges in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (Key, Key)> + '_ {
        self.los
            .iter()
            .zip(self.his.iter())
            .map(|((lo, _), (hi, _))| (lo, hi))
    }

    pub fn ranges(&self) -> Vec<(Key, Key)> {
        self.iter().collect()
    }

    fn gaps(&self) -> Vec<Key> {
        self.iter()
            .zip(self.iter().skip(1))
            .map(|((_, hi), (next_lo, _))| gap_between(hi, next_lo))
            .collect()
    }

    /// The range whose start is the greatest start not above `key`
    fn range_at_or_before(&self, key: Key) -> Option<(Key, Key)> {
        let start = match self.los.search(key) {
            Some(_) => key,
            None => self.los.find_max(key)?,
        };
        let end = match self.his.search(start) {
            Some(_) => start,
            None => self.his.find_min(start)?,
        };
        Some((start, end))
    }
}

/// Missing keys strictly between `hi` and `next_lo`
#[inline]
fn gap_between(hi: Key, next_lo: Key) -> Key {
    next_lo.saturating_sub(hi).saturating_sub(1)
}

impl fmt::Display for TrixelRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (lo, hi) in self.iter() {
            match (TrixelId::from_key(lo), TrixelId::from_key(hi)) {
                (Ok(lo_id), Ok(hi_id)) => {
                    writeln!(f, "{lo_id}:{hi_id}   {lo} - {hi}")?;
                }
                _ => writeln!(f, "{lo} - {hi}")?,
            }
        }
        Ok(())
    }
}
