//! CatalogIndex - Top-level manager mapping trixels to catalog segments
//!
//! This module ties the trixel codec and the skip list together: catalog builders
//! register `(trixel, segment)` pairs at a fixed mesh depth, and readers resolve sky
//! positions or trixel ranges to the segments covering them.

use crate::range::TrixelRanges;
use crate::skiplist::{DEFAULT_PROBABILITY, Key, SkipList, Value};
use crate::trixel::{self, MAX_DEPTH, TrixelId};
use crate::{HtmError, Result};

use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the catalog index
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Mesh level at which segments are registered (default 5)
    pub depth: usize,
    /// Skip-list promotion probability, strictly between 0 and 1 (default 0.5)
    pub probability: f64,
    /// Seed for reproducible skip-list levels. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depth: 5,
            probability: DEFAULT_PROBABILITY,
            seed: None,
        }
    }
}

/// Information about the catalog index
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexInfo {
    /// Number of indexed segments
    pub segment_count: usize,
    /// Mesh level of the indexed trixels
    pub depth: usize,
    /// Highest skip-list level in use
    pub list_level: usize,
    /// Lowest indexed trixel
    pub first: Option<TrixelId>,
    /// Highest indexed trixel
    pub last: Option<TrixelId>,
}

/// Ordered index from trixel IDs to catalog segment references
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    /// Trixel keys to segment values
    index: SkipList,
    /// Configuration settings
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CatalogIndex {
    /// Create an empty index with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        if config.depth > MAX_DEPTH {
            return Err(HtmError::DepthTooLarge {
                depth: config.depth,
                max: MAX_DEPTH,
            });
        }
        let index = match config.seed {
            Some(seed) => SkipList::with_seed(config.probability, seed)?,
            None => SkipList::with_probability(config.probability)?,
        };
        Ok(Self { index, config })
    }

    /// Register a segment under a trixel at the configured depth
    ///
    /// Returns the segment previously registered under the same trixel.
    pub fn insert_segment(&mut self, id: TrixelId, segment: Value) -> Result<Option<Value>> {
        let key = self.checked_key(id)?;
        Ok(self.index.insert(key, segment))
    }

    /// Register many segments, inserting them in ascending trixel order
    ///
    /// Every trixel is validated before anything is inserted. Returns how many new
    /// trixels were added.
    pub fn bulk_load<I>(&mut self, segments: I) -> Result<usize>
    where
        I: IntoIterator<Item = (TrixelId, Value)>,
    {
        // Profile validation, sort and insertion of a whole catalog
        #[cfg(feature = "profiling")]
        profiling::scope!("catalog::bulk_load");

        let mut pairs = segments
            .into_iter()
            .map(|(id, segment)| Ok((self.checked_key(id)?, segment)))
            .collect::<Result<Vec<(Key, Value)>>>()?;
        pairs.sort_by_key(|&(key, _)| key);

        let before = self.index.len();
        self.index.extend(pairs);
        let added = self.index.len() - before;

        tracing::debug!(added, total = self.index.len(), "bulk loaded segments");
        Ok(added)
    }

    /// Trixel holding an equatorial position at the configured depth
    #[inline]
    pub fn locate(&self, ra: f64, dec: f64) -> Result<TrixelId> {
        trixel::ra_dec_to_id(ra, dec, self.config.depth)
    }

    /// Locate many positions in parallel
    pub fn locate_all(&self, positions: &[(f64, f64)]) -> Result<Vec<TrixelId>> {
        // Profile parallel encoding of a position batch
        #[cfg(feature = "profiling")]
        profiling::scope!("catalog::locate_all");

        let depth = self.config.depth;
        positions
            .par_iter()
            .map(|&(ra, dec)| trixel::ra_dec_to_id(ra, dec, depth))
            .collect()
    }

    /// Segment registered exactly under `id`
    pub fn segment(&self, id: TrixelId) -> Option<Value> {
        self.index.search(id.as_key().ok()?)
    }

    /// Segment covering `id`: the one registered under it, else the nearest one below
    ///
    /// `id` may be given at any level; deeper trixels are resolved through their
    /// ancestor at the configured depth, shallower ones through their first
    /// descendant.
    pub fn covering_segment(&self, id: TrixelId) -> Option<(TrixelId, Value)> {
        let key = self.key_at_depth(id)?;
        let found = match self.index.search(key) {
            Some(segment) => (key, segment),
            None => {
                let below = self.index.find_max(key)?;
                (below, self.index.search(below)?)
            }
        };
        self.entry(found)
    }

    /// First segment registered strictly after `id`
    pub fn next_segment(&self, id: TrixelId) -> Option<(TrixelId, Value)> {
        let key = self.index.find_min(id.as_key().ok()?)?;
        self.entry((key, self.index.search(key)?))
    }

    /// Segments registered inside any of the ranges, in ascending trixel order
    ///
    /// The ranges are expected at the configured depth, as built with
    /// [`TrixelRanges::add_descendants`].
    pub fn segments_in(&self, ranges: &TrixelRanges) -> Vec<(TrixelId, Value)> {
        let mut found = Vec::new();
        for (lo, hi) in ranges.iter() {
            let mut cursor = match self.index.search(lo) {
                Some(_) => Some(lo),
                None => self.index.find_min(lo),
            };
            while let Some(key) = cursor.filter(|&key| key <= hi) {
                if let Some(entry) = self
                    .index
                    .search(key)
                    .and_then(|segment| self.entry((key, segment)))
                {
                    found.push(entry);
                }
                cursor = self.index.find_min(key);
            }
        }
        found
    }

    /// Drop every segment registered in `lo..=hi`, returning how many were dropped
    pub fn remove_segments(&mut self, lo: TrixelId, hi: TrixelId) -> Result<usize> {
        let removed = self.index.free_range(lo.as_key()?, hi.as_key()?);
        tracing::debug!(removed, %lo, %hi, "removed segments");
        Ok(removed)
    }

    /// Get index information
    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            segment_count: self.index.len(),
            depth: self.config.depth,
            list_level: self.index.level(),
            first: self.index.first_key().and_then(|key| TrixelId::from_key(key).ok()),
            last: self.index.last_key().and_then(|key| TrixelId::from_key(key).ok()),
        }
    }

    /// Iterate over `(trixel, segment)` pairs in ascending trixel order
    pub fn iter(&self) -> impl Iterator<Item = (TrixelId, Value)> + '_ {
        self.index
            .iter()
            .filter_map(|entry| self.entry(entry))
    }

    /// Get the underlying skip list
    #[inline]
    pub fn skip_list(&self) -> &SkipList {
        &self.index
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    fn checked_key(&self, id: TrixelId) -> Result<Key> {
        if id.level() != self.config.depth {
            return Err(HtmError::DepthMismatch {
                expected: self.config.depth,
                found: id.level(),
            });
        }
        id.as_key()
    }

    /// Key of `id` moved to the configured depth
    fn key_at_depth(&self, id: TrixelId) -> Option<Key> {
        let level = id.level();
        let depth = self.config.depth;
        let at_depth = if level > depth {
            TrixelId::new(id.get() >> (2 * (level - depth))).ok()?
        } else {
            id.descendant_range(depth).ok()?.0
        };
        at_depth.as_key().ok()
    }

    #[inline]
    fn entry(&self, (key, segment): (Key, Value)) -> Option<(TrixelId, Value)> {
        TrixelId::from_key(key).ok().map(|id| (id, segment))
    }
}
